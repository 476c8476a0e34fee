//! The replace/discard decision flow.
//!
//! A fresh capture is staged next to the accepted artifact and compared:
//! first by content hash, then pixel-by-pixel. An identical capture is
//! discarded outright; a differing one goes to a [`DecisionPrompt`] along
//! with a rendered diff. Only a replace decision touches the accepted file.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::artifact::ArtifactStore;
use crate::capture::CapturedImage;
use crate::diff::{self, DiffBounds};
use crate::errors::SnapshotError;
use crate::hash::sha256_hex;

/// Lifecycle of one capture attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactState {
    NotCaptured,
    Captured,
    PendingDecision,
    Replaced,
    Discarded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Replace,
    Discard,
}

/// Everything a prompt gets to show before asking for a decision.
#[derive(Clone, Debug)]
pub struct DiffContext {
    pub name: String,
    pub changed_pixels: u64,
    pub bounds: Option<DiffBounds>,
    pub candidate_path: PathBuf,
    pub diff_path: Option<PathBuf>,
}

#[async_trait]
pub trait DecisionPrompt: Send + Sync {
    async fn decide(&self, ctx: &DiffContext) -> Result<Decision, SnapshotError>;
}

/// Non-interactive mode: every differing capture replaces the artifact.
pub struct AutoReplace;

#[async_trait]
impl DecisionPrompt for AutoReplace {
    async fn decide(&self, ctx: &DiffContext) -> Result<Decision, SnapshotError> {
        info!(
            target: "snapshot",
            name = %ctx.name,
            changed = ctx.changed_pixels,
            "auto-replacing changed artifact"
        );
        Ok(Decision::Replace)
    }
}

#[derive(Clone, Debug)]
pub struct CaptureResolution {
    pub state: ArtifactState,
    pub new_hash: String,
    pub prev_hash: Option<String>,
}

/// Run one capture through the decision flow against the accepted artifact.
///
/// A first-time capture is accepted without prompting. An identical capture
/// (by hash, or by pixels when only the encoding differs) is discarded and
/// the accepted artifact stays byte-for-byte untouched.
pub async fn resolve_capture(
    store: &ArtifactStore,
    name: &str,
    image: &CapturedImage,
    prompt: &dyn DecisionPrompt,
) -> Result<CaptureResolution, SnapshotError> {
    let new_hash = sha256_hex(&image.png);
    let previous = store.final_bytes(name);
    let prev_hash = previous.as_deref().map(sha256_hex);

    let candidate_path = store.write_staging(name, &image.png)?;

    let Some(previous) = previous else {
        store.promote(name)?;
        info!(target: "snapshot", name, "first capture accepted");
        return Ok(CaptureResolution {
            state: ArtifactState::Replaced,
            new_hash,
            prev_hash: None,
        });
    };

    if prev_hash.as_deref() == Some(new_hash.as_str()) {
        store.discard(name)?;
        debug!(target: "snapshot", name, "capture identical by hash; discarded");
        return Ok(CaptureResolution {
            state: ArtifactState::Discarded,
            new_hash,
            prev_hash,
        });
    }

    let report = diff::compute(&previous, &image.png, true)?;
    if report.identical {
        store.discard(name)?;
        debug!(target: "snapshot", name, "capture identical by pixels; discarded");
        return Ok(CaptureResolution {
            state: ArtifactState::Discarded,
            new_hash,
            prev_hash,
        });
    }

    let diff_path = match &report.render {
        Some(render) => Some(store.write_diff(name, render)?),
        None => None,
    };
    let ctx = DiffContext {
        name: name.to_string(),
        changed_pixels: report.changed_pixels,
        bounds: report.bounds,
        candidate_path,
        diff_path,
    };

    let state = match prompt.decide(&ctx).await? {
        Decision::Replace => {
            store.promote(name)?;
            ArtifactState::Replaced
        }
        Decision::Discard => {
            store.discard(name)?;
            ArtifactState::Discarded
        }
    };
    Ok(CaptureResolution {
        state,
        new_hash,
        prev_hash,
    })
}
