//! Interactive capture-region selection and its degeneracy policy.

use std::sync::Arc;

use pagesnap_cdp_bridge::{PageBridge, PageId};
use pagesnap_core_types::Clip;
use serde_json::Value;
use tracing::debug;

use crate::errors::RecorderError;
use crate::inject::CLIP_JS;

/// Rules for turning a raw drag selection into a usable clip.
#[derive(Clone, Copy, Debug)]
pub struct ClipPolicy {
    /// Selections thinner than this in either dimension are treated as
    /// accidental.
    pub min_dimension: i64,
    /// The region substituted for degenerate or near-default selections.
    pub default_clip: Clip,
    /// Per-field tolerance for "close enough to the default".
    pub tolerance: i64,
}

impl ClipPolicy {
    pub fn new(default_clip: Clip) -> Self {
        Self {
            min_dimension: 5,
            default_clip,
            tolerance: 5,
        }
    }
}

/// Outcome of one selection round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClipChoice {
    /// The user drew a meaningfully distinct region.
    Drawn(Clip),
    /// The drawn region was degenerate or indistinguishable from the
    /// default, so the default stands in.
    DefaultSubstituted(Clip),
    /// The user pressed Escape or never dragged.
    Cancelled,
}

impl ClipChoice {
    /// The clip to persist, if any.
    pub fn clip(&self) -> Option<Clip> {
        match self {
            ClipChoice::Drawn(clip) | ClipChoice::DefaultSubstituted(clip) => Some(*clip),
            ClipChoice::Cancelled => None,
        }
    }
}

/// Apply the degeneracy policy to a raw selection.
pub fn resolve_selection(policy: &ClipPolicy, drawn: Option<Clip>) -> ClipChoice {
    let Some(clip) = drawn else {
        return ClipChoice::Cancelled;
    };
    if clip.width < policy.min_dimension
        || clip.height < policy.min_dimension
        || clip.approx_eq(&policy.default_clip, policy.tolerance)
    {
        return ClipChoice::DefaultSubstituted(policy.default_clip);
    }
    ClipChoice::Drawn(clip)
}

/// Run the drag-to-select overlay on the page and resolve the result.
pub async fn select_clip(
    bridge: &Arc<PageBridge>,
    page: PageId,
    policy: &ClipPolicy,
) -> Result<ClipChoice, RecorderError> {
    let value = bridge.evaluate(page, CLIP_JS).await?;
    let drawn = match value {
        Value::Null => None,
        other => Some(serde_json::from_value::<Clip>(other)?),
    };
    let choice = resolve_selection(policy, drawn);
    debug!(target: "action-recorder", ?choice, "clip selection resolved");
    Ok(choice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ClipPolicy {
        ClipPolicy::new(Clip::new(0, 0, 1280, 720))
    }

    #[test]
    fn escape_cancels() {
        assert_eq!(resolve_selection(&policy(), None), ClipChoice::Cancelled);
    }

    #[test]
    fn tiny_selections_fall_back_to_the_default() {
        let choice = resolve_selection(&policy(), Some(Clip::new(40, 40, 3, 200)));
        assert_eq!(
            choice,
            ClipChoice::DefaultSubstituted(Clip::new(0, 0, 1280, 720))
        );
    }

    #[test]
    fn near_default_selections_snap_to_the_default() {
        let choice = resolve_selection(&policy(), Some(Clip::new(2, 3, 1278, 722)));
        assert_eq!(
            choice,
            ClipChoice::DefaultSubstituted(Clip::new(0, 0, 1280, 720))
        );
    }

    #[test]
    fn distinct_selections_are_kept_verbatim() {
        let drawn = Clip::new(100, 220, 400, 300);
        assert_eq!(
            resolve_selection(&policy(), Some(drawn)),
            ClipChoice::Drawn(drawn)
        );
    }

    #[test]
    fn boundary_dimension_is_not_degenerate() {
        let drawn = Clip::new(500, 500, 5, 5);
        assert_eq!(
            resolve_selection(&policy(), Some(drawn)),
            ClipChoice::Drawn(drawn)
        );
    }
}
