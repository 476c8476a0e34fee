//! Capture, compare and decide.
//!
//! This crate turns a settled page into a bordered PNG artifact, compares it
//! against the previously accepted capture by hash and then pixel-by-pixel,
//! and walks the artifact through the replace/discard decision flow.

pub mod artifact;
pub mod capture;
pub mod decision;
pub mod diff;
pub mod errors;
pub mod hash;

pub use artifact::ArtifactStore;
pub use capture::{CaptureOptions, CapturedImage, Capturer};
pub use decision::{
    resolve_capture, ArtifactState, AutoReplace, CaptureResolution, Decision, DecisionPrompt,
    DiffContext,
};
pub use diff::DiffReport;
pub use errors::SnapshotError;
