//! Recording side of pagesnap: injected in-page listeners streaming raw
//! interaction events back to the host, the compiler that turns those
//! events into a deterministic action list, and the drag-to-select clip
//! overlay.

pub mod clip;
pub mod compile;
pub mod errors;
pub mod inject;
pub mod session;

pub use clip::{select_clip, ClipChoice, ClipPolicy};
pub use compile::{compile_actions, GAP_THRESHOLD_MS};
pub use errors::RecorderError;
pub use session::RecorderSession;
