//! Deterministic replay of compiled action lists.
//!
//! Actions execute serially in list order; each step either completes or is
//! logged and skipped, so a broken step never aborts the run. Wheel actions
//! degrade through a strategy chain, keyboard actions fall back from key
//! dispatch to text insertion, and unknown actions become a fixed delay.

pub mod engine;
pub mod errors;
pub mod keys;
pub mod wheel;

pub use engine::Replayer;
pub use errors::ReplayError;
pub use wheel::{SelectorScroll, ViewportWheel, WheelStrategy, WindowScrollBy};
