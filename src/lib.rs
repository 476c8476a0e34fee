//! pagesnap: record browser interactions once, replay them deterministically,
//! and keep region screenshots up to date through a visual-diff decision
//! flow.

pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod store;

pub use config::AppConfig;
pub use errors::AppError;
pub use pipeline::Pipeline;
pub use store::EntryStore;
