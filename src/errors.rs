use std::path::PathBuf;

use pagesnap_action_recorder::RecorderError;
use pagesnap_cdp_bridge::BridgeError;
use pagesnap_snapshot_pipeline::SnapshotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("browser error: {0}")]
    Bridge(#[from] BridgeError),
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("entry store i/o at {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("entry store format: {0}")]
    StoreFormat(#[from] serde_json::Error),
    #[error("no entry named {0:?}")]
    UnknownEntry(String),
    #[error("{0}")]
    Invalid(String),
}
