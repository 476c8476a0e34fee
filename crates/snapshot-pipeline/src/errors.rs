use pagesnap_cdp_bridge::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("bridge failure: {0}")]
    Bridge(#[from] BridgeError),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("artifact i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("decision prompt failed: {0}")]
    Prompt(String),
}
