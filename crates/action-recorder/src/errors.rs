use pagesnap_cdp_bridge::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("bridge failure: {0}")]
    Bridge(#[from] BridgeError),
    #[error("recorder is not running")]
    NotRecording,
    #[error("undecodable event payload: {0}")]
    BadPayload(#[from] serde_json::Error),
}
