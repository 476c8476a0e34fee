use pagesnap_cdp_bridge::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("bridge failure: {0}")]
    Bridge(#[from] BridgeError),
    #[error("wheel action exhausted every strategy: {0}")]
    WheelExhausted(String),
    #[error("key {0:?} cannot be dispatched")]
    UnsupportedKey(String),
}
