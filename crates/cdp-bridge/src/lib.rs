//! Chromium DevTools Protocol bridge for pagesnap.
//!
//! Owns the raw CDP plumbing the higher layers drive: a pluggable transport
//! (real Chromium or scripted), a registry of attached page sessions, page
//! lifecycle and network-activity tracking, and the input/screenshot/script
//! primitives the recorder, replayer and capture pipeline are built on.

use std::{env, path::PathBuf};

use which::which;

pub mod bridge;
pub mod registry;
pub mod transport;
pub mod util;

pub use bridge::{PageBridge, ScreenshotRegion};
pub use registry::{PageContext, Registry};
pub use transport::{
    CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, ScriptedTransport,
    TransportEvent,
};

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Unique identifier for a page/tab driven through the bridge.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct PageId(pub Uuid);

    impl PageId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for PageId {
        fn default() -> Self {
            Self::new()
        }
    }
}

pub use ids::PageId;

pub mod error {
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the bridge.
    #[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
    pub enum BridgeErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target not found")]
        TargetNotFound,
        #[error("script evaluation failed")]
        ScriptFailed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error passed back to the recorder/replay/capture layers.
    #[derive(Clone, Debug)]
    pub struct BridgeError {
        pub kind: BridgeErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
    }

    impl fmt::Display for BridgeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for BridgeError {}

    impl BridgeError {
        pub fn new(kind: BridgeErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn is_timeout(&self) -> bool {
            self.kind == BridgeErrorKind::NavTimeout
        }
    }
}

pub use error::{BridgeError, BridgeErrorKind};

pub mod config {
    use super::detect_chrome_executable;
    use std::{env, path::PathBuf};

    /// Configuration for launching and tuning the bridge.
    #[derive(Clone, Debug)]
    pub struct BridgeConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        /// Device scale factor applied to every page (the capture pipeline
        /// relies on the protocol scaling clips exactly once).
        pub device_scale_factor: f64,
        pub default_deadline_ms: u64,
        /// Attach to an already-running browser instead of launching one.
        pub websocket_url: Option<String>,
    }

    impl Default for BridgeConfig {
        fn default() -> Self {
            Self {
                executable: detect_chrome_executable().unwrap_or_default(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                device_scale_factor: 1.0,
                default_deadline_ms: 30_000,
                websocket_url: None,
            }
        }
    }

    // PAGESNAP_HEADLESS: "0", "false", "no", "off" run headful.
    fn resolve_headless_default() -> bool {
        match env::var("PAGESNAP_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("PAGESNAP_PROFILE_DIR") {
            return PathBuf::from(path);
        }
        PathBuf::from("./.pagesnap-profile")
    }
}

pub use config::BridgeConfig;

/// Locate a Chrome/Chromium executable, preferring the explicit override.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(path) = env::var("PAGESNAP_CHROME") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    const CANDIDATES: &[&str] = &[
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
    ];
    for name in CANDIDATES {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    // Common non-PATH install locations.
    const FIXED: &[&str] = &[
        "/usr/bin/chromium",
        "/usr/bin/google-chrome",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];
    FIXED
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}
