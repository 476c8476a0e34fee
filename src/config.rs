//! Application configuration.
//!
//! Settings come from an optional `pagesnap.toml` (or any file the CLI
//! points at) layered under `PAGESNAP_*` environment variables; everything
//! has a default so the tool runs with no config file at all.

use std::path::PathBuf;

use config::{Config, Environment, File};
use pagesnap_core_types::{Clip, ReplayFidelity};
use serde::Deserialize;

use crate::errors::AppError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the entry definitions live.
    pub entries_file: PathBuf,
    /// Accepted artifacts.
    pub screenshot_dir: PathBuf,
    /// Candidates and diff renders awaiting a decision.
    pub staging_dir: PathBuf,
    /// Browser profile directory (cookies, sessions).
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub device_scale_factor: f64,
    pub settle_ms: u64,
    pub network_quiet_ms: u64,
    pub network_quiet_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub default_clip: Clip,
    pub clip_tolerance: i64,
    pub clip_min_dimension: i64,
    pub fidelity: ReplayFidelity,
    /// Replace differing artifacts without prompting.
    pub auto_replace: bool,
    /// Optional log file; stderr only when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            entries_file: PathBuf::from("screenshots.json"),
            screenshot_dir: PathBuf::from("screenshots"),
            staging_dir: PathBuf::from("screenshots/.staging"),
            user_data_dir: PathBuf::from("./userdata"),
            headless: false,
            device_scale_factor: 4.0,
            settle_ms: 300,
            network_quiet_ms: 500,
            network_quiet_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            default_clip: Clip::new(0, 0, 1280, 720),
            clip_tolerance: 5,
            clip_min_dimension: 5,
            fidelity: ReplayFidelity::Full,
            auto_replace: false,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Load from `path` (optional) with `PAGESNAP_*` overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let mut builder = Config::builder();
        builder = builder.add_source(File::with_name(path.unwrap_or("pagesnap")).required(false));
        builder = builder.add_source(Environment::with_prefix("PAGESNAP"));
        let cfg = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.device_scale_factor, 4.0);
        assert!(cfg.default_clip.is_capturable());
        assert_eq!(cfg.fidelity, ReplayFidelity::Full);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Some("/nonexistent/pagesnap")).unwrap();
        assert_eq!(cfg.entries_file, PathBuf::from("screenshots.json"));
    }
}
