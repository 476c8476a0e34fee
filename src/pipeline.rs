//! End-to-end orchestration: navigate, replay, capture, decide.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pagesnap_action_recorder::{
    compile_actions, select_clip, ClipChoice, ClipPolicy, RecorderSession,
};
use pagesnap_action_replay::Replayer;
use pagesnap_cdp_bridge::{BridgeConfig, PageBridge, PageId};
use pagesnap_core_types::ScreenshotEntry;
use pagesnap_snapshot_pipeline::{
    resolve_capture, ArtifactStore, CaptureOptions, CaptureResolution, Capturer, DecisionPrompt,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::store::EntryStore;

pub struct Pipeline {
    cfg: AppConfig,
    bridge: Arc<PageBridge>,
    replayer: Replayer,
    capturer: Capturer,
    pub store: EntryStore,
    pub artifacts: ArtifactStore,
    page: Mutex<Option<PageId>>,
}

impl Pipeline {
    pub fn new(cfg: AppConfig) -> Self {
        let bridge_cfg = BridgeConfig {
            user_data_dir: cfg.user_data_dir.clone(),
            headless: cfg.headless,
            device_scale_factor: cfg.device_scale_factor,
            default_deadline_ms: cfg.navigation_timeout_ms,
            ..BridgeConfig::default()
        };
        let bridge = Arc::new(PageBridge::new(bridge_cfg));
        Self::with_bridge(cfg, bridge)
    }

    pub fn with_bridge(cfg: AppConfig, bridge: Arc<PageBridge>) -> Self {
        let replayer = Replayer::new(bridge.clone());
        let capturer = Capturer::new(bridge.clone()).with_options(CaptureOptions {
            settle_delay: Duration::from_millis(cfg.settle_ms),
            quiet_window: Duration::from_millis(cfg.network_quiet_ms),
            quiet_timeout: Duration::from_millis(cfg.network_quiet_timeout_ms),
            ready_timeout: Duration::from_millis(cfg.navigation_timeout_ms),
            ..CaptureOptions::default()
        });
        let store = EntryStore::new(&cfg.entries_file);
        let artifacts = ArtifactStore::new(&cfg.screenshot_dir, &cfg.staging_dir);
        Self {
            cfg,
            bridge,
            replayer,
            capturer,
            store,
            artifacts,
            page: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.bridge.clone().start().await?;
        self.artifacts.ensure_dirs()?;
        self.store.ensure()?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.bridge.shutdown().await;
    }

    fn navigation_deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.navigation_timeout_ms)
    }

    fn clip_policy(&self) -> ClipPolicy {
        ClipPolicy {
            min_dimension: self.cfg.clip_min_dimension,
            default_clip: self.cfg.default_clip,
            tolerance: self.cfg.clip_tolerance,
        }
    }

    /// The single page every entry runs through, opened on first use with
    /// the configured device scale.
    async fn page(&self) -> Result<PageId, AppError> {
        let mut guard = self.page.lock().await;
        if let Some(page) = *guard {
            if self.bridge.registry.get(&page).is_some() {
                return Ok(page);
            }
            warn!(target: "pagesnap", "page went away; opening a new one");
        }
        let page = self.bridge.create_page("about:blank").await?;
        self.bridge
            .set_device_scale_factor(page, self.cfg.device_scale_factor)
            .await?;
        *guard = Some(page);
        Ok(page)
    }

    /// Record a new entry: navigate, capture interactions until
    /// `wait_for_stop` completes, then select the capture region.
    pub async fn record_entry<F>(
        &self,
        png_name: &str,
        url: &str,
        wait_for_stop: F,
    ) -> Result<ScreenshotEntry, AppError>
    where
        F: Future<Output = ()>,
    {
        let page = self.page().await?;
        self.bridge
            .navigate(page, url, self.navigation_deadline())
            .await?;

        let mut session = RecorderSession::new(self.bridge.clone(), page);
        session.start().await?;
        info!(target: "pagesnap", name = png_name, "recording; interact with the page");
        wait_for_stop.await;
        let events = session.stop().await?;
        let actions = compile_actions(&events, self.cfg.fidelity);
        info!(
            target: "pagesnap",
            events = events.len(),
            actions = actions.len(),
            "recording compiled"
        );

        info!(target: "pagesnap", "draw the capture region (Escape for the default)");
        let choice = select_clip(&self.bridge, page, &self.clip_policy()).await?;
        let clip = match choice {
            ClipChoice::Drawn(clip) => clip,
            ClipChoice::DefaultSubstituted(clip) => {
                info!(target: "pagesnap", "selection snapped to the default region");
                clip
            }
            ClipChoice::Cancelled => {
                info!(target: "pagesnap", "selection cancelled; using the default region");
                self.cfg.default_clip
            }
        };

        let entry = ScreenshotEntry {
            url: url.to_string(),
            png_name: png_name.to_string(),
            clip,
            actions,
        };
        self.store.upsert(entry.clone())?;
        Ok(entry)
    }

    /// Replay one entry and walk its capture through the decision flow.
    pub async fn process_entry(
        &self,
        entry: &ScreenshotEntry,
        prompt: &dyn DecisionPrompt,
    ) -> Result<CaptureResolution, AppError> {
        let page = self.page().await?;
        self.bridge
            .navigate(page, &entry.url, self.navigation_deadline())
            .await?;
        sleep(Duration::from_millis(self.cfg.settle_ms)).await;

        let summary = self.replayer.replay(page, &entry.actions).await;
        if summary.failed > 0 {
            warn!(
                target: "pagesnap",
                name = %entry.png_name,
                failed = summary.failed,
                total = summary.total,
                "some replay steps were skipped"
            );
        }

        let clip = entry.clip.is_capturable().then_some(&entry.clip);
        let image = self.capturer.capture(page, clip).await?;
        let resolution = resolve_capture(&self.artifacts, &entry.png_name, &image, prompt).await?;
        info!(
            target: "pagesnap",
            name = %entry.png_name,
            state = ?resolution.state,
            "entry processed"
        );
        Ok(resolution)
    }

    pub async fn run_one(
        &self,
        png_name: &str,
        prompt: &dyn DecisionPrompt,
    ) -> Result<CaptureResolution, AppError> {
        let entry = self.store.find(png_name)?;
        self.process_entry(&entry, prompt).await
    }

    /// Process every entry in definition order. A failing entry is logged
    /// and the run continues; the error count is returned.
    pub async fn run_all(&self, prompt: &dyn DecisionPrompt) -> Result<usize, AppError> {
        self.artifacts.clear_staging()?;
        let entries = self.store.load()?;
        let mut failures = 0;
        for entry in &entries {
            if let Err(err) = self.process_entry(entry, prompt).await {
                error!(
                    target: "pagesnap",
                    name = %entry.png_name,
                    %err,
                    "entry failed; continuing with the rest"
                );
                failures += 1;
            }
        }
        info!(
            target: "pagesnap",
            total = entries.len(),
            failures,
            "run finished"
        );
        Ok(failures)
    }
}
