//! The serial replay engine.

use std::sync::Arc;
use std::time::Duration;

use pagesnap_cdp_bridge::{PageBridge, PageId};
use pagesnap_core_types::Action;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::ReplayError;
use crate::keys::{is_printable, press_key};
use crate::wheel::{default_strategies, WheelStrategy};

/// Outcome of a full replay run. A failed step is one that was logged and
/// skipped; it never aborts the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub total: usize,
    pub failed: usize,
}

/// Replays compiled action lists against one page, step by step, in order.
pub struct Replayer {
    bridge: Arc<PageBridge>,
    wheel: Vec<Box<dyn WheelStrategy>>,
    unknown_delay: Duration,
}

impl Replayer {
    pub fn new(bridge: Arc<PageBridge>) -> Self {
        Self {
            bridge,
            wheel: default_strategies(),
            unknown_delay: Duration::from_millis(50),
        }
    }

    pub fn with_wheel_strategies(mut self, wheel: Vec<Box<dyn WheelStrategy>>) -> Self {
        self.wheel = wheel;
        self
    }

    /// Execute every action serially. Waits run on the host clock so the
    /// recorded pacing is reproduced; failed steps are logged and skipped.
    pub async fn replay(&self, page: PageId, actions: &[Action]) -> ReplaySummary {
        let mut summary = ReplaySummary {
            total: actions.len(),
            ..Default::default()
        };
        for (index, action) in actions.iter().enumerate() {
            if let Err(err) = self.apply(page, action).await {
                warn!(
                    target: "action-replay",
                    step = index,
                    ?action,
                    %err,
                    "replay step failed; continuing"
                );
                summary.failed += 1;
            }
        }
        debug!(
            target: "action-replay",
            total = summary.total,
            failed = summary.failed,
            "replay finished"
        );
        summary
    }

    async fn apply(&self, page: PageId, action: &Action) -> Result<(), ReplayError> {
        match action {
            Action::Wait { ms } => {
                sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Action::Click { x, y } => {
                self.mouse_move(page, *x, *y).await?;
                self.mouse_press(page, *x, *y).await?;
                self.mouse_release(page, *x, *y).await
            }
            Action::Mousedown { x, y } => {
                self.mouse_move(page, *x, *y).await?;
                self.mouse_press(page, *x, *y).await
            }
            Action::Mouseup { x, y } => {
                self.mouse_move(page, *x, *y).await?;
                self.mouse_release(page, *x, *y).await
            }
            Action::Mousemove { x, y } => self.mouse_move(page, *x, *y).await,
            Action::ScrollTo { x, y } => {
                let script = format!("window.scrollTo({x}, {y})");
                self.bridge.evaluate(page, &script).await?;
                Ok(())
            }
            Action::Wheel {
                delta_x,
                delta_y,
                selector,
            } => self.wheel(page, *delta_x, *delta_y, selector.as_deref()).await,
            Action::Keyboard { key } => {
                match press_key(&self.bridge, page, key).await {
                    Ok(()) => Ok(()),
                    // Printable input can still land via text insertion;
                    // named keys must not be typed out literally.
                    Err(err) if is_printable(key) => {
                        debug!(
                            target: "action-replay",
                            %err,
                            "key press rejected; inserting text"
                        );
                        self.bridge.insert_text(page, key).await?;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            Action::Unknown => {
                sleep(self.unknown_delay).await;
                Ok(())
            }
        }
    }

    async fn wheel(
        &self,
        page: PageId,
        delta_x: f64,
        delta_y: f64,
        selector: Option<&str>,
    ) -> Result<(), ReplayError> {
        let mut last = None;
        for strategy in &self.wheel {
            match strategy
                .dispatch(&self.bridge, page, delta_x, delta_y, selector)
                .await
            {
                Ok(()) => {
                    debug!(
                        target: "action-replay",
                        strategy = strategy.name(),
                        "wheel dispatched"
                    );
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        target: "action-replay",
                        strategy = strategy.name(),
                        %err,
                        "wheel strategy failed"
                    );
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            ReplayError::WheelExhausted("no wheel strategies configured".to_string())
        }))
    }

    // Input coordinates are viewport CSS pixels exactly as recorded; device
    // scaling is the protocol's concern.
    async fn mouse_move(&self, page: PageId, x: i64, y: i64) -> Result<(), ReplayError> {
        self.bridge
            .dispatch_mouse_event(
                page,
                json!({
                    "type": "mouseMoved",
                    "x": x,
                    "y": y,
                    "button": "none",
                    "buttons": 0,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        Ok(())
    }

    async fn mouse_press(&self, page: PageId, x: i64, y: i64) -> Result<(), ReplayError> {
        self.bridge
            .dispatch_mouse_event(
                page,
                json!({
                    "type": "mousePressed",
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        Ok(())
    }

    async fn mouse_release(&self, page: PageId, x: i64, y: i64) -> Result<(), ReplayError> {
        self.bridge
            .dispatch_mouse_event(
                page,
                json!({
                    "type": "mouseReleased",
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 0,
                    "clickCount": 1,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        Ok(())
    }
}
