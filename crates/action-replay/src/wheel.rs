//! Wheel replay strategies.
//!
//! A wheel action tries each strategy in order and stops at the first one
//! that succeeds: scroll the recorded element directly, then dispatch a raw
//! wheel at the viewport center, then fall back to scrolling the window.

use std::sync::Arc;

use async_trait::async_trait;
use pagesnap_cdp_bridge::{PageBridge, PageId};
use serde_json::json;

use crate::errors::ReplayError;

#[async_trait]
pub trait WheelStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(
        &self,
        bridge: &Arc<PageBridge>,
        page: PageId,
        delta_x: f64,
        delta_y: f64,
        selector: Option<&str>,
    ) -> Result<(), ReplayError>;
}

/// The default strategy chain, most faithful first.
pub fn default_strategies() -> Vec<Box<dyn WheelStrategy>> {
    vec![
        Box::new(SelectorScroll),
        Box::new(ViewportWheel),
        Box::new(WindowScrollBy),
    ]
}

/// Scroll the recorded element itself, re-dispatching a wheel event so
/// scroll-linked listeners fire too.
pub struct SelectorScroll;

#[async_trait]
impl WheelStrategy for SelectorScroll {
    fn name(&self) -> &'static str {
        "selector-scroll"
    }

    async fn dispatch(
        &self,
        bridge: &Arc<PageBridge>,
        page: PageId,
        delta_x: f64,
        delta_y: f64,
        selector: Option<&str>,
    ) -> Result<(), ReplayError> {
        let Some(selector) = selector else {
            return Err(ReplayError::WheelExhausted(
                "no selector recorded".to_string(),
            ));
        };
        let selector_literal = serde_json::to_string(selector)
            .map_err(|err| ReplayError::WheelExhausted(err.to_string()))?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector_literal});
                if (!el) {{ return 'missing'; }}
                el.dispatchEvent(new WheelEvent('wheel', {{
                    deltaX: {delta_x}, deltaY: {delta_y},
                    bubbles: true, cancelable: true,
                }}));
                el.scrollBy({{ left: {delta_x}, top: {delta_y} }});
                return 'scrolled';
            }})()"#
        );
        let status = bridge.evaluate(page, &script).await?;
        if status.as_str() == Some("scrolled") {
            Ok(())
        } else {
            Err(ReplayError::WheelExhausted(format!(
                "selector {selector:?} did not scroll"
            )))
        }
    }
}

/// Dispatch a raw mouseWheel input event at the viewport center.
pub struct ViewportWheel;

#[async_trait]
impl WheelStrategy for ViewportWheel {
    fn name(&self) -> &'static str {
        "viewport-wheel"
    }

    async fn dispatch(
        &self,
        bridge: &Arc<PageBridge>,
        page: PageId,
        delta_x: f64,
        delta_y: f64,
        _selector: Option<&str>,
    ) -> Result<(), ReplayError> {
        let center = bridge
            .evaluate(
                page,
                "({ x: Math.floor(window.innerWidth / 2), \
                    y: Math.floor(window.innerHeight / 2) })",
            )
            .await?;
        let (x, y) = match (
            center.get("x").and_then(|v| v.as_f64()),
            center.get("y").and_then(|v| v.as_f64()),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(ReplayError::WheelExhausted(
                    "viewport center unavailable".to_string(),
                ))
            }
        };
        bridge
            .dispatch_mouse_event(
                page,
                json!({
                    "type": "mouseWheel",
                    "x": x,
                    "y": y,
                    "deltaX": delta_x,
                    "deltaY": delta_y,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        Ok(())
    }
}

/// Last resort: scroll the window by the recorded deltas.
pub struct WindowScrollBy;

#[async_trait]
impl WheelStrategy for WindowScrollBy {
    fn name(&self) -> &'static str {
        "window-scroll-by"
    }

    async fn dispatch(
        &self,
        bridge: &Arc<PageBridge>,
        page: PageId,
        delta_x: f64,
        delta_y: f64,
        _selector: Option<&str>,
    ) -> Result<(), ReplayError> {
        let script = format!("window.scrollBy({delta_x}, {delta_y})");
        bridge.evaluate(page, &script).await?;
        Ok(())
    }
}
