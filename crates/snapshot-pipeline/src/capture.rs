//! Settled-page capture.
//!
//! A capture waits for the DOM and the network to settle (bounded, and
//! non-fatal when the page never quiets down), scrolls the clip's top-left
//! corner into view, then takes a viewport-relative region screenshot. The
//! protocol applies device scaling, exactly once. Every artifact gets a
//! solid border so croppings are visually unambiguous.

use std::sync::Arc;
use std::time::Duration;

use image::{load_from_memory, Rgba};
use pagesnap_cdp_bridge::{PageBridge, PageId, ScreenshotRegion};
use pagesnap_core_types::Clip;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::diff::encode_png;
use crate::errors::SnapshotError;

#[derive(Clone, Copy, Debug)]
pub struct CaptureOptions {
    /// Unconditional pause after the readiness waits.
    pub settle_delay: Duration,
    /// Pause after scrolling to the clip, before the shot.
    pub scroll_settle: Duration,
    pub ready_timeout: Duration,
    pub quiet_window: Duration,
    pub quiet_timeout: Duration,
    /// Border thickness painted onto every artifact, in device pixels.
    pub border_px: u32,
    pub border_rgba: [u8; 4],
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            scroll_settle: Duration::from_millis(250),
            ready_timeout: Duration::from_secs(30),
            quiet_window: Duration::from_millis(500),
            quiet_timeout: Duration::from_secs(10),
            border_px: 2,
            border_rgba: [0, 0, 0, 255],
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct Capturer {
    bridge: Arc<PageBridge>,
    options: CaptureOptions,
}

impl Capturer {
    pub fn new(bridge: Arc<PageBridge>) -> Self {
        Self {
            bridge,
            options: CaptureOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    /// Capture the page. A capturable clip scrolls into place and produces
    /// a region shot anchored at the viewport origin; anything else falls
    /// back to a full-page shot.
    pub async fn capture(
        &self,
        page: PageId,
        clip: Option<&Clip>,
    ) -> Result<CapturedImage, SnapshotError> {
        if let Err(err) = self
            .bridge
            .wait_for_dom_ready(page, self.options.ready_timeout)
            .await
        {
            warn!(target: "snapshot", %err, "dom never settled; capturing anyway");
        }
        if let Err(err) = self
            .bridge
            .wait_for_network_quiet(page, self.options.quiet_window, self.options.quiet_timeout)
            .await
        {
            warn!(target: "snapshot", %err, "network never quieted; capturing anyway");
        }
        sleep(self.options.settle_delay).await;

        let region = match clip {
            Some(clip) if clip.is_capturable() => {
                // Scroll the clip's corner to the viewport origin; the shot
                // is then viewport-relative at (0, 0).
                let script = format!("window.scrollTo({}, {})", clip.x, clip.y);
                if let Err(err) = self.bridge.evaluate(page, &script).await {
                    warn!(target: "snapshot", %err, "pre-capture scroll failed");
                }
                sleep(self.options.scroll_settle).await;
                Some(ScreenshotRegion {
                    x: 0.0,
                    y: 0.0,
                    width: clip.width as f64,
                    height: clip.height as f64,
                })
            }
            _ => None,
        };

        let full_page = region.is_none();
        let png = self.bridge.screenshot(page, region, full_page).await?;
        let bordered = apply_border(&png, self.options.border_px, self.options.border_rgba)?;
        debug!(
            target: "snapshot",
            width = bordered.width,
            height = bordered.height,
            full_page,
            "captured"
        );
        Ok(bordered)
    }
}

/// Paint a solid border over the outer `thickness` pixels, preserving the
/// image dimensions.
pub fn apply_border(
    png: &[u8],
    thickness: u32,
    rgba: [u8; 4],
) -> Result<CapturedImage, SnapshotError> {
    let mut img = load_from_memory(png)?.to_rgba8();
    let (width, height) = img.dimensions();
    let color = Rgba(rgba);

    for y in 0..height {
        for x in 0..width {
            let edge = x < thickness
                || y < thickness
                || x >= width.saturating_sub(thickness)
                || y >= height.saturating_sub(thickness);
            if edge {
                img.put_pixel(x, y, color);
            }
        }
    }

    Ok(CapturedImage {
        png: encode_png(&img)?,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::RgbaImage;
    use pagesnap_cdp_bridge::{BridgeConfig, ScriptedTransport};
    use serde_json::json;

    fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
    }

    fn fast_options() -> CaptureOptions {
        CaptureOptions {
            settle_delay: Duration::from_millis(1),
            scroll_settle: Duration::from_millis(1),
            ready_timeout: Duration::from_millis(50),
            quiet_window: Duration::from_millis(1),
            quiet_timeout: Duration::from_millis(50),
            ..CaptureOptions::default()
        }
    }

    #[test]
    fn border_preserves_dimensions_and_paints_edges() {
        let png = solid_png(10, 8, [50, 60, 70, 255]);
        let bordered = apply_border(&png, 2, [0, 0, 0, 255]).unwrap();
        assert_eq!((bordered.width, bordered.height), (10, 8));

        let img = load_from_memory(&bordered.png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(9, 7).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(5, 4).0, [50, 60, 70, 255]);
    }

    #[tokio::test]
    async fn capturable_clip_scrolls_then_shoots_the_viewport_origin() {
        let transport = Arc::new(ScriptedTransport::new());
        let bridge = Arc::new(PageBridge::with_transport(
            BridgeConfig::default(),
            transport.clone(),
        ));
        let page = PageId::new();
        bridge
            .registry
            .insert_page(page, "t".to_string(), "s".to_string());

        // Readiness poll, then the pre-capture scroll.
        transport.push_response(
            "Runtime.evaluate",
            json!({ "result": { "value": "complete" } }),
        );
        transport.push_response(
            "Page.captureScreenshot",
            json!({ "data": BASE64.encode(solid_png(300, 200, [9, 9, 9, 255])) }),
        );

        let capturer = Capturer::new(bridge).with_options(fast_options());
        let clip = Clip::new(120, 4000, 300, 200);
        let captured = capturer.capture(page, Some(&clip)).await.unwrap();
        assert_eq!((captured.width, captured.height), (300, 200));

        let evals = transport.commands_for("Runtime.evaluate");
        let scroll = evals.last().unwrap()["expression"].as_str().unwrap();
        assert_eq!(scroll, "window.scrollTo(120, 4000)");

        let shot = &transport.commands_for("Page.captureScreenshot")[0];
        assert_eq!(shot["clip"]["x"], 0.0);
        assert_eq!(shot["clip"]["y"], 0.0);
        assert_eq!(shot["clip"]["width"], 300.0);
        assert_eq!(shot["clip"]["height"], 200.0);
    }

    #[tokio::test]
    async fn degenerate_clip_falls_back_to_full_page() {
        let transport = Arc::new(ScriptedTransport::new());
        let bridge = Arc::new(PageBridge::with_transport(
            BridgeConfig::default(),
            transport.clone(),
        ));
        let page = PageId::new();
        bridge
            .registry
            .insert_page(page, "t".to_string(), "s".to_string());

        transport.push_response(
            "Runtime.evaluate",
            json!({ "result": { "value": "complete" } }),
        );
        transport.push_response(
            "Page.captureScreenshot",
            json!({ "data": BASE64.encode(solid_png(6, 6, [1, 1, 1, 255])) }),
        );

        let capturer = Capturer::new(bridge).with_options(fast_options());
        let clip = Clip::new(0, 0, 0, 0);
        capturer.capture(page, Some(&clip)).await.unwrap();

        let shot = &transport.commands_for("Page.captureScreenshot")[0];
        assert!(shot.get("clip").is_none());
        assert_eq!(shot["captureBeyondViewport"], true);
    }
}
