//! Page driver built on top of a [`CdpTransport`].
//!
//! The bridge tracks attached page sessions, routes `Runtime.bindingCalled`
//! payloads to host channels, maintains per-page network-activity counters
//! for quiet waits, and exposes the navigation/input/script/screenshot
//! primitives the recorder, replayer and capture pipeline use.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::{DashMap, DashSet};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeErrorKind};
use crate::ids::PageId;
use crate::registry::Registry;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent};

/// Viewport-relative capture rectangle in CSS pixels. Device scaling is
/// applied by the protocol, exactly once; callers must not pre-multiply.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenshotRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug)]
struct NetActivity {
    inflight: u64,
    last_change: Instant,
}

impl Default for NetActivity {
    fn default() -> Self {
        Self {
            inflight: 0,
            last_change: Instant::now(),
        }
    }
}

/// Bridge between host code and one browser instance.
pub struct PageBridge {
    cfg: BridgeConfig,
    transport: Arc<dyn CdpTransport>,
    pub registry: Arc<Registry>,
    channels: DashMap<String, mpsc::Sender<Value>>,
    bindings: DashSet<String>,
    net: DashMap<PageId, NetActivity>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PageBridge {
    /// Build a bridge with a real Chromium transport when a browser is
    /// reachable, falling back to the inert transport otherwise.
    pub fn new(cfg: BridgeConfig) -> Self {
        let use_real = cfg.websocket_url.is_some() || !cfg.executable.as_os_str().is_empty();
        let transport: Arc<dyn CdpTransport> = if use_real {
            info!(target: "cdp-bridge", "using chromium transport");
            Arc::new(ChromiumTransport::new(cfg.clone()))
        } else {
            warn!(
                target: "cdp-bridge",
                "no chrome executable found; browser operations will fail \
                 (install Chrome/Chromium or set PAGESNAP_CHROME)"
            );
            Arc::new(NoopTransport)
        };
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: BridgeConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            transport,
            registry: Arc::new(Registry::new()),
            channels: DashMap::new(),
            bindings: DashSet::new(),
            net: DashMap::new(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    /// Start the transport and the event loop. Idempotent enough to call
    /// once per bridge; extra calls spawn redundant loops and are a caller
    /// bug.
    pub async fn start(self: Arc<Self>) -> Result<(), BridgeError> {
        self.transport.start().await?;
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move { this.event_loop().await });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn event_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => {
                    match event {
                        Some(event) => self.process_event(event).await,
                        None => break,
                    }
                }
            }
        }
        debug!(target: "cdp-bridge", "event loop finished");
    }

    async fn process_event(&self, event: TransportEvent) {
        match event.method.as_str() {
            "Target.attachedToTarget" => self.on_attached(&event).await,
            "Target.detachedFromTarget" => {
                if let Some(session) = event
                    .params
                    .get("sessionId")
                    .and_then(|v| v.as_str())
                {
                    if let Some(page) = self.registry.page_for_session(session) {
                        self.registry.remove_page(&page);
                        self.net.remove(&page);
                    }
                }
            }
            "Target.targetDestroyed" => {
                if let Some(target) = event.params.get("targetId").and_then(|v| v.as_str()) {
                    if let Some(page) = self.registry.remove_by_target(target) {
                        self.net.remove(&page);
                    }
                }
            }
            "Runtime.bindingCalled" => self.on_binding_called(&event).await,
            "Network.requestWillBeSent" => self.bump_network(&event, 1),
            "Network.loadingFinished" | "Network.loadingFailed" => self.bump_network(&event, -1),
            _ => {}
        }
    }

    async fn on_attached(&self, event: &TransportEvent) {
        let session = match event.params.get("sessionId").and_then(|v| v.as_str()) {
            Some(session) => session.to_string(),
            None => return,
        };
        let info = &event.params["targetInfo"];
        if info.get("type").and_then(|v| v.as_str()) != Some("page") {
            return;
        }
        let target_id = info
            .get("targetId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let page = PageId::new();
        self.registry
            .insert_page(page, target_id, session.clone());
        if let Some(url) = info.get("url").and_then(|v| v.as_str()) {
            self.registry.set_recent_url(&page, url.to_string());
        }
        self.net.insert(page, NetActivity::default());
        debug!(target: "cdp-bridge", ?page, "page attached");

        for method in ["Page.enable", "Runtime.enable", "Network.enable"] {
            if let Err(err) = self
                .transport
                .send_command(CommandTarget::Session(session.clone()), method, json!({}))
                .await
            {
                warn!(target: "cdp-bridge", %method, %err, "failed to enable domain");
            }
        }

        // Re-arm host channels on every newly attached page so bindings
        // survive navigation and new tabs.
        for name in self.bindings.iter() {
            if let Err(err) = self
                .transport
                .send_command(
                    CommandTarget::Session(session.clone()),
                    "Runtime.addBinding",
                    json!({ "name": name.key() }),
                )
                .await
            {
                warn!(target: "cdp-bridge", binding = %name.key(), %err, "failed to add binding");
            }
        }
    }

    async fn on_binding_called(&self, event: &TransportEvent) {
        let name = event
            .params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let payload = event
            .params
            .get("payload")
            .and_then(|v| v.as_str())
            .unwrap_or("null");
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "cdp-bridge", binding = name, %err, "undecodable binding payload");
                return;
            }
        };
        match self.channels.get(name) {
            Some(sender) => {
                if sender.send(value).await.is_err() {
                    debug!(target: "cdp-bridge", binding = name, "channel receiver dropped");
                }
            }
            None => debug!(target: "cdp-bridge", binding = name, "binding without channel"),
        }
    }

    fn bump_network(&self, event: &TransportEvent, delta: i64) {
        let page = event
            .session_id
            .as_deref()
            .and_then(|session| self.registry.page_for_session(session));
        if let Some(page) = page {
            let mut entry = self.net.entry(page).or_default();
            if delta > 0 {
                entry.inflight = entry.inflight.saturating_add(delta as u64);
            } else {
                entry.inflight = entry.inflight.saturating_sub(delta.unsigned_abs());
            }
            entry.last_change = Instant::now();
        }
    }

    /// Register the single inbound handler for a named channel. The page
    /// calls `window.<name>(jsonString)`; parsed payloads arrive on the
    /// returned receiver. Re-registering a name replaces the previous
    /// receiver.
    pub async fn register_channel(&self, name: &str) -> Result<mpsc::Receiver<Value>, BridgeError> {
        let (tx, rx) = mpsc::channel(256);
        self.channels.insert(name.to_string(), tx);
        self.bindings.insert(name.to_string());

        for (_, ctx) in self.registry.iter() {
            if let Err(err) = self
                .transport
                .send_command(
                    CommandTarget::Session(ctx.cdp_session.clone()),
                    "Runtime.addBinding",
                    json!({ "name": name }),
                )
                .await
            {
                warn!(target: "cdp-bridge", binding = name, %err, "failed to add binding");
            }
        }
        Ok(rx)
    }

    async fn browser_command(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        self.transport
            .send_command(CommandTarget::Browser, method, params)
            .await
    }

    pub async fn page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        let session = self.registry.session_for(&page).ok_or_else(|| {
            BridgeError::new(BridgeErrorKind::TargetNotFound)
                .with_hint(format!("no cdp session for page {page:?}"))
        })?;
        self.transport
            .send_command(CommandTarget::Session(session), method, params)
            .await
    }

    /// Open a new tab and wait until its session is attached.
    pub async fn create_page(&self, url: &str) -> Result<PageId, BridgeError> {
        let response = self
            .browser_command("Target.createTarget", json!({ "url": url }))
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BridgeError::new(BridgeErrorKind::Internal)
                    .with_hint("createTarget returned no targetId")
            })?
            .to_string();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(page) = self.registry.page_for_target(&target_id) {
                return Ok(page);
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::new(BridgeErrorKind::NavTimeout)
                    .with_hint("page session was not attached in time"));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Navigate and block until the DOM is interactive or the deadline
    /// expires.
    pub async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), BridgeError> {
        let response = self
            .page_command(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(BridgeError::new(BridgeErrorKind::CdpIo)
                    .with_hint(format!("navigation failed: {error_text}")));
            }
        }
        self.registry.set_recent_url(&page, url.to_string());
        if let Some(mut entry) = self.net.get_mut(&page) {
            entry.last_change = Instant::now();
        }
        self.wait_for_dom_ready(page, deadline).await
    }

    /// Evaluate a script in page context, awaiting promises and returning
    /// the value by JSON. A thrown exception becomes `ScriptFailed`.
    pub async fn evaluate(&self, page: PageId, expression: &str) -> Result<Value, BridgeError> {
        let response = self
            .page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown exception");
            return Err(
                BridgeError::new(BridgeErrorKind::ScriptFailed).with_hint(text.to_string())
            );
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Install a script evaluated on every new document in this page.
    /// Returns the identifier [`Self::remove_init_script`] takes.
    pub async fn add_init_script(&self, page: PageId, source: &str) -> Result<String, BridgeError> {
        let response = self
            .page_command(
                page,
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        response
            .get("identifier")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BridgeError::new(BridgeErrorKind::Internal)
                    .with_hint("missing init script identifier")
            })
    }

    pub async fn remove_init_script(
        &self,
        page: PageId,
        identifier: &str,
    ) -> Result<(), BridgeError> {
        self.page_command(
            page,
            "Page.removeScriptToEvaluateOnNewDocument",
            json!({ "identifier": identifier }),
        )
        .await
        .map(|_| ())
    }

    pub async fn dispatch_mouse_event(
        &self,
        page: PageId,
        params: Value,
    ) -> Result<(), BridgeError> {
        self.page_command(page, "Input.dispatchMouseEvent", params)
            .await
            .map(|_| ())
    }

    pub async fn dispatch_key_event(
        &self,
        page: PageId,
        params: Value,
    ) -> Result<(), BridgeError> {
        self.page_command(page, "Input.dispatchKeyEvent", params)
            .await
            .map(|_| ())
    }

    pub async fn insert_text(&self, page: PageId, text: &str) -> Result<(), BridgeError> {
        self.page_command(page, "Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    /// Capture a PNG screenshot. `region` selects a viewport-relative clip
    /// in CSS pixels; `full_page` captures beyond the viewport instead.
    pub async fn screenshot(
        &self,
        page: PageId,
        region: Option<ScreenshotRegion>,
        full_page: bool,
    ) -> Result<Vec<u8>, BridgeError> {
        let mut params = json!({ "format": "png" });
        if let Some(region) = region {
            params["clip"] = json!({
                "x": region.x,
                "y": region.y,
                "width": region.width,
                "height": region.height,
                "scale": 1,
            });
        } else if full_page {
            params["captureBeyondViewport"] = json!(true);
        }

        let response = self
            .page_command(page, "Page.captureScreenshot", params)
            .await?;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BridgeError::new(BridgeErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        BASE64.decode(data).map_err(|err| {
            BridgeError::new(BridgeErrorKind::Internal).with_hint(err.to_string())
        })
    }

    /// Override the device scale factor for this page.
    pub async fn set_device_scale_factor(
        &self,
        page: PageId,
        scale: f64,
    ) -> Result<(), BridgeError> {
        self.page_command(
            page,
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": 0,
                "height": 0,
                "deviceScaleFactor": scale,
                "mobile": false,
            }),
        )
        .await
        .map(|_| ())
    }

    /// Poll `document.readyState` until the page is interactive.
    pub async fn wait_for_dom_ready(
        &self,
        page: PageId,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(BridgeError::new(BridgeErrorKind::NavTimeout)
                    .with_hint("dom ready wait timed out"));
            }

            let response = self
                .page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": "document.readyState",
                        "returnByValue": true,
                    }),
                )
                .await?;
            let ready = response
                .get("result")
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
                .map(|state| matches!(state, "interactive" | "complete"))
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    /// Wait until the page has had no in-flight requests for `window`.
    /// A page with no recorded network activity counts as quiet.
    pub async fn wait_for_network_quiet(
        &self,
        page: PageId,
        window: Duration,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            let quiet = match self.net.get(&page) {
                Some(entry) => entry.inflight == 0 && entry.last_change.elapsed() >= window,
                None => true,
            };
            if quiet {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::new(BridgeErrorKind::NavTimeout)
                    .with_hint("network quiet wait timed out"));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn scripted_bridge() -> (Arc<PageBridge>, Arc<ScriptedTransport>, PageId) {
        let transport = Arc::new(ScriptedTransport::new());
        let bridge = Arc::new(PageBridge::with_transport(
            BridgeConfig::default(),
            transport.clone(),
        ));
        let page = PageId::new();
        bridge
            .registry
            .insert_page(page, "target-1".to_string(), "session-1".to_string());
        (bridge, transport, page)
    }

    #[tokio::test]
    async fn evaluate_unwraps_returned_value() {
        let (bridge, transport, page) = scripted_bridge();
        transport.push_response(
            "Runtime.evaluate",
            json!({ "result": { "value": { "ok": true } } }),
        );

        let value = bridge.evaluate(page, "({ ok: true })").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn evaluate_surfaces_page_exceptions() {
        let (bridge, transport, page) = scripted_bridge();
        transport.push_response(
            "Runtime.evaluate",
            json!({
                "result": {},
                "exceptionDetails": { "text": "ReferenceError: nope" },
            }),
        );

        let err = bridge.evaluate(page, "nope()").await.unwrap_err();
        assert_eq!(err.kind, BridgeErrorKind::ScriptFailed);
    }

    #[tokio::test]
    async fn screenshot_passes_clip_in_css_pixels() {
        let (bridge, transport, page) = scripted_bridge();
        let encoded = BASE64.encode(b"png-bytes");
        transport.push_response("Page.captureScreenshot", json!({ "data": encoded }));

        let region = ScreenshotRegion {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 100.0,
        };
        let bytes = bridge.screenshot(page, Some(region), false).await.unwrap();
        assert_eq!(bytes, b"png-bytes");

        let calls = transport.commands_for("Page.captureScreenshot");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["clip"]["width"], 200.0);
        // Device scaling happens in the protocol; the clip is never
        // pre-multiplied.
        assert_eq!(calls[0]["clip"]["scale"], 1);
        assert!(calls[0].get("captureBeyondViewport").is_none());
    }

    #[tokio::test]
    async fn full_page_screenshot_captures_beyond_viewport() {
        let (bridge, transport, page) = scripted_bridge();
        transport.push_response(
            "Page.captureScreenshot",
            json!({ "data": BASE64.encode(b"x") }),
        );

        bridge.screenshot(page, None, true).await.unwrap();
        let calls = transport.commands_for("Page.captureScreenshot");
        assert_eq!(calls[0]["captureBeyondViewport"], true);
        assert!(calls[0].get("clip").is_none());
    }

    #[tokio::test]
    async fn init_scripts_round_trip_their_identifier() {
        let (bridge, transport, page) = scripted_bridge();
        transport.push_response(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "identifier": "7" }),
        );

        let id = bridge.add_init_script(page, "void 0").await.unwrap();
        assert_eq!(id, "7");

        bridge.remove_init_script(page, &id).await.unwrap();
        let removed = transport.commands_for("Page.removeScriptToEvaluateOnNewDocument");
        assert_eq!(removed[0]["identifier"], "7");
    }

    #[tokio::test]
    async fn binding_payloads_route_to_the_registered_channel() {
        let (bridge, _transport, _page) = scripted_bridge();
        let mut rx = bridge.register_channel("pagesnap_rec").await.unwrap();

        bridge
            .process_event(TransportEvent {
                method: "Runtime.bindingCalled".to_string(),
                params: json!({
                    "name": "pagesnap_rec",
                    "payload": "{\"type\":\"click\",\"x\":5,\"y\":6,\"t\":10}",
                }),
                session_id: Some("session-1".to_string()),
            })
            .await;

        let value = rx.try_recv().unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["x"], 5);
    }

    #[tokio::test]
    async fn reregistering_a_channel_replaces_the_previous_receiver() {
        let (bridge, _transport, _page) = scripted_bridge();
        let mut old_rx = bridge.register_channel("chan").await.unwrap();
        let mut new_rx = bridge.register_channel("chan").await.unwrap();

        bridge
            .process_event(TransportEvent {
                method: "Runtime.bindingCalled".to_string(),
                params: json!({ "name": "chan", "payload": "1" }),
                session_id: None,
            })
            .await;

        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn network_counters_feed_quiet_wait() {
        let (bridge, _transport, page) = scripted_bridge();
        // Note: the scripted page was registered manually, so seed activity
        // through the event path.
        bridge
            .process_event(TransportEvent {
                method: "Network.requestWillBeSent".to_string(),
                params: json!({}),
                session_id: Some("session-1".to_string()),
            })
            .await;

        let err = bridge
            .wait_for_network_quiet(page, Duration::from_millis(10), Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        bridge
            .process_event(TransportEvent {
                method: "Network.loadingFinished".to_string(),
                params: json!({}),
                session_id: Some("session-1".to_string()),
            })
            .await;

        bridge
            .wait_for_network_quiet(page, Duration::from_millis(10), Duration::from_millis(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn navigate_rejects_error_text() {
        let (bridge, transport, page) = scripted_bridge();
        transport.push_response(
            "Page.navigate",
            json!({ "frameId": "f", "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
        );

        let err = bridge
            .navigate(page, "https://nope.invalid/", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BridgeErrorKind::CdpIo);
    }
}
