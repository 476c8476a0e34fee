//! Pluggable CDP transports.
//!
//! `ChromiumTransport` speaks to a real browser over the DevTools websocket;
//! `NoopTransport` is the inert fallback when no browser is available;
//! `ScriptedTransport` records commands and replays canned responses for
//! tests in this crate and downstream.

use std::collections::{HashMap, VecDeque};
use std::convert::TryInto;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeErrorKind};
use crate::util::extract_ws_url;

/// A raw protocol event forwarded out of the websocket loop.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Where a command is addressed: the browser itself or one page session.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), BridgeError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, BridgeError> {
        Err(BridgeError::new(BridgeErrorKind::Internal)
            .with_hint(format!("no transport available for method {method}")))
    }
}

/// Test transport: every command is logged, responses are served from
/// per-method queues (falling back to an empty object).
#[derive(Default)]
pub struct ScriptedTransport {
    commands: std::sync::Mutex<Vec<(String, Value)>>,
    responses: std::sync::Mutex<HashMap<String, VecDeque<Result<Value, BridgeError>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call of `method`.
    pub fn push_response(&self, method: &str, response: Value) {
        self.responses
            .lock()
            .expect("scripted transport poisoned")
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    /// Queue a failure for the next call of `method`.
    pub fn push_failure(&self, method: &str, error: BridgeError) {
        self.responses
            .lock()
            .expect("scripted transport poisoned")
            .entry(method.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// All commands issued so far, in order.
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands
            .lock()
            .expect("scripted transport poisoned")
            .clone()
    }

    /// Commands issued for one method, in order.
    pub fn commands_for(&self, method: &str) -> Vec<Value> {
        self.commands()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

#[async_trait]
impl CdpTransport for ScriptedTransport {
    async fn start(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        self.commands
            .lock()
            .expect("scripted transport poisoned")
            .push((method.to_string(), params));

        let queued = self
            .responses
            .lock()
            .expect("scripted transport poisoned")
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(response) => response,
            None => Ok(json!({})),
        }
    }
}

/// Transport backed by a live Chromium instance.
///
/// Launches the browser (or attaches to `websocket_url`), then funnels
/// commands and events through a single websocket loop. The connection is
/// established lazily on first use and re-established if the loop dies.
pub struct ChromiumTransport {
    cfg: BridgeConfig,
    link: Mutex<Option<Arc<ChromeLink>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: BridgeConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    async fn link(&self) -> Result<Arc<ChromeLink>, BridgeError> {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.as_ref() {
            if link.is_alive() {
                return Ok(link.clone());
            }
            warn!(target: "cdp-bridge", "chromium link dead; reconnecting");
        }
        let link = Arc::new(ChromeLink::connect(self.cfg.clone()).await?);
        *guard = Some(link.clone());
        Ok(link)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), BridgeError> {
        let link = self.link().await?;
        let deadline = Duration::from_millis(self.cfg.default_deadline_ms);

        link.send(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            deadline,
        )
        .await?;

        link.send(
            CommandTarget::Browser,
            "Target.setAutoAttach",
            json!({
                "autoAttach": true,
                "waitForDebuggerOnStart": false,
                "flatten": true,
            }),
            deadline,
        )
        .await?;

        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: "cdp-bridge", ?err, "transport not ready");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        let link = self.link().await?;
        link.send(
            target,
            method,
            params,
            Duration::from_millis(self.cfg.default_deadline_ms),
        )
        .await
    }
}

struct PendingCommand {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, BridgeError>>,
}

/// One live websocket connection plus the optional child process behind it.
struct ChromeLink {
    command_tx: mpsc::Sender<PendingCommand>,
    events_rx: Mutex<mpsc::Receiver<TransportEvent>>,
    loop_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl ChromeLink {
    async fn connect(cfg: BridgeConfig) -> Result<Self, BridgeError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let browser_cfg = build_browser_config(&cfg)?;
                launch_browser(browser_cfg).await?
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| {
                BridgeError::new(BridgeErrorKind::CdpIo).with_hint(err.to_string())
            })?;

        let (command_tx, command_rx) = mpsc::channel(128);
        let (events_tx, events_rx) = mpsc::channel(512);

        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();
        let loop_task = tokio::spawn(async move {
            let result = Self::run_loop(conn, command_rx, events_tx).await;
            loop_alive.store(false, Ordering::Relaxed);
            if let Err(err) = result {
                error!(target: "cdp-bridge", ?err, "websocket loop terminated with error");
            }
        });

        info!(target: "cdp-bridge", url = %ws_url, "chromium connection established");

        Ok(Self {
            command_tx,
            events_rx: Mutex::new(events_rx),
            loop_task,
            child: Mutex::new(child),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, BridgeError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.command_tx
            .send(PendingCommand {
                target,
                method: method.to_string(),
                params,
                responder: resp_tx,
            })
            .await
            .map_err(|err| {
                BridgeError::new(BridgeErrorKind::CdpIo).with_hint(err.to_string())
            })?;

        match tokio::time::timeout(deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::new(BridgeErrorKind::CdpIo)
                .with_hint("command response channel closed")),
            Err(_) => Err(BridgeError::new(BridgeErrorKind::NavTimeout)
                .with_hint(format!("command {method} timed out"))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let mut guard = self.events_rx.lock().await;
        guard.recv().await
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<PendingCommand>,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), BridgeError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, BridgeError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    let session = match cmd.target {
                        CommandTarget::Browser => None,
                        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                    };
                    let method_id: MethodId = cmd.method.clone().into();
                    match conn.submit_command(method_id, session, cmd.params) {
                        Ok(call_id) => {
                            inflight.insert(call_id, cmd.responder);
                        }
                        Err(err) => {
                            let bridge_err = BridgeError::new(BridgeErrorKind::CdpIo)
                                .with_hint(err.to_string());
                            let _ = cmd.responder.send(Err(bridge_err));
                        }
                    }
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::complete_call(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(event))) => {
                            Self::forward_event(event, &events_tx).await;
                        }
                        Some(Err(err)) => {
                            let bridge_err = map_cdp_error(err);
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(bridge_err.clone()));
                            }
                            return Err(bridge_err);
                        }
                        None => {
                            let err = BridgeError::new(BridgeErrorKind::CdpIo)
                                .with_hint("cdp connection closed");
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(err.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn complete_call(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, BridgeError>>>,
    ) {
        let result = if let Some(value) = resp.result {
            Ok(value)
        } else if let Some(error) = resp.error {
            Err(BridgeError::new(BridgeErrorKind::CdpIo)
                .with_hint(format!("cdp error {}: {}", error.code, error.message))
                .retriable(error.code >= 500))
        } else {
            Err(BridgeError::new(BridgeErrorKind::Internal).with_hint("empty cdp response"))
        };

        if let Some(sender) = inflight.remove(&resp.id) {
            let _ = sender.send(result);
        }
    }

    async fn forward_event(event: CdpEventMessage, events_tx: &mpsc::Sender<TransportEvent>) {
        let raw: Result<CdpJsonEventMessage, _> = event.try_into();
        match raw {
            Ok(raw) => {
                let payload = TransportEvent {
                    method: raw.method.into_owned(),
                    params: raw.params,
                    session_id: raw.session_id,
                };
                if events_tx.send(payload).await.is_err() {
                    debug!(target: "cdp-bridge", "event receiver dropped");
                }
            }
            Err(err) => {
                warn!(target: "cdp-bridge", ?err, "failed to decode cdp event");
            }
        }
    }
}

impl Drop for ChromeLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();

        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-bridge", ?err, "failed to kill chromium child");
                        }
                    });
                }
            }
        }
    }
}

fn build_browser_config(cfg: &BridgeConfig) -> Result<BrowserConfig, BridgeError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(BridgeError::new(BridgeErrorKind::CdpIo).with_hint(format!(
            "chrome executable not found at {} (set PAGESNAP_CHROME)",
            cfg.executable.display()
        )));
    }

    let profile_dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                BridgeError::new(BridgeErrorKind::Internal)
                    .with_hint(format!("failed to resolve cwd: {err}"))
            })?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&profile_dir).map_err(|err| {
        BridgeError::new(BridgeErrorKind::Internal)
            .with_hint(format!("failed to ensure user-data-dir: {err}"))
    })?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20));

    if !cfg.headless {
        builder = builder.with_head();
    }

    if std::env::var("PAGESNAP_DISABLE_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
    ];
    if cfg.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder = builder.user_data_dir(profile_dir);

    builder.build().map_err(|err| {
        BridgeError::new(BridgeErrorKind::Internal)
            .with_hint(format!("browser config error: {err}"))
    })
}

async fn launch_browser(config: BrowserConfig) -> Result<(Option<Child>, String), BridgeError> {
    let mut child = config.launch().map_err(|err| {
        BridgeError::new(BridgeErrorKind::Internal)
            .with_hint(format!("failed to launch chromium: {err}"))
    })?;

    let ws_url = extract_ws_url(&mut child)
        .await
        .map_err(|err| BridgeError::new(BridgeErrorKind::CdpIo).with_hint(err.to_string()))?;

    Ok((Some(child), ws_url))
}

fn map_cdp_error(err: CdpError) -> BridgeError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => BridgeError::new(BridgeErrorKind::NavTimeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::JavascriptException(_) | CdpError::FrameNotFound(_) | CdpError::Serde(_) => {
            BridgeError::new(BridgeErrorKind::Internal).with_hint(hint)
        }
        _ => BridgeError::new(BridgeErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_transport_replays_queued_responses_in_order() {
        let transport = ScriptedTransport::new();
        transport.push_response("Runtime.evaluate", json!({ "result": { "value": 1 } }));
        transport.push_response("Runtime.evaluate", json!({ "result": { "value": 2 } }));

        let first = transport
            .send_command(CommandTarget::Browser, "Runtime.evaluate", json!({}))
            .await
            .unwrap();
        let second = transport
            .send_command(CommandTarget::Browser, "Runtime.evaluate", json!({}))
            .await
            .unwrap();
        let third = transport
            .send_command(CommandTarget::Browser, "Runtime.evaluate", json!({}))
            .await
            .unwrap();

        assert_eq!(first["result"]["value"], 1);
        assert_eq!(second["result"]["value"], 2);
        assert_eq!(third, json!({}));
        assert_eq!(transport.commands_for("Runtime.evaluate").len(), 3);
    }

    #[tokio::test]
    async fn scripted_transport_surfaces_queued_failures() {
        let transport = ScriptedTransport::new();
        transport.push_failure(
            "Page.navigate",
            BridgeError::new(BridgeErrorKind::NavTimeout).with_hint("scripted"),
        );

        let err = transport
            .send_command(CommandTarget::Browser, "Page.navigate", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn noop_transport_rejects_commands() {
        let transport = NoopTransport;
        let err = transport
            .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BridgeErrorKind::Internal);
    }
}
