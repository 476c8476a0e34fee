//! Host side of a recording session.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use pagesnap_cdp_bridge::{PageBridge, PageId};
use pagesnap_core_types::RawEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::RecorderError;
use crate::inject::{RECORDER_BINDING, RECORDER_JS};

/// Drives the injected recorder on one page: start installs the listeners,
/// stop tears them down and returns everything captured in between.
pub struct RecorderSession {
    bridge: Arc<PageBridge>,
    page: PageId,
    rx: Option<mpsc::Receiver<Value>>,
    events: Vec<RawEvent>,
    init_script: Option<String>,
    recording: bool,
}

impl RecorderSession {
    pub fn new(bridge: Arc<PageBridge>, page: PageId) -> Self {
        Self {
            bridge,
            page,
            rx: None,
            events: Vec::new(),
            init_script: None,
            recording: false,
        }
    }

    /// Install the in-page recorder and begin capturing. Starting an
    /// already-running session restarts it with an empty buffer.
    pub async fn start(&mut self) -> Result<(), RecorderError> {
        self.events.clear();
        let rx = self.bridge.register_channel(RECORDER_BINDING).await?;
        self.rx = Some(rx);

        // Re-install and restart on every new document, so a navigation in
        // the middle of the session keeps capturing. Event offsets restart
        // with the new document's clock.
        if let Some(id) = self.init_script.take() {
            let _ = self.bridge.remove_init_script(self.page, &id).await;
        }
        let boot = format!("{RECORDER_JS};\nwindow.__pagesnapRecorder.start();");
        let script_id = self.bridge.add_init_script(self.page, &boot).await?;
        self.init_script = Some(script_id);

        self.bridge.evaluate(self.page, RECORDER_JS).await?;
        self.bridge
            .evaluate(self.page, "window.__pagesnapRecorder.start()")
            .await?;
        self.recording = true;
        debug!(target: "action-recorder", page = ?self.page, "recording started");
        Ok(())
    }

    /// Stop the in-page recorder, drain any events still in flight, and
    /// return the captured session.
    pub async fn stop(&mut self) -> Result<Vec<RawEvent>, RecorderError> {
        if !self.recording {
            return Err(RecorderError::NotRecording);
        }
        self.recording = false;

        if let Err(err) = self
            .bridge
            .evaluate(self.page, "window.__pagesnapRecorder.stop()")
            .await
        {
            // The page may have navigated away mid-session; what was
            // captured so far is still usable.
            warn!(target: "action-recorder", %err, "recorder stop script failed");
        }

        if let Some(id) = self.init_script.take() {
            if let Err(err) = self.bridge.remove_init_script(self.page, &id).await {
                warn!(target: "action-recorder", %err, "failed to remove recorder init script");
            }
        }

        self.drain(Duration::from_millis(250)).await;
        debug!(
            target: "action-recorder",
            events = self.events.len(),
            "recording stopped"
        );
        Ok(mem::take(&mut self.events))
    }

    /// Pull pending payloads off the channel until it stays idle for
    /// `idle`. Undecodable payloads are logged and skipped.
    async fn drain(&mut self, idle: Duration) {
        let Some(rx) = self.rx.as_mut() else { return };
        loop {
            match timeout(idle, rx.recv()).await {
                Ok(Some(value)) => match serde_json::from_value::<RawEvent>(value) {
                    Ok(event) => self.events.push(event),
                    Err(err) => {
                        warn!(target: "action-recorder", %err, "skipping undecodable event")
                    }
                },
                Ok(None) | Err(_) => break,
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesnap_cdp_bridge::{BridgeConfig, ScriptedTransport};
    use serde_json::json;

    fn scripted() -> (Arc<PageBridge>, Arc<ScriptedTransport>, PageId) {
        let transport = Arc::new(ScriptedTransport::new());
        let bridge = Arc::new(PageBridge::with_transport(
            BridgeConfig::default(),
            transport.clone(),
        ));
        let page = PageId::new();
        bridge
            .registry
            .insert_page(page, "t".to_string(), "s".to_string());
        (bridge, transport, page)
    }

    #[tokio::test]
    async fn recording_installs_an_init_script_and_removes_it_on_stop() {
        let (bridge, transport, page) = scripted();
        transport.push_response(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "identifier": "boot-1" }),
        );

        let mut session = RecorderSession::new(bridge, page);
        session.start().await.unwrap();

        let installed = transport.commands_for("Page.addScriptToEvaluateOnNewDocument");
        assert_eq!(installed.len(), 1);
        let source = installed[0]["source"].as_str().unwrap();
        // The boot script must both install and start, so a fresh document
        // resumes capturing on its own.
        assert!(source.contains("__pagesnapRecorder"));
        assert!(source.trim_end().ends_with("window.__pagesnapRecorder.start();"));

        let events = session.stop().await.unwrap();
        assert!(events.is_empty());
        let removed = transport.commands_for("Page.removeScriptToEvaluateOnNewDocument");
        assert_eq!(removed[0]["identifier"], "boot-1");
    }

    #[tokio::test]
    async fn restarting_replaces_the_previous_init_script() {
        let (bridge, transport, page) = scripted();
        transport.push_response(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "identifier": "boot-1" }),
        );
        transport.push_response(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "identifier": "boot-2" }),
        );

        let mut session = RecorderSession::new(bridge, page);
        session.start().await.unwrap();
        session.start().await.unwrap();

        let removed = transport.commands_for("Page.removeScriptToEvaluateOnNewDocument");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0]["identifier"], "boot-1");
    }
}
