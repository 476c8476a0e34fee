//! Keyboard dispatch helpers.

use std::sync::Arc;

use pagesnap_cdp_bridge::{PageBridge, PageId};
use serde_json::json;

use crate::errors::ReplayError;

/// Whether `key` is a printable character rather than a named key.
///
/// Recorded keys follow the DOM `KeyboardEvent.key` convention: a single
/// character for printable input, a multi-character name (`Enter`,
/// `CapsLock`, `F5`, `ArrowDown`, ...) for everything else. Only printable
/// keys may fall back to text insertion; typing a key name into the page
/// would corrupt it.
pub fn is_printable(key: &str) -> bool {
    key.chars().count() == 1
}

/// Dispatch a keyDown/keyUp pair for `key`. Printable keys carry their text
/// so the page receives input, Enter carries a carriage return, and named
/// keys go through as raw key events.
pub async fn press_key(
    bridge: &Arc<PageBridge>,
    page: PageId,
    key: &str,
) -> Result<(), ReplayError> {
    if key.is_empty() {
        return Err(ReplayError::UnsupportedKey(key.to_string()));
    }

    let text = if is_printable(key) {
        Some(key.to_string())
    } else if key == "Enter" {
        Some("\r".to_string())
    } else {
        None
    };

    let mut down = json!({ "type": "keyDown", "key": key });
    if let Some(text) = &text {
        down["text"] = json!(text);
    }
    bridge.dispatch_key_event(page, down).await?;
    bridge
        .dispatch_key_event(page, json!({ "type": "keyUp", "key": key }))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesnap_cdp_bridge::{BridgeConfig, ScriptedTransport};

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

    #[test]
    fn single_characters_are_printable_named_keys_are_not() {
        assert!(is_printable("a"));
        assert!(is_printable("Z"));
        assert!(is_printable("é"));
        assert!(!is_printable("Enter"));
        assert!(!is_printable("F5"));
        assert!(!is_printable("CapsLock"));
    }

    #[tokio::test]
    async fn named_keys_dispatch_without_text() {
        let (bridge, transport, page) = scripted();
        press_key(&bridge, page, "F5").await.unwrap();

        let calls = transport.commands_for("Input.dispatchKeyEvent");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["type"], "keyDown");
        assert_eq!(calls[0]["key"], "F5");
        assert!(calls[0].get("text").is_none());
        assert_eq!(calls[1]["type"], "keyUp");
    }

    #[tokio::test]
    async fn printable_keys_and_enter_carry_text() {
        let (bridge, transport, page) = scripted();
        press_key(&bridge, page, "a").await.unwrap();
        press_key(&bridge, page, "Enter").await.unwrap();

        let calls = transport.commands_for("Input.dispatchKeyEvent");
        assert_eq!(calls[0]["text"], "a");
        assert_eq!(calls[2]["text"], "\r");
    }
}
