//! The entries file is an external contract: other tooling reads it, and
//! files written by hand (or by older builds) must load.

use pagesnap_cli::store::EntryStore;
use pagesnap_core_types::{Action, Clip, ScreenshotEntry};
use serde_json::json;

#[test]
fn handwritten_entry_files_load() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("screenshots.json");
    let raw = json!([
        {
            "url": "https://example.com/pricing",
            "png_name": "pricing",
            "clip": { "x": 0, "y": 640, "width": 1280, "height": 480 },
            "actions": [
                { "type": "wait", "ms": 750 },
                { "type": "click", "x": 312, "y": 96 },
                { "type": "scrollTo", "x": 0, "y": 640 },
                { "type": "wheel", "deltaX": 0.0, "deltaY": 240.0, "selector": "div#plans" },
                { "type": "keyboard", "key": "Tab" }
            ]
        }
    ]);
    std::fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

    let store = EntryStore::new(&path);
    let entries = store.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].png_name, "pricing");
    assert_eq!(entries[0].clip, Clip::new(0, 640, 1280, 480));
    assert_eq!(entries[0].actions.len(), 5);
    assert_eq!(entries[0].actions[0], Action::Wait { ms: 750 });
}

#[test]
fn saved_entries_round_trip_byte_stable_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let store = EntryStore::new(tmp.path().join("screenshots.json"));

    let entry = ScreenshotEntry {
        url: "https://example.com".to_string(),
        png_name: "front".to_string(),
        clip: Clip::new(10, 20, 300, 200),
        actions: vec![
            Action::Mousedown { x: 1, y: 2 },
            Action::Mousemove { x: 5, y: 6 },
            Action::Mouseup { x: 5, y: 6 },
        ],
    };
    store.upsert(entry.clone()).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw[0]["actions"][0]["type"], "mousedown");
    assert_eq!(raw[0]["clip"]["width"], 300);

    assert_eq!(store.load().unwrap(), vec![entry]);
}

#[test]
fn entries_with_future_action_types_still_load() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("screenshots.json");
    std::fs::write(
        &path,
        r#"[{ "url": "https://example.com", "png_name": "x",
             "clip": { "x": 0, "y": 0, "width": 10, "height": 10 },
             "actions": [ { "type": "dragAndDrop", "from": [0,0], "to": [5,5] } ] }]"#,
    )
    .unwrap();

    let entries = EntryStore::new(&path).load().unwrap();
    assert_eq!(entries[0].actions, vec![Action::Unknown]);
}
