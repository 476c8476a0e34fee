//! Shared data model for the pagesnap pipeline.
//!
//! These types cross crate boundaries: raw events produced by the in-page
//! recorder, compiled actions replayed against a page, capture regions, and
//! the persisted entry record. Wire and file formats are fixed here; the
//! other crates only add behavior.

use serde::{Deserialize, Serialize};

/// One normalized interaction event captured inside the page.
///
/// Transient: produced during a recording session, consumed by the action
/// compiler, then discarded. `t` is milliseconds since the session started,
/// measured on a single monotonic clock inside the page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawEvent {
    Mousedown {
        x: i64,
        y: i64,
        t: u64,
    },
    Mouseup {
        x: i64,
        y: i64,
        t: u64,
    },
    Mousemove {
        x: i64,
        y: i64,
        t: u64,
    },
    Click {
        x: i64,
        y: i64,
        t: u64,
    },
    Keydown {
        key: String,
        t: u64,
    },
    Wheel {
        #[serde(rename = "deltaX")]
        delta_x: f64,
        #[serde(rename = "deltaY")]
        delta_y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        t: u64,
    },
    Scroll {
        x: i64,
        y: i64,
        t: u64,
    },
}

impl RawEvent {
    /// Milliseconds since recording start.
    pub fn offset_ms(&self) -> u64 {
        match self {
            RawEvent::Mousedown { t, .. }
            | RawEvent::Mouseup { t, .. }
            | RawEvent::Mousemove { t, .. }
            | RawEvent::Click { t, .. }
            | RawEvent::Keydown { t, .. }
            | RawEvent::Wheel { t, .. }
            | RawEvent::Scroll { t, .. } => *t,
        }
    }
}

/// A replayable action compiled from raw events.
///
/// Persisted as part of a [`ScreenshotEntry`]; the serialized form is the
/// external contract and must not drift. Unrecognized `type` tags
/// deserialize to [`Action::Unknown`] so older builds can replay entry files
/// written by newer ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Wait {
        ms: u64,
    },
    Click {
        x: i64,
        y: i64,
    },
    Mousedown {
        x: i64,
        y: i64,
    },
    Mousemove {
        x: i64,
        y: i64,
    },
    Mouseup {
        x: i64,
        y: i64,
    },
    #[serde(rename = "scrollTo")]
    ScrollTo {
        x: i64,
        y: i64,
    },
    Wheel {
        #[serde(rename = "deltaX")]
        delta_x: f64,
        #[serde(rename = "deltaY")]
        delta_y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    Keyboard {
        key: String,
    },
    #[serde(other)]
    Unknown,
}

/// Rectangular capture region in document (page, not viewport) coordinates,
/// CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Clip {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A clip can only drive a region capture when both dimensions are
    /// positive; anything else falls back to a full-page capture.
    pub fn is_capturable(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// True when every field of `self` is within `tolerance` of `other`.
    pub fn approx_eq(&self, other: &Clip, tolerance: i64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// One persisted screenshot definition: where to go, what to replay, and
/// which region to capture. 1:1 with an artifact file named after
/// `png_name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEntry {
    pub url: String,
    pub png_name: String,
    pub clip: Clip,
    pub actions: Vec<Action>,
}

/// How much pointer detail the compiler keeps.
///
/// `Full` retains throttled `mousemove` events (drag fidelity);
/// `CoarsePointer` drops them before compilation, keeping only presses,
/// releases and clicks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayFidelity {
    #[default]
    Full,
    CoarsePointer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_wire_format_matches_contract() {
        let actions = vec![
            Action::Wait { ms: 120 },
            Action::Click { x: 10, y: 20 },
            Action::ScrollTo { x: 0, y: 400 },
            Action::Wheel {
                delta_x: 0.0,
                delta_y: 120.0,
                selector: Some("div#list".to_string()),
            },
            Action::Keyboard {
                key: "Enter".to_string(),
            },
        ];
        let value = serde_json::to_value(&actions).unwrap();
        assert_eq!(
            value,
            json!([
                { "type": "wait", "ms": 120 },
                { "type": "click", "x": 10, "y": 20 },
                { "type": "scrollTo", "x": 0, "y": 400 },
                { "type": "wheel", "deltaX": 0.0, "deltaY": 120.0, "selector": "div#list" },
                { "type": "keyboard", "key": "Enter" },
            ])
        );
    }

    #[test]
    fn unknown_action_tags_deserialize_without_failing() {
        let raw = json!([
            { "type": "wait", "ms": 5 },
            { "type": "hover", "x": 1, "y": 2 },
        ]);
        let actions: Vec<Action> = serde_json::from_value(raw).unwrap();
        assert_eq!(actions[0], Action::Wait { ms: 5 });
        assert_eq!(actions[1], Action::Unknown);
    }

    #[test]
    fn raw_event_roundtrip() {
        let raw = json!({ "type": "wheel", "deltaX": 2.5, "deltaY": -30.0,
                          "selector": "div:nth-child(3)", "t": 812 });
        let event: RawEvent = serde_json::from_value(raw).unwrap();
        match &event {
            RawEvent::Wheel {
                delta_y, selector, ..
            } => {
                assert_eq!(*delta_y, -30.0);
                assert_eq!(selector.as_deref(), Some("div:nth-child(3)"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(event.offset_ms(), 812);
    }

    #[test]
    fn clip_capturability_and_tolerance() {
        assert!(!Clip::default().is_capturable());
        assert!(!Clip::new(0, 0, 100, 0).is_capturable());
        assert!(Clip::new(5, 5, 10, 10).is_capturable());

        let base = Clip::new(100, 100, 300, 200);
        assert!(Clip::new(103, 98, 302, 197).approx_eq(&base, 5));
        assert!(!Clip::new(110, 100, 300, 200).approx_eq(&base, 5));
    }

    #[test]
    fn entry_field_names_are_stable() {
        let entry = ScreenshotEntry {
            url: "https://example.com".to_string(),
            png_name: "dashboard".to_string(),
            clip: Clip::new(0, 0, 200, 100),
            actions: vec![Action::Wait { ms: 100 }],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("png_name").is_some());
        assert!(value.get("clip").and_then(|c| c.get("width")).is_some());
    }
}
