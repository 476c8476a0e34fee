//! Raw-event to action compilation.

use pagesnap_core_types::{Action, RawEvent, ReplayFidelity};

/// Inter-event gaps larger than this become explicit wait actions.
pub const GAP_THRESHOLD_MS: u64 = 40;

/// Compile a recorded event stream into a replayable action list.
///
/// Events are ordered by their session offset (a stable sort, so ties keep
/// arrival order), gaps above [`GAP_THRESHOLD_MS`] are materialized as waits,
/// and each event maps to exactly one action. Under
/// [`ReplayFidelity::CoarsePointer`] mousemove events are dropped before gap
/// computation, so the wait structure of the coarse list is derived from the
/// events it actually contains.
///
/// The compilation is pure: the same events and fidelity always produce the
/// same actions.
pub fn compile_actions(events: &[RawEvent], fidelity: ReplayFidelity) -> Vec<Action> {
    let mut events: Vec<&RawEvent> = events
        .iter()
        .filter(|event| {
            fidelity == ReplayFidelity::Full || !matches!(event, RawEvent::Mousemove { .. })
        })
        .collect();
    events.sort_by_key(|event| event.offset_ms());

    let mut actions = Vec::with_capacity(events.len());
    let mut prev_t: Option<u64> = None;
    for event in events {
        let t = event.offset_ms();
        if let Some(prev) = prev_t {
            let gap = t.saturating_sub(prev);
            if gap > GAP_THRESHOLD_MS {
                actions.push(Action::Wait { ms: gap });
            }
        }
        prev_t = Some(t);
        actions.push(lower(event));
    }
    actions
}

fn lower(event: &RawEvent) -> Action {
    match event {
        RawEvent::Mousedown { x, y, .. } => Action::Mousedown { x: *x, y: *y },
        RawEvent::Mouseup { x, y, .. } => Action::Mouseup { x: *x, y: *y },
        RawEvent::Mousemove { x, y, .. } => Action::Mousemove { x: *x, y: *y },
        RawEvent::Click { x, y, .. } => Action::Click { x: *x, y: *y },
        RawEvent::Keydown { key, .. } => Action::Keyboard { key: key.clone() },
        RawEvent::Wheel {
            delta_x,
            delta_y,
            selector,
            ..
        } => Action::Wheel {
            delta_x: *delta_x,
            delta_y: *delta_y,
            selector: selector.clone(),
        },
        RawEvent::Scroll { x, y, .. } => Action::ScrollTo { x: *x, y: *y },
    }
}
