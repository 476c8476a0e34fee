//! JavaScript injected into the recorded page.
//!
//! The recorder script installs `window.__pagesnapRecorder` with `start` and
//! `stop`, streaming every captured event to the host through the
//! `window.pagesnap_rec` binding as a JSON string. Timestamps are
//! `performance.now()` offsets from the moment `start` ran, so one monotonic
//! clock orders the whole session.

/// Name of the CDP binding the recorder script emits events through.
pub const RECORDER_BINDING: &str = "pagesnap_rec";

pub const RECORDER_JS: &str = r#"
(() => {
  if (window.__pagesnapRecorder) { return 'already-installed'; }

  const MOVE_MIN_PX = 2;     // Manhattan distance
  const MOVE_MIN_MS = 40;

  const state = {
    running: false,
    origin: 0,
    lastMove: null,
    handlers: [],
  };

  const emit = (ev) => {
    if (!state.running) { return; }
    ev.t = Math.round(performance.now() - state.origin);
    try { window.pagesnap_rec(JSON.stringify(ev)); } catch (e) {}
  };

  const cssPath = (el) => {
    if (!el || el === document || el === window) { return null; }
    const parts = [];
    let node = el;
    while (node && node.nodeType === Node.ELEMENT_NODE) {
      if (node.id) {
        // An id anywhere on the ancestor chain anchors the selector;
        // positional steps below it survive re-renders around it.
        parts.unshift(node.tagName.toLowerCase() + '#' + node.id);
        return parts.join(' > ');
      }
      let part = node.tagName.toLowerCase();
      const parent = node.parentElement;
      if (parent) {
        const idx = Array.prototype.indexOf.call(parent.children, node);
        part += ':nth-child(' + (idx + 1) + ')';
      }
      parts.unshift(part);
      node = parent;
    }
    return parts.join(' > ');
  };

  const listen = (target, name, fn, opts) => {
    target.addEventListener(name, fn, opts);
    state.handlers.push(() => target.removeEventListener(name, fn, opts));
  };

  const onMouse = (type) => (e) => {
    emit({ type, x: Math.round(e.clientX), y: Math.round(e.clientY) });
  };

  const onMove = (e) => {
    const x = Math.round(e.clientX), y = Math.round(e.clientY);
    const now = performance.now();
    if (state.lastMove) {
      const moved = Math.abs(x - state.lastMove.x) + Math.abs(y - state.lastMove.y);
      const waited = now - state.lastMove.at;
      if (moved < MOVE_MIN_PX && waited < MOVE_MIN_MS) { return; }
    }
    state.lastMove = { x, y, at: now };
    emit({ type: 'mousemove', x, y });
  };

  const onWheel = (e) => {
    emit({
      type: 'wheel',
      deltaX: e.deltaX,
      deltaY: e.deltaY,
      selector: cssPath(e.target),
    });
  };

  const onScroll = () => {
    emit({
      type: 'scroll',
      x: Math.round(window.scrollX),
      y: Math.round(window.scrollY),
    });
  };

  const onKey = (e) => {
    emit({ type: 'keydown', key: e.key });
  };

  window.__pagesnapRecorder = {
    start() {
      if (state.running) { return 'running'; }
      state.running = true;
      state.origin = performance.now();
      state.lastMove = null;
      listen(document, 'mousedown', onMouse('mousedown'), true);
      listen(document, 'mouseup', onMouse('mouseup'), true);
      listen(document, 'click', onMouse('click'), true);
      listen(document, 'mousemove', onMove, true);
      listen(document, 'wheel', onWheel, { capture: true, passive: true });
      listen(window, 'scroll', onScroll, { passive: true });
      listen(document, 'keydown', onKey, true);
      return 'started';
    },
    stop() {
      if (!state.running) { return 'stopped'; }
      state.running = false;
      for (const off of state.handlers) { off(); }
      state.handlers = [];
      return 'stopped';
    },
  };
  return 'installed';
})()
"#;

/// Drag-to-select overlay. Resolves with `{x, y, width, height}` in document
/// coordinates, or `null` when cancelled with Escape or when the drag never
/// left its anchor point.
pub const CLIP_JS: &str = r#"
new Promise((resolve) => {
  const overlay = document.createElement('div');
  overlay.style.cssText =
    'position:fixed;inset:0;z-index:2147483647;cursor:crosshair;' +
    'background:rgba(0,0,0,0.08);';
  const box = document.createElement('div');
  box.style.cssText =
    'position:fixed;border:2px dashed #e33;background:rgba(230,60,60,0.12);' +
    'pointer-events:none;display:none;';
  overlay.appendChild(box);
  document.body.appendChild(overlay);

  let anchor = null;
  let last = null;

  const finish = (value) => {
    overlay.remove();
    document.removeEventListener('keydown', onKey, true);
    resolve(value);
  };

  const onKey = (e) => {
    if (e.key === 'Escape') {
      e.preventDefault();
      finish(null);
    }
  };

  const draw = (a, b) => {
    box.style.display = 'block';
    box.style.left = Math.min(a.x, b.x) + 'px';
    box.style.top = Math.min(a.y, b.y) + 'px';
    box.style.width = Math.abs(b.x - a.x) + 'px';
    box.style.height = Math.abs(b.y - a.y) + 'px';
  };

  overlay.addEventListener('pointerdown', (e) => {
    anchor = { x: e.clientX, y: e.clientY };
    last = anchor;
    draw(anchor, anchor);
  });
  overlay.addEventListener('pointermove', (e) => {
    if (!anchor) { return; }
    last = { x: e.clientX, y: e.clientY };
    draw(anchor, last);
  });
  overlay.addEventListener('pointerup', () => {
    if (!anchor || !last || (anchor.x === last.x && anchor.y === last.y)) {
      finish(null);
      return;
    }
    finish({
      x: Math.round(Math.min(anchor.x, last.x) + window.scrollX),
      y: Math.round(Math.min(anchor.y, last.y) + window.scrollY),
      width: Math.round(Math.abs(last.x - anchor.x)),
      height: Math.round(Math.abs(last.y - anchor.y)),
    });
  });
  document.addEventListener('keydown', onKey, true);
})
"#;

#[cfg(test)]
mod tests {
    use super::*;

    // The selector builder is plain script, so these pin its structure: the
    // id short-circuit has to live inside the ascent loop, and the
    // positional chain has to reach the root unanchored.

    #[test]
    fn selector_ascent_checks_ids_before_extending_the_chain() {
        let ascent = RECORDER_JS
            .split_once("while (node")
            .expect("selector ascent loop")
            .1;
        let id_check = ascent.find("node.id").expect("id short-circuit");
        let chain_step = ascent.find(":nth-child(").expect("positional step");
        assert!(id_check < chain_step);
    }

    #[test]
    fn selector_chain_is_not_truncated() {
        assert!(!RECORDER_JS.contains("parts.length <"));
    }
}
