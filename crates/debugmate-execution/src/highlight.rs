//! In-page highlight overlays and their registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use debugmate_core::agent::Rect;
use debugmate_core::clock::{Clock, SystemClock};
use uuid::Uuid;

/// Attribute set on every overlay element so they can be swept in bulk.
pub const HIGHLIGHT_ATTRIBUTE: &str = "data-debugmate-highlight";

const DEFAULT_COLOR: &str = "#ff4d4f";

struct Registered {
    dom_ids: Vec<String>,
    /// When the overlays remove themselves (ms).
    expires_at: u64,
}

/// Maps a highlight id to the DOM ids of the overlays it created.
///
/// Entries are dropped once their overlays have timed out on the page.
pub struct HighlightRegistry {
    entries: Mutex<HashMap<String, Registered>>,
    clock: Arc<dyn Clock>,
}

impl Default for HighlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Records a set of overlays living `duration_ms` and returns the
    /// highlight id.
    pub fn register(&self, dom_ids: Vec<String>, duration_ms: u64) -> String {
        let id = Uuid::new_v4().to_string();
        let expires_at = self.clock.now_ms().saturating_add(duration_ms);
        let mut entries = self.live();
        entries.insert(id.clone(), Registered { dom_ids, expires_at });
        id
    }

    /// Removes and returns the overlays of one live highlight.
    pub fn take(&self, id: &str) -> Option<Vec<String>> {
        self.live().remove(id).map(|r| r.dom_ids)
    }

    /// Removes every registered highlight and returns the live overlay ids.
    pub fn drain(&self) -> Vec<String> {
        self.live().drain().flat_map(|(_, r)| r.dom_ids).collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the map after dropping expired entries.
    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registered>> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, r| r.expires_at > now);
        entries
    }
}

/// Fresh DOM id for one overlay element.
pub fn new_dom_id() -> String {
    format!("debugmate-hl-{}", Uuid::new_v4().simple())
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script drawing a fixed-position box over `rect`, with an optional
/// label, that removes itself after `duration_ms`.
pub fn overlay_script(
    dom_id: &str,
    rect: &Rect,
    label: Option<&str>,
    color: Option<&str>,
    duration_ms: u64,
) -> String {
    let color = js_string(color.unwrap_or(DEFAULT_COLOR));
    let label = label.map(js_string).unwrap_or_else(|| "null".to_string());
    format!(
        r#"(() => {{
  const box = document.createElement('div');
  box.id = {id};
  box.setAttribute('{attr}', '1');
  Object.assign(box.style, {{
    position: 'fixed', left: '{left}px', top: '{top}px', width: '{width}px', height: '{height}px',
    border: '3px solid ' + {color}, background: 'rgba(255,77,79,0.12)', zIndex: '2147483647',
    pointerEvents: 'none', boxSizing: 'border-box'
  }});
  const label = {label};
  if (label) {{
    const tip = document.createElement('div');
    tip.textContent = label;
    Object.assign(tip.style, {{
      position: 'absolute', left: '0', top: '-24px', padding: '2px 6px', font: '12px sans-serif',
      color: '#fff', background: {color}, whiteSpace: 'nowrap'
    }});
    box.appendChild(tip);
  }}
  document.body.appendChild(box);
  setTimeout(() => box.remove(), {duration});
  return box.id;
}})()"#,
        id = js_string(dom_id),
        attr = HIGHLIGHT_ATTRIBUTE,
        left = rect.left,
        top = rect.top,
        width = rect.width,
        height = rect.height,
        color = color,
        label = label,
        duration = duration_ms,
    )
}

/// Script removing the given overlays. Returns how many were found.
pub fn removal_script(dom_ids: &[String]) -> String {
    let ids = serde_json::to_string(dom_ids).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ let n = 0; for (const id of {ids}) {{ const el = document.getElementById(id); if (el) {{ el.remove(); n++; }} }} return n; }})()"
    )
}

/// Script removing every overlay carrying [`HIGHLIGHT_ATTRIBUTE`].
pub fn clear_all_script() -> String {
    format!(
        "(() => {{ const els = document.querySelectorAll('[{HIGHLIGHT_ATTRIBUTE}]'); els.forEach(el => el.remove()); return els.length; }})()"
    )
}
