//! Bounded registry of screenshots taken during a session.

use std::collections::VecDeque;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use uuid::Uuid;

/// Keeps the most recent screenshots (base64 PNG) addressable by id.
#[derive(Debug)]
pub struct SnapshotStore {
    capacity: usize,
    snapshots: Mutex<VecDeque<(String, String)>>,
}

impl SnapshotStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    /// Stores a screenshot, dropping the oldest past capacity.
    pub fn insert(&self, screenshot: String) -> String {
        let id = Uuid::new_v4().to_string();
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        snapshots.push_back((id.clone(), screenshot));
        while snapshots.len() > self.capacity {
            snapshots.pop_front();
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.snapshots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|(sid, _)| sid == id)
            .map(|(_, shot)| shot.clone())
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte-level difference between two base64 screenshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenshotDiff {
    pub changed: bool,
    /// Fraction of differing bytes over the longer image, in `[0, 1]`.
    pub ratio: f64,
}

/// Compares two base64 images. Undecodable input compares as text.
pub fn diff_screenshots(before: &str, after: &str) -> ScreenshotDiff {
    let decode = |s: &str| BASE64_STANDARD.decode(s.trim()).unwrap_or_else(|_| s.as_bytes().to_vec());
    let (a, b) = (decode(before), decode(after));

    let longest = a.len().max(b.len());
    if longest == 0 {
        return ScreenshotDiff { changed: false, ratio: 0.0 };
    }
    let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count() + a.len().abs_diff(b.len());

    ScreenshotDiff {
        changed: differing > 0,
        ratio: differing as f64 / longest as f64,
    }
}

pub fn encode_png(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}
