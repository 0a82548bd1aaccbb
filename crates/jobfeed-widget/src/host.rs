//! Messages the embedded widget posts to its parent frame.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const HEIGHT_DEBOUNCE: Duration = Duration::from_millis(50);
/// Height changes at or below this many pixels are layout jitter.
pub const HEIGHT_JITTER_PX: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    SetHeight { height: u32 },
    ScrollToTop,
}

impl HostMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingHeight {
    height: u32,
    due: Instant,
}

/// Debounces content-height observations into `setHeight` messages.
#[derive(Debug, Clone, Default)]
pub struct HeightReporter {
    last_reported: u32,
    pending: Option<PendingHeight>,
}

impl HeightReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest height and restarts the debounce window.
    pub fn observe(&mut self, height: u32, now: Instant) {
        self.pending = Some(PendingHeight {
            height,
            due: now + HEIGHT_DEBOUNCE,
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    /// Emits once the window has elapsed and the change exceeds the jitter threshold.
    pub fn poll(&mut self, now: Instant) -> Option<HostMessage> {
        let pending = self.pending.filter(|p| p.due <= now)?;
        self.pending = None;
        if pending.height.abs_diff(self.last_reported) <= HEIGHT_JITTER_PX {
            return None;
        }
        self.last_reported = pending.height;
        Some(HostMessage::SetHeight {
            height: pending.height,
        })
    }

    pub fn last_reported(&self) -> u32 {
        self.last_reported
    }
}
