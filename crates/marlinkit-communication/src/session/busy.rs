//! Busy/idle debounce
//!
//! Every busy marker re-arms a deadline; the link returns to idle only when
//! the deadline passes without another marker.

use std::time::Duration;
use tokio::time::Instant;

/// Default debounce window
pub const DEFAULT_BUSY_DEBOUNCE: Duration = Duration::from_secs(2);

/// Deadline-based busy state
#[derive(Debug, Clone)]
pub struct BusyTracker {
    window: Duration,
    deadline: Option<Instant>,
}

impl BusyTracker {
    /// Create an idle tracker
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Whether the link is currently busy
    pub fn is_busy(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the link will return to idle, if busy
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Debounce window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a busy marker seen at `now`.
    ///
    /// Returns true on the idle to busy transition.
    pub fn observe(&mut self, now: Instant) -> bool {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(now + self.window);
        was_idle
    }

    /// Leave the busy state if the deadline has passed.
    ///
    /// Returns true on the busy to idle transition.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop back to idle without a transition
    pub fn reset(&mut self) {
        self.deadline = None;
    }
}

impl Default for BusyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_DEBOUNCE)
    }
}
