//! Live online-session tracking.
//!
//! Process-local and approximate: the map resets on restart and each instance
//! of a multi-process deployment counts only its own sessions.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::constants::ONLINE_WINDOW_SECONDS;

pub trait PresenceTracker: Send + Sync {
    /// Mark a session as seen now. Returns the online count after pruning.
    fn touch(&self, session_id: &str) -> usize;

    /// Number of sessions seen within the window.
    fn online_count(&self) -> usize;
}

pub struct InMemoryPresence {
    last_seen: DashMap<String, Instant>,
    window: Duration,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(ONLINE_WINDOW_SECONDS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            last_seen: DashMap::new(),
            window,
        }
    }

    fn prune(&self) {
        let now = Instant::now();
        self.last_seen
            .retain(|_, seen| now.duration_since(*seen) < self.window);
    }
}

impl Default for InMemoryPresence {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker for InMemoryPresence {
    fn touch(&self, session_id: &str) -> usize {
        self.last_seen.insert(session_id.to_string(), Instant::now());
        self.prune();
        self.last_seen.len()
    }

    fn online_count(&self) -> usize {
        self.prune();
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_counted_once() {
        let presence = InMemoryPresence::new();
        presence.touch("a");
        presence.touch("a");
        assert_eq!(presence.touch("b"), 2);
        assert_eq!(presence.online_count(), 2);
    }

    #[test]
    fn test_stale_sessions_pruned() {
        let presence = InMemoryPresence::with_window(Duration::from_millis(20));
        presence.touch("a");
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(presence.touch("b"), 1);
        assert_eq!(presence.online_count(), 1);
    }
}
