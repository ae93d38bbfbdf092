//! Mailbox depth monitoring for the allocator actor.
//!
//! The actor samples its receiver's queue length before handling each
//! message. The same depth answers the `event_queue_dispatches` pull gauges.
//!
//! | Level | Depth |
//! |-------|-------|
//! | Normal | <= 100 |
//! | Warning | 101-500 |
//! | Critical | > 500 |

use crate::observability;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

pub const MAILBOX_NORMAL: usize = 100;
pub const MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At or below the normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above the warning threshold.
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub const fn for_depth(depth: usize) -> Self {
        if depth > MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Tracks the allocator's mailbox depth and processed-message count.
#[derive(Debug)]
pub struct MailboxMonitor {
    allocator_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(allocator_id: impl Into<String>) -> Self {
        Self {
            allocator_id: allocator_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record the queue length observed before handling a message.
    pub fn observe(&self, depth: usize) {
        let previous = self.depth.swap(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        observability::set_mailbox_depth(depth);

        let level = MailboxLevel::for_depth(depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "allocator.actor.mailbox",
                allocator_id = %self.allocator_id,
                depth,
                threshold = MAILBOX_WARNING,
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning && MailboxLevel::for_depth(previous) == MailboxLevel::Normal
        {
            debug!(
                target: "allocator.actor.mailbox",
                allocator_id = %self.allocator_id,
                depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record one message handled.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue length at the last observation.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        MailboxLevel::for_depth(self.current_depth())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(MailboxLevel::for_depth(0), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(100), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(101), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(500), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(501), MailboxLevel::Critical);
    }

    #[test]
    fn test_observe_tracks_depth_and_peak() {
        let monitor = MailboxMonitor::new("allocator-1");

        monitor.observe(3);
        monitor.observe(150);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);
        monitor.observe(2);

        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 150);
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);
    }

    #[test]
    fn test_record_processed() {
        let monitor = MailboxMonitor::new("allocator-1");
        monitor.record_processed();
        monitor.record_processed();
        assert_eq!(monitor.messages_processed(), 2);
    }
}
