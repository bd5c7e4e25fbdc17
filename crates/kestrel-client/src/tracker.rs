use std::collections::BTreeSet;
use tracing::debug;

/// Reliable-read state of one queue on one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Nothing held; the next `next()` opens a read
    Idle,
    /// A message was fetched with `next()` and awaits `finish()` or `abort()`
    Open,
}

/// How an open read is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    Finish,
    Abort,
}

/// Open reads held by a single connection.
///
/// The server keeps the authoritative state; this mirrors it so callers can
/// ask whether a message is outstanding. At most one read per queue is open.
#[derive(Debug, Default)]
pub struct ReadTracker {
    open: BTreeSet<String>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, queue: &str) -> ReadState {
        if self.open.contains(queue) {
            ReadState::Open
        } else {
            ReadState::Idle
        }
    }

    pub fn is_open(&self, queue: &str) -> bool {
        self.state(queue) == ReadState::Open
    }

    /// Queues with an unacknowledged message
    pub fn open_queues(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Record the outcome of a `next()`. The server closed any previous
    /// read first, so an empty queue leaves the tracker idle.
    pub(crate) fn record_next(&mut self, queue: &str, delivered: bool) -> ReadState {
        let previous = self.state(queue);
        if delivered {
            self.open.insert(queue.to_string());
        } else {
            self.open.remove(queue);
        }
        let current = self.state(queue);
        debug!(queue, ?previous, ?current, "next");
        current
    }

    /// Record a `finish()` or `abort()`; releasing an idle queue is a no-op.
    pub(crate) fn record_release(&mut self, queue: &str, how: Release) -> ReadState {
        let previous = self.state(queue);
        self.open.remove(queue);
        debug!(queue, ?previous, ?how, "release");
        previous
    }

    /// Forget every open read; the server aborts them when the socket closes.
    pub(crate) fn clear(&mut self) -> Vec<String> {
        std::mem::take(&mut self.open).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_by_default() {
        let tracker = ReadTracker::new();
        assert_eq!(tracker.state("jobs"), ReadState::Idle);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_next_opens_only_on_delivery() {
        let mut tracker = ReadTracker::new();

        assert_eq!(tracker.record_next("jobs", false), ReadState::Idle);
        assert_eq!(tracker.record_next("jobs", true), ReadState::Open);
        assert!(tracker.is_open("jobs"));
        assert!(!tracker.is_open("mail"));
    }

    #[test]
    fn test_next_on_empty_queue_closes_previous() {
        let mut tracker = ReadTracker::new();
        tracker.record_next("jobs", true);

        assert_eq!(tracker.record_next("jobs", false), ReadState::Idle);
    }

    #[test]
    fn test_finish_and_abort_release() {
        let mut tracker = ReadTracker::new();
        tracker.record_next("jobs", true);
        tracker.record_next("mail", true);

        assert_eq!(tracker.record_release("jobs", Release::Finish), ReadState::Open);
        assert_eq!(tracker.state("jobs"), ReadState::Idle);

        assert_eq!(tracker.record_release("mail", Release::Abort), ReadState::Open);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_release_while_idle_is_noop() {
        let mut tracker = ReadTracker::new();
        assert_eq!(tracker.record_release("jobs", Release::Finish), ReadState::Idle);
        assert_eq!(tracker.record_release("jobs", Release::Abort), ReadState::Idle);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_clear_returns_open_queues() {
        let mut tracker = ReadTracker::new();
        tracker.record_next("b", true);
        tracker.record_next("a", true);

        assert_eq!(tracker.clear(), vec!["a".to_string(), "b".to_string()]);
        assert!(tracker.is_empty());
    }
}
