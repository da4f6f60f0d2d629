//! Deferred outbound frames
//!
//! Frames are stored already encoded, so nothing can fail between enqueue and
//! the transport send except the transport itself.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Where a deferred frame lands in the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    /// Behind everything already queued
    #[default]
    Normal,
    /// Ahead of everything already queued
    Immediate,
}

#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    frames: Mutex<VecDeque<Bytes>>,
}

impl OutboundQueue {
    pub(crate) fn push(&self, frame: Bytes, priority: Priority) {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        match priority {
            Priority::Normal => frames.push_back(frame),
            Priority::Immediate => frames.push_front(frame),
        }
    }

    pub(crate) fn pop(&self) -> Option<Bytes> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop everything, returning how many frames were discarded
    pub(crate) fn clear(&self) -> usize {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = frames.len();
        frames.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_jumps_queue() {
        let queue = OutboundQueue::default();
        queue.push(Bytes::from_static(b"a"), Priority::Normal);
        queue.push(Bytes::from_static(b"b"), Priority::Normal);
        queue.push(Bytes::from_static(b"now"), Priority::Immediate);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().as_deref(), Some(&b"now"[..]));
        assert_eq!(queue.pop().as_deref(), Some(&b"a"[..]));
        assert_eq!(queue.pop().as_deref(), Some(&b"b"[..]));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_reports_dropped() {
        let queue = OutboundQueue::default();
        queue.push(Bytes::from_static(b"a"), Priority::Normal);
        queue.push(Bytes::from_static(b"b"), Priority::Immediate);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
    }
}
