//! Typed events from the sidecar reader task to the session loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Bound on queued events; beyond it the oldest entry is discarded. The
/// queue only backs up if the core stalls, and then the newest FFB matters
/// more than the oldest.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// What the sidecar told us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BridgeEvent {
    /// Child connected to the platform bridge and accepts state.
    Ready,
    /// Native force feedback from the game, stamped at receive time.
    Ffb { l: f32, r: f32, at_ms: u64 },
    /// Child stream ended (EOF or garbage tolerance exceeded).
    Bye,
}

/// Bounded queue between the reader task and the loop. The mutex is held
/// only for the push/drain itself.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<BridgeEvent>>>,
    overflow: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(EVENT_QUEUE_CAPACITY))),
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue, discarding the oldest entry when full.
    pub fn push(&self, event: BridgeEvent) {
        let Ok(mut queue) = self.inner.lock() else {
            return;
        };
        if queue.len() >= EVENT_QUEUE_CAPACITY {
            queue.pop_front();
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
    }

    /// Take everything queued, in arrival order.
    pub fn drain(&self) -> Vec<BridgeEvent> {
        match self.inner.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Events lost to overflow since startup.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(BridgeEvent::Ready);
        queue.push(BridgeEvent::Ffb {
            l: 0.5,
            r: 0.5,
            at_ms: 1,
        });
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], BridgeEvent::Ready);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = EventQueue::new();
        queue.push(BridgeEvent::Ready);
        for i in 0..EVENT_QUEUE_CAPACITY as u64 {
            queue.push(BridgeEvent::Ffb {
                l: 0.0,
                r: 0.0,
                at_ms: i,
            });
        }
        assert_eq!(queue.overflow_count(), 1);
        let drained = queue.drain();
        assert_eq!(drained.len(), EVENT_QUEUE_CAPACITY);
        // The Ready at the head was the casualty.
        assert_eq!(
            drained[0],
            BridgeEvent::Ffb {
                l: 0.0,
                r: 0.0,
                at_ms: 0
            }
        );
        assert_eq!(
            drained[EVENT_QUEUE_CAPACITY - 1],
            BridgeEvent::Ffb {
                l: 0.0,
                r: 0.0,
                at_ms: EVENT_QUEUE_CAPACITY as u64 - 1
            }
        );
    }
}
