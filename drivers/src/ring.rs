//! # Event Ring
//!
//! Bounded single-producer/single-consumer queue carrying keyboard events.
//! The producer is the IRQ handler, the consumer is task context; each side
//! owns its own index, so no lock is needed. Events are packed into atomic
//! words, making slot access tear-free. On overflow the NEW event is
//! dropped and counted; queued events are never displaced.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::keyboard::KeyEvent;

/// Ring capacity (power of two)
pub const RING_CAPACITY: usize = 64;

/// SPSC ring of packed keyboard events
#[derive(Debug)]
pub struct EventRing {
    slots: [AtomicU64; RING_CAPACITY],
    /// Total events ever enqueued (producer-owned)
    head: AtomicUsize,
    /// Total events ever dequeued (consumer-owned)
    tail: AtomicUsize,
    /// Events dropped because the ring was full
    dropped: AtomicU64,
}

impl EventRing {
    /// An empty ring
    pub const fn new() -> Self {
        const EMPTY: AtomicU64 = AtomicU64::new(0);
        Self {
            slots: [EMPTY; RING_CAPACITY],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue `event`; returns false (and counts the drop) when full
    pub fn push(&self, event: KeyEvent) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head - tail >= RING_CAPACITY {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.slots[head % RING_CAPACITY].store(event.pack(), Ordering::Relaxed);
        self.head.store(head + 1, Ordering::Release);
        true
    }

    /// Dequeue the oldest event, if any
    pub fn pop(&self) -> Option<KeyEvent> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let packed = self.slots[tail % RING_CAPACITY].load(Ordering::Relaxed);
        self.tail.store(tail + 1, Ordering::Release);
        Some(KeyEvent::unpack(packed))
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped on overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(scancode: u8, ch: u8, pressed: bool) -> KeyEvent {
        KeyEvent {
            scancode,
            ch,
            pressed,
            shift: false,
            ctrl: false,
            alt: false,
        }
    }

    #[test]
    fn test_fifo_order() {
        let ring = EventRing::new();
        assert!(ring.push(key(0x1E, b'a', true)));
        assert!(ring.push(key(0x9E, b'a', false)));
        assert!(ring.push(key(0x30, b'b', true)));

        assert_eq!(ring.pop().unwrap().ch, b'a');
        let second = ring.pop().unwrap();
        assert_eq!(second.ch, b'a');
        assert!(!second.pressed);
        assert_eq!(ring.pop().unwrap().ch, b'b');
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_new_events() {
        let ring = EventRing::new();
        for i in 0..RING_CAPACITY {
            assert!(ring.push(key(i as u8, b'x', true)));
        }
        // Full: further pushes are dropped, queued events untouched.
        assert!(!ring.push(key(0x7F, b'y', true)));
        assert!(!ring.push(key(0x7F, b'z', true)));
        assert_eq!(ring.dropped(), 2);
        assert_eq!(ring.len(), RING_CAPACITY);

        // FIFO across the whole capacity, none displaced.
        for i in 0..RING_CAPACITY {
            assert_eq!(ring.pop().unwrap().scancode, i as u8);
        }
        assert!(ring.is_empty());

        // Space again: pushes resume.
        assert!(ring.push(key(1, b'a', true)));
    }

    #[test]
    fn test_wraparound_reuses_slots() {
        let ring = EventRing::new();
        for round in 0u8..3 {
            for i in 0..RING_CAPACITY {
                assert!(ring.push(key(i as u8, b'a' + round, true)));
            }
            for i in 0..RING_CAPACITY {
                let ev = ring.pop().unwrap();
                assert_eq!(ev.scancode, i as u8);
                assert_eq!(ev.ch, b'a' + round);
            }
        }
        assert_eq!(ring.dropped(), 0);
    }
}
