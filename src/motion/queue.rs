//! Image queue for pre/post-event capture.
//!
//! The queue holds the most recent full-resolution frames. Detection always
//! tests the midpoint entry, so when it fires there are already `M / 2`
//! frames from before the trigger and `M / 2` from after it.
//!
//! Each entry tracks whether its sample has reached the background model
//! and whether it has been scored, instead of inferring either from its
//! position.

use crate::analysis::Sample;
use crate::capture::Frame;
use std::collections::VecDeque;

/// A frame waiting in the image queue, plus its analysis sample.
#[derive(Debug)]
pub struct QueuedFrame {
    /// Full-resolution frame for persistence.
    pub frame: Frame,
    /// Downsampled frame for analysis.
    pub sample: Sample,
    /// The sample has already been pushed into the background model.
    pub in_background: bool,
    /// The sample has already been tested against the background.
    pub scored: bool,
}

impl QueuedFrame {
    /// A freshly captured frame.
    pub fn new(frame: Frame, sample: Sample) -> Self {
        Self {
            frame,
            sample,
            in_background: false,
            scored: false,
        }
    }

    /// A warm-up frame: it built the background, so it is neither pushed
    /// again nor scored against itself.
    pub fn warmed(frame: Frame, sample: Sample) -> Self {
        Self {
            frame,
            sample,
            in_background: true,
            scored: true,
        }
    }
}

/// Fixed-capacity FIFO of recent frames.
#[derive(Debug)]
pub struct ImageQueue {
    entries: VecDeque<QueuedFrame>,
    capacity: usize,
}

impl ImageQueue {
    /// Creates an empty queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, returning the oldest one if it had to be evicted.
    pub fn push(&mut self, entry: QueuedFrame) -> Option<QueuedFrame> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Index of the entry under test.
    pub fn midpoint_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.len() / 2)
        }
    }

    /// The entry at index `len / 2`.
    pub fn midpoint(&self) -> Option<&QueuedFrame> {
        self.midpoint_index().and_then(|i| self.entries.get(i))
    }

    /// Mutable access to the midpoint entry.
    pub fn midpoint_mut(&mut self) -> Option<&mut QueuedFrame> {
        self.midpoint_index().and_then(move |i| self.entries.get_mut(i))
    }

    /// Removes the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<QueuedFrame> {
        self.entries.pop_front()
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the queue holds `M` frames.
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// The queue size `M`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedFrame> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sequence: u64) -> QueuedFrame {
        QueuedFrame::new(
            Frame::filled(2, 2, 1, 0, sequence),
            Sample::filled(1, 1, 1, sequence as f32),
        )
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut queue = ImageQueue::new(3);
        assert!(queue.push(entry(1)).is_none());
        assert!(queue.push(entry(2)).is_none());
        assert!(queue.push(entry(3)).is_none());
        assert!(queue.is_full());

        let evicted = queue.push(entry(4)).unwrap();
        assert_eq!(evicted.frame.sequence(), 1);

        let order: Vec<u64> = queue.iter().map(|e| e.frame.sequence()).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn test_midpoint() {
        let mut queue = ImageQueue::new(5);
        assert!(queue.midpoint().is_none());

        queue.push(entry(1));
        assert_eq!(queue.midpoint().unwrap().frame.sequence(), 1);

        for s in 2..=5 {
            queue.push(entry(s));
        }
        assert_eq!(queue.midpoint_index(), Some(2));
        assert_eq!(queue.midpoint().unwrap().frame.sequence(), 3);
    }

    #[test]
    fn test_single_slot_queue_tests_newest() {
        let mut queue = ImageQueue::new(1);
        queue.push(entry(1));
        queue.push(entry(2));
        assert_eq!(queue.midpoint().unwrap().frame.sequence(), 2);
    }

    #[test]
    fn test_pop_oldest_drains_in_order() {
        let mut queue = ImageQueue::new(3);
        for s in 1..=3 {
            queue.push(entry(s));
        }
        let drained: Vec<u64> = std::iter::from_fn(|| queue.pop_oldest())
            .map(|e| e.frame.sequence())
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }
}
