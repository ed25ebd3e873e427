use super::error::StreamError;
use std::collections::VecDeque;

#[derive(Debug)]
struct ValueWithSize<T> {
    value: T,
    size: f64,
}

/// FIFO of values paired with the size a queuing strategy assigned them.
///
/// `total_size` always equals the sum of the queued sizes, clamped at zero
/// so rounding drift from fractional sizes never reports a negative total.
#[derive(Debug)]
pub struct SizedQueue<T> {
    entries: VecDeque<ValueWithSize<T>>,
    total_size: f64,
}

impl<T> Default for SizedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SizedQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            total_size: 0.0,
        }
    }

    pub fn enqueue(&mut self, value: T, size: f64) -> Result<(), StreamError> {
        if !size.is_finite() || size < 0.0 {
            return Err(StreamError::range_error(
                "chunk size must be a finite, non-negative number",
            ));
        }
        self.total_size += size;
        self.entries.push_back(ValueWithSize { value, size });
        Ok(())
    }

    /// Puts a partially consumed value back at the head.
    pub(crate) fn push_front(&mut self, value: T, size: f64) {
        debug_assert!(size.is_finite() && size >= 0.0);
        self.total_size += size;
        self.entries.push_front(ValueWithSize { value, size });
    }

    pub fn dequeue(&mut self) -> Result<T, StreamError> {
        let Some(entry) = self.entries.pop_front() else {
            return Err(StreamError::assertion("dequeue from an empty queue"));
        };
        self.total_size = if self.entries.is_empty() {
            0.0
        } else {
            (self.total_size - entry.size).max(0.0)
        };
        Ok(entry.value)
    }

    pub fn peek(&self) -> Option<&T> {
        self.entries.front().map(|entry| &entry.value)
    }

    pub fn total_size(&self) -> f64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.total_size = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_total_size_across_operations() {
        let mut queue = SizedQueue::new();
        queue.enqueue("a", 2.0).unwrap();
        queue.enqueue("b", 3.5).unwrap();
        assert_eq!(queue.total_size(), 5.5);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek(), Some(&"a"));

        assert_eq!(queue.dequeue().unwrap(), "a");
        assert_eq!(queue.total_size(), 3.5);
        assert_eq!(queue.dequeue().unwrap(), "b");
        assert_eq!(queue.total_size(), 0.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn rejects_invalid_sizes_with_range_error() {
        let mut queue = SizedQueue::new();
        for size in [-1.0, f64::NAN, f64::INFINITY] {
            let err = queue.enqueue(1u8, size).unwrap_err();
            assert!(err.is_range_error());
        }
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0.0);
    }

    #[test]
    fn dequeue_on_empty_queue_is_an_assertion() {
        let mut queue: SizedQueue<u8> = SizedQueue::new();
        assert!(matches!(queue.dequeue(), Err(StreamError::Assertion(_))));
    }

    #[test]
    fn fractional_sizes_never_leave_a_negative_total() {
        let mut queue = SizedQueue::new();
        queue.enqueue(1, 0.1).unwrap();
        queue.enqueue(2, 0.2).unwrap();
        queue.dequeue().unwrap();
        queue.dequeue().unwrap();
        assert_eq!(queue.total_size(), 0.0);
    }

    #[test]
    fn reset_discards_contents_and_total() {
        let mut queue = SizedQueue::new();
        queue.enqueue(1, 1.0).unwrap();
        queue.push_front(0, 4.0);
        assert_eq!(queue.peek(), Some(&0));
        assert_eq!(queue.total_size(), 5.0);
        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0.0);
    }
}
