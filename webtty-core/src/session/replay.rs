//! Replay buffer for recent session output

use std::collections::VecDeque;

/// Default replay capacity in bytes
pub const DEFAULT_REPLAY_CAPACITY: usize = 1000;

/// Ring buffer keeping the newest bytes a session produced
#[derive(Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<u8>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append data, dropping the oldest bytes beyond capacity
    pub fn append(&mut self, data: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let overflow = (self.buffer.len() + data.len()).saturating_sub(self.capacity);
        self.buffer.drain(..overflow);
        self.buffer.extend(data);
    }

    /// Copy of the buffered bytes, oldest first
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buf = ReplayBuffer::new(16);
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), b"");
    }

    #[test]
    fn appends_accumulate() {
        let mut buf = ReplayBuffer::new(64);
        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.snapshot(), b"hello world");
    }

    #[test]
    fn overflow_drops_oldest_bytes() {
        let mut buf = ReplayBuffer::new(10);
        buf.append(b"hello");
        buf.append(b"world!");
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.snapshot(), b"elloworld!");
    }

    #[test]
    fn oversized_append_keeps_tail() {
        let mut buf = ReplayBuffer::new(5);
        buf.append(b"hello world");
        assert_eq!(buf.snapshot(), b"world");
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut buf = ReplayBuffer::new(0);
        buf.append(b"abc");
        assert!(buf.is_empty());
    }

    #[test]
    fn default_capacity() {
        assert_eq!(ReplayBuffer::default().capacity(), DEFAULT_REPLAY_CAPACITY);
    }
}
