//! Bounded byte queue between the decode thread and the host tick
//!
//! A fixed-capacity circular byte buffer. It is not synchronized on its
//! own; both queues live behind the exchange mutex. Writing more than
//! `write_available()` or reading more than `read_available()` is a caller
//! bug and trips a debug assertion.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

/// Queue statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total bytes written
    pub bytes_written: u64,

    /// Total bytes read
    pub bytes_read: u64,

    /// Bytes discarded by `clear`
    pub bytes_cleared: u64,

    /// Number of `clear` calls that dropped data
    pub clears: u64,

    /// Maximum fill level reached
    pub high_water: usize,
}

/// Fixed-capacity FIFO of bytes
pub struct ByteQueue {
    ring: HeapRb<u8>,
    stats: QueueStats,
}

impl ByteQueue {
    /// Create a queue holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: QueueStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Bytes that can be written without overflowing
    pub fn write_available(&self) -> usize {
        self.ring.vacant_len()
    }

    /// Bytes buffered and ready to read
    pub fn read_available(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Append `bytes`; the caller checks `write_available()` first
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        debug_assert!(
            bytes.len() <= self.write_available(),
            "write of {} bytes with {} available",
            bytes.len(),
            self.write_available()
        );
        let written = self.ring.push_slice(bytes);
        self.stats.bytes_written += written as u64;
        self.stats.high_water = self.stats.high_water.max(self.read_available());
        written
    }

    /// Append all of `bytes` or nothing
    pub fn try_write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.write_available() {
            return false;
        }
        self.write(bytes);
        true
    }

    /// Fill `dst` from the front of the queue; the caller checks `read_available()` first
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        debug_assert!(
            dst.len() <= self.read_available(),
            "read of {} bytes with {} available",
            dst.len(),
            self.read_available()
        );
        let read = self.ring.pop_slice(dst);
        self.stats.bytes_read += read as u64;
        read
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        let dropped = self.ring.clear();
        if dropped > 0 {
            self.stats.bytes_cleared += dropped as u64;
            self.stats.clears += 1;
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl std::fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteQueue")
            .field("capacity", &self.capacity())
            .field("read_available", &self.read_available())
            .finish()
    }
}
