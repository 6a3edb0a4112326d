use crate::record::LogRecord;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded FIFO of recent log records for one application.
///
/// Records are appended at the tail in sequence order; once the buffer is
/// over capacity the oldest records are evicted from the head. Records are
/// therefore always held in non-decreasing `seq` order.
pub struct RingBuffer {
    records: VecDeque<Arc<LogRecord>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a record, evicting from the head while over capacity
    pub fn push(&mut self, record: Arc<LogRecord>) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Records with `seq > after_seq`, oldest first, capped at `limit`.
    ///
    /// `after_seq == 0` reads from the oldest retained record. Records already
    /// evicted are simply absent from the result; that gap is expected for
    /// callers polling from far in the past.
    pub fn read_since(&self, after_seq: u64, limit: usize) -> Vec<Arc<LogRecord>> {
        // Buffer is seq-ordered, so binary search for the resume point
        let start = self
            .records
            .partition_point(|r| r.seq <= after_seq);

        self.records
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
