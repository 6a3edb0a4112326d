use crate::buffer::RingBuffer;
use crate::record::LogRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Assigns globally unique, strictly increasing sequence numbers.
///
/// The counter is shared across all applications; a record's sequence number
/// is assigned exactly once, at submission time, and never reused.
pub struct Sequencer {
    counter: AtomicU64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Next sequence number (first call returns 1)
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest sequence number assigned so far
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of buffer state, used by status endpoints of the embedding tool
#[derive(Debug, Clone)]
pub struct BufferStatus {
    pub capacity: usize,
    pub buffered: HashMap<String, usize>,
    pub current_seq: u64,
}

/// Concurrent map of per-application ring buffers, created lazily on first
/// submission. Unknown applications never fail: submission creates a buffer,
/// reading returns an empty result.
pub struct BufferStore {
    capacity: usize,
    sequencer: Sequencer,
    buffers: RwLock<HashMap<String, Arc<Mutex<RingBuffer>>>>,
}

impl BufferStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sequencer: Sequencer::new(),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Assign the next sequence number to the record and append it to the
    /// application's ring buffer, evicting the oldest records past capacity.
    pub fn submit(&self, mut record: LogRecord) -> Arc<LogRecord> {
        let buffer = self.buffer(&record.app_code);

        // Assign the sequence under the buffer lock so buffer order always
        // matches sequence order, even with concurrent submitters.
        let mut guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
        record.seq = self.sequencer.next();
        let record = Arc::new(record);
        guard.push(Arc::clone(&record));

        record
    }

    /// Records for `app_code` with `seq > after_seq`, oldest first, capped at
    /// `limit`. Unknown applications yield an empty result.
    pub fn read_since(&self, app_code: &str, after_seq: u64, limit: usize) -> Vec<Arc<LogRecord>> {
        let buffer = {
            let map = self.buffers.read().unwrap_or_else(|e| e.into_inner());
            map.get(app_code).cloned()
        };

        match buffer {
            Some(buffer) => {
                let guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
                guard.read_since(after_seq, limit)
            }
            None => Vec::new(),
        }
    }

    /// Drop the application's buffer contents; used at session start
    pub fn clear(&self, app_code: &str) {
        let buffer = {
            let map = self.buffers.read().unwrap_or_else(|e| e.into_inner());
            map.get(app_code).cloned()
        };

        if let Some(buffer) = buffer {
            let mut guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
            guard.clear();
        }
    }

    /// Number of records currently buffered for an application
    pub fn len(&self, app_code: &str) -> usize {
        let buffer = {
            let map = self.buffers.read().unwrap_or_else(|e| e.into_inner());
            map.get(app_code).cloned()
        };

        match buffer {
            Some(buffer) => buffer.lock().unwrap_or_else(|e| e.into_inner()).len(),
            None => 0,
        }
    }

    pub fn status(&self) -> BufferStatus {
        let map = self.buffers.read().unwrap_or_else(|e| e.into_inner());
        let buffered = map
            .iter()
            .map(|(app, buffer)| {
                let len = buffer.lock().unwrap_or_else(|e| e.into_inner()).len();
                (app.clone(), len)
            })
            .collect();

        BufferStatus {
            capacity: self.capacity,
            buffered,
            current_seq: self.sequencer.current(),
        }
    }

    fn buffer(&self, app_code: &str) -> Arc<Mutex<RingBuffer>> {
        {
            let map = self.buffers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(buffer) = map.get(app_code) {
                return Arc::clone(buffer);
            }
        }

        let mut map = self.buffers.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(app_code.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RingBuffer::new(self.capacity)))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn record(app_code: &str, content: &str) -> LogRecord {
        LogRecord {
            app_code: app_code.to_string(),
            version: "1.0".to_string(),
            level: "INFO".to_string(),
            content: content.to_string(),
            timestamp: Local::now(),
            seq: 0,
        }
    }

    #[test]
    fn test_sequence_strictly_increasing_no_gaps() {
        let store = BufferStore::new(100);

        let mut last = 0;
        for i in 0..50 {
            let rec = store.submit(record("demo", &format!("line {}", i)));
            assert_eq!(rec.seq, last + 1);
            last = rec.seq;
        }
        assert_eq!(store.sequencer().current(), 50);
    }

    #[test]
    fn test_sequence_shared_across_apps() {
        let store = BufferStore::new(100);

        let a = store.submit(record("app-a", "one"));
        let b = store.submit(record("app-b", "two"));
        let c = store.submit(record("app-a", "three"));

        assert!(a.seq < b.seq);
        assert!(b.seq < c.seq);
    }

    #[test]
    fn test_read_since_unknown_app_is_empty() {
        let store = BufferStore::new(100);
        assert!(store.read_since("missing", 0, 100).is_empty());
    }

    #[test]
    fn test_eviction_past_capacity() {
        let store = BufferStore::new(5);
        for i in 0..8 {
            store.submit(record("demo", &format!("line {}", i)));
        }

        let records = store.read_since("demo", 0, 100);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].seq, 4);
        assert_eq!(records[4].seq, 8);
    }

    #[test]
    fn test_clear_drops_buffer_contents() {
        let store = BufferStore::new(100);
        store.submit(record("demo", "line"));

        store.clear("demo");
        assert_eq!(store.len("demo"), 0);

        // Sequence keeps climbing after a clear
        let rec = store.submit(record("demo", "next"));
        assert_eq!(rec.seq, 2);
    }

    #[test]
    fn test_concurrent_submissions() {
        let store = Arc::new(BufferStore::new(10_000));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.submit(record("demo", &format!("t{} line {}", t, i)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.sequencer().current(), 1000);
        let records = store.read_since("demo", 0, 2000);
        assert_eq!(records.len(), 1000);
        // Strictly increasing across all submitters
        for pair in records.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[test]
    fn test_status() {
        let store = BufferStore::new(100);
        store.submit(record("app-a", "one"));
        store.submit(record("app-a", "two"));
        store.submit(record("app-b", "three"));

        let status = store.status();
        assert_eq!(status.capacity, 100);
        assert_eq!(status.current_seq, 3);
        assert_eq!(status.buffered.get("app-a"), Some(&2));
        assert_eq!(status.buffered.get("app-b"), Some(&1));
    }
}
