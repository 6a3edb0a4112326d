// Writer module - Batched, rotating per-application log file persistence

pub mod naming;

use crate::error::{LogHubError, Result};
use crate::record::LogRecord;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Batched file writer with one write state per application.
///
/// Submissions land in a per-application pending queue; batches are appended
/// to rotating `appCode_version_x-y.log` files by asynchronous flushes. The
/// writer is best-effort: an I/O failure drops the batch and is logged, it is
/// never retried and never crashes the host.
///
/// Cloning is cheap and shares all state; flush tasks hold a clone of the
/// shared inner across `tokio::spawn`.
#[derive(Clone)]
pub struct FileWriter {
    inner: Arc<Inner>,
}

struct Inner {
    logs_dir: PathBuf,
    max_file_size: u64,
    flush_size: usize,
    states: RwLock<HashMap<String, Arc<WriteState>>>,
    flush_permits: Arc<Semaphore>,
}

/// Per-application write state. The pending queue is shared with submitters;
/// everything about the active file is guarded by the flush lock.
struct WriteState {
    pending: Mutex<VecDeque<Arc<LogRecord>>>,
    pending_count: AtomicUsize,
    file: tokio::sync::Mutex<FileState>,
}

impl WriteState {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            pending_count: AtomicUsize::new(0),
            file: tokio::sync::Mutex::new(FileState::default()),
        }
    }
}

/// Identity and fill level of the active log file
#[derive(Default)]
struct FileState {
    path: Option<PathBuf>,
    size: u64,
    version: Option<String>,
    run_index: u32,
    file_index: u32,
}

impl FileWriter {
    pub fn new<P: AsRef<Path>>(
        logs_dir: P,
        max_file_size: u64,
        flush_size: usize,
        flush_workers: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                logs_dir: logs_dir.as_ref().to_path_buf(),
                max_file_size,
                flush_size,
                states: RwLock::new(HashMap::new()),
                flush_permits: Arc::new(Semaphore::new(flush_workers)),
            }),
        }
    }

    /// Queue a record for persistence.
    ///
    /// When the pending count reaches the flush threshold an asynchronous
    /// flush is scheduled for the application; submission itself never does
    /// file I/O. Callable from any thread: without a tokio runtime on the
    /// calling thread the batch is left for the periodic sweep.
    pub fn submit(&self, record: Arc<LogRecord>) {
        let app_code = record.app_code.clone();
        let state = self.inner.state_or_create(&app_code);

        {
            let mut queue = state.pending.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(record);
        }
        let pending = state.pending_count.fetch_add(1, Ordering::SeqCst) + 1;

        // Exactly one submitter observes each threshold crossing
        if pending == self.inner.flush_size {
            self.schedule_flush(&app_code);
        }
    }

    /// Spawn a flush for one application on the bounded worker pool
    pub fn schedule_flush(&self, app_code: &str) {
        // Submitters outside a runtime cannot spawn; their records stay
        // queued until the periodic sweep or an explicit flush drains them
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(app_code = %app_code, "No runtime on calling thread, flush deferred");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let permits = Arc::clone(&self.inner.flush_permits);
        let app_code = app_code.to_string();

        handle.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(e) = inner.flush(&app_code).await {
                error!(app_code = %app_code, error = %e, "Asynchronous log flush failed");
            }
        });
    }

    /// Flush pending records for one application.
    ///
    /// Uses a try-acquire on the per-application flush lock: if another flush
    /// for the same application is already running this call is a no-op, the
    /// next scheduled trigger will pick the records up. Returns the number of
    /// records written.
    pub async fn flush(&self, app_code: &str) -> Result<usize> {
        self.inner.flush(app_code).await
    }

    /// Flush every application's pending queue; used by the periodic sweep
    /// and on shutdown. Failures are logged per application and do not stop
    /// the sweep.
    pub async fn flush_all(&self) {
        for app_code in self.app_codes() {
            if let Err(e) = self.inner.flush(&app_code).await {
                error!(app_code = %app_code, error = %e, "Periodic log flush failed");
            }
        }
    }

    /// Start a new run for an application.
    ///
    /// Pending records of the previous session are flushed first (waiting for
    /// any in-flight flush to finish), then the run index is recovered from
    /// disk and advanced: `runIndex = max on disk + 1`, `fileIndex = 1`. The
    /// active file is cleared so the next flush opens the fresh sequence.
    pub async fn begin_session(&self, app_code: &str, version: &str) -> Result<()> {
        self.inner.begin_session(app_code, version).await
    }

    /// Records queued but not yet flushed for an application
    pub fn pending_count(&self, app_code: &str) -> usize {
        match self.inner.state(app_code) {
            Some(state) => state.pending_count.load(Ordering::SeqCst),
            None => 0,
        }
    }

    /// Applications with write state
    pub fn app_codes(&self) -> Vec<String> {
        let map = self.inner.states.read().unwrap_or_else(|e| e.into_inner());
        map.keys().cloned().collect()
    }
}

impl Inner {
    async fn flush(&self, app_code: &str) -> Result<usize> {
        let Some(state) = self.state(app_code) else {
            return Ok(0);
        };

        let Ok(mut file) = state.file.try_lock() else {
            debug!(app_code = %app_code, "Flush already in progress, skipping");
            return Ok(0);
        };

        self.flush_locked(app_code, &state, &mut file).await
    }

    async fn begin_session(&self, app_code: &str, version: &str) -> Result<()> {
        let state = self.state_or_create(app_code);
        let mut file = state.file.lock().await;

        if let Err(e) = self.flush_locked(app_code, &state, &mut file).await {
            warn!(app_code = %app_code, error = %e, "Failed to flush previous session's records");
        }

        let safe_version = naming::sanitize_version(version);
        let dir = self.app_dir(app_code);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LogHubError::LogFileError(format!("Failed to create log directory: {}", e)))?;

        let max_run = naming::max_run_index(&dir, app_code, &safe_version);
        file.run_index = max_run + 1;
        file.file_index = 1;
        file.version = Some(safe_version);
        file.path = None;
        file.size = 0;

        info!(
            app_code = %app_code,
            version = %version,
            run_index = file.run_index,
            "Started new log session"
        );
        Ok(())
    }

    async fn flush_locked(
        &self,
        app_code: &str,
        state: &WriteState,
        file: &mut FileState,
    ) -> Result<usize> {
        let pending = state.pending_count.load(Ordering::SeqCst);
        if pending == 0 {
            return Ok(0);
        }

        // Drain up to the observed pending count; records submitted after
        // this point stay queued for the next flush.
        let batch: Vec<Arc<LogRecord>> = {
            let mut queue = state.pending.lock().unwrap_or_else(|e| e.into_inner());
            let take = pending.min(queue.len());
            queue.drain(..take).collect()
        };
        state.pending_count.fetch_sub(batch.len(), Ordering::SeqCst);

        if batch.is_empty() {
            return Ok(0);
        }

        self.write_batch(app_code, &batch, file).await?;
        debug!(app_code = %app_code, count = batch.len(), "Flushed log batch to file");
        Ok(batch.len())
    }

    async fn write_batch(
        &self,
        app_code: &str,
        batch: &[Arc<LogRecord>],
        file: &mut FileState,
    ) -> Result<()> {
        let dir = self.app_dir(app_code);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LogHubError::LogFileError(format!("Failed to create log directory: {}", e)))?;

        let version = naming::sanitize_version(&batch[0].version);

        // Select the target file: first write, version change, or full file
        if file.path.is_none()
            || file.version.as_deref() != Some(version.as_str())
            || file.size >= self.max_file_size
        {
            if file.version.as_deref() != Some(version.as_str()) {
                // Version change: recover indices from the directory listing,
                // resuming the newest file when it still has room
                let (run, idx) =
                    naming::next_run_and_file_index(&dir, app_code, &version, self.max_file_size);
                file.version = Some(version.clone());
                file.run_index = run;
                file.file_index = idx;
            } else if file.path.is_some() && file.size >= self.max_file_size {
                file.file_index += 1;
            }

            let path = dir.join(naming::file_name(
                app_code,
                &version,
                file.run_index,
                file.file_index,
            ));
            file.size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(_) => 0,
            };
            file.path = Some(path);
        }

        let path = match &file.path {
            Some(path) => path.clone(),
            None => {
                return Err(LogHubError::LogFileError(
                    "No active log file selected".to_string(),
                ))
            }
        };
        let mut out = Self::open_append(&path).await?;

        for record in batch {
            let mut line = record.format_line();
            line.push('\n');

            out.write_all(line.as_bytes())
                .await
                .map_err(|e| LogHubError::FlushError(app_code.to_string(), e.to_string()))?;
            file.size += line.len() as u64;

            // Mid-batch rotation: close out this file and continue the rest
            // of the batch in the next fileIndex
            if file.size >= self.max_file_size {
                out.flush()
                    .await
                    .map_err(|e| LogHubError::FlushError(app_code.to_string(), e.to_string()))?;

                file.file_index += 1;
                file.size = 0;
                let path = dir.join(naming::file_name(
                    app_code,
                    &version,
                    file.run_index,
                    file.file_index,
                ));
                out = Self::open_append(&path).await?;
                file.path = Some(path);
            }
        }

        out.flush()
            .await
            .map_err(|e| LogHubError::FlushError(app_code.to_string(), e.to_string()))?;

        Ok(())
    }

    async fn open_append(path: &Path) -> Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| LogHubError::LogFileError(format!("Failed to open log file: {}", e)))
    }

    fn app_dir(&self, app_code: &str) -> PathBuf {
        self.logs_dir.join(app_code)
    }

    fn state(&self, app_code: &str) -> Option<Arc<WriteState>> {
        let map = self.states.read().unwrap_or_else(|e| e.into_inner());
        map.get(app_code).cloned()
    }

    fn state_or_create(&self, app_code: &str) -> Arc<WriteState> {
        {
            let map = self.states.read().unwrap_or_else(|e| e.into_inner());
            if let Some(state) = map.get(app_code) {
                return Arc::clone(state);
            }
        }

        let mut map = self.states.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(app_code.to_string())
                .or_insert_with(|| Arc::new(WriteState::new())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    fn record(app_code: &str, version: &str, content: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord {
            app_code: app_code.to_string(),
            version: version.to_string(),
            level: "INFO".to_string(),
            content: content.to_string(),
            timestamp: Local::now(),
            seq: 0,
        })
    }

    #[tokio::test]
    async fn test_flush_writes_timestamped_lines() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        writer.submit(record("demo", "1.0", "first line"));
        writer.submit(record("demo", "1.0", "second line"));

        let written = writer.flush("demo").await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(writer.pending_count("demo"), 0);

        let path = temp_dir.path().join("demo").join("demo_1.0_1-1.log");
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first line"));
        assert!(lines[1].ends_with(" second line"));
        // yyyy-MM-dd HH:mm:ss.SSS prefix
        assert_eq!(lines[0].as_bytes()[10], b' ');
        assert_eq!(lines[0].as_bytes()[23], b' ');
    }

    #[tokio::test]
    async fn test_flush_without_state_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileWriter::new(temp_dir.path(), 20 * MB, 500, 4);

        assert_eq!(writer.flush("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_version_change_starts_new_run_scan() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        writer.submit(record("demo", "1.0", "old version"));
        writer.flush("demo").await.unwrap();

        writer.submit(record("demo", "2.0", "new version"));
        writer.flush("demo").await.unwrap();

        assert!(temp_dir.path().join("demo/demo_1.0_1-1.log").exists());
        assert!(temp_dir.path().join("demo/demo_2.0_1-1.log").exists());
    }

    #[tokio::test]
    async fn test_version_with_unsafe_characters() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        writer.submit(record("demo", "feature/login", "line"));
        writer.flush("demo").await.unwrap();

        assert!(temp_dir
            .path()
            .join("demo/demo_feature_login_1-1.log")
            .exists());
    }

    #[tokio::test]
    async fn test_begin_session_bumps_run_index() {
        let temp_dir = TempDir::new().unwrap();
        let app_dir = temp_dir.path().join("demo");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("demo_1.0_3-2.log"), b"previous run\n").unwrap();

        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));
        writer.begin_session("demo", "1.0").await.unwrap();

        writer.submit(record("demo", "1.0", "fresh run"));
        writer.flush("demo").await.unwrap();

        assert!(app_dir.join("demo_1.0_4-1.log").exists());
    }

    #[tokio::test]
    async fn test_begin_session_flushes_old_pending_records() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        writer.submit(record("demo", "1.0", "buffered before session"));
        writer.begin_session("demo", "1.0").await.unwrap();

        assert_eq!(writer.pending_count("demo"), 0);
        let content = std::fs::read_to_string(temp_dir.path().join("demo/demo_1.0_1-1.log")).unwrap();
        assert!(content.contains("buffered before session"));
    }

    #[tokio::test]
    async fn test_resume_appends_to_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let app_dir = temp_dir.path().join("demo");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("demo_1.0_2-1.log"), b"earlier content\n").unwrap();

        // Fresh writer, no begin_session: simulates a process restart
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));
        writer.submit(record("demo", "1.0", "after restart"));
        writer.flush("demo").await.unwrap();

        let content = std::fs::read_to_string(app_dir.join("demo_1.0_2-1.log")).unwrap();
        assert!(content.contains("earlier content"));
        assert!(content.contains("after restart"));
        assert!(!app_dir.join("demo_1.0_2-2.log").exists());
    }

    #[tokio::test]
    async fn test_restart_skips_full_file() {
        let temp_dir = TempDir::new().unwrap();
        let app_dir = temp_dir.path().join("demo");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("demo_1.0_2-1.log"), vec![b'x'; 256]).unwrap();

        let writer = Arc::new(FileWriter::new(temp_dir.path(), 256, 500, 4));
        writer.submit(record("demo", "1.0", "after restart"));
        writer.flush("demo").await.unwrap();

        let content = std::fs::read_to_string(app_dir.join("demo_1.0_2-2.log")).unwrap();
        assert!(content.contains("after restart"));
    }

    #[tokio::test]
    async fn test_mid_batch_rotation_continues_in_next_file() {
        let temp_dir = TempDir::new().unwrap();
        // A line is ~24 bytes of timestamp plus content; cap at ~3 lines
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 100, 500, 4));

        for i in 0..6 {
            writer.submit(record("demo", "1.0", &format!("line number {}", i)));
        }
        let written = writer.flush("demo").await.unwrap();
        assert_eq!(written, 6);

        let app_dir = temp_dir.path().join("demo");
        let first = std::fs::read_to_string(app_dir.join("demo_1.0_1-1.log")).unwrap();
        let second = std::fs::read_to_string(app_dir.join("demo_1.0_1-2.log")).unwrap();

        // Nothing lost across the rotation
        let total = first.lines().count() + second.lines().count()
            + std::fs::read_to_string(app_dir.join("demo_1.0_1-3.log"))
                .map(|c| c.lines().count())
                .unwrap_or(0);
        assert_eq!(total, 6);
        assert!(!first.is_empty());
        assert!(!second.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_triggers_single_async_flush() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        for i in 0..500 {
            writer.submit(record("demo", "1.0", &format!("line {}", i)));
        }

        // Let the scheduled flush drain the first 500
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        // Below the next threshold crossing, so these stay pending
        for i in 500..600 {
            writer.submit(record("demo", "1.0", &format!("line {}", i)));
        }

        let content = std::fs::read_to_string(temp_dir.path().join("demo/demo_1.0_1-1.log")).unwrap();
        assert_eq!(content.lines().count(), 500);
        assert_eq!(writer.pending_count("demo"), 100);
    }

    #[tokio::test]
    async fn test_submit_off_runtime_defers_flush_to_sweep() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileWriter::new(temp_dir.path(), 20 * MB, 5, 4);

        // Plain thread, no runtime: crossing the threshold must not panic
        let thread_writer = writer.clone();
        std::thread::spawn(move || {
            for i in 0..5 {
                thread_writer.submit(record("demo", "1.0", &format!("line {}", i)));
            }
        })
        .join()
        .unwrap();

        assert_eq!(writer.pending_count("demo"), 5);
        assert_eq!(writer.flush("demo").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_flush_io_failure_drops_batch_without_retry() {
        let temp_dir = TempDir::new().unwrap();
        let app_dir = temp_dir.path().join("demo");
        // A directory squatting on the target name makes the append fail
        std::fs::create_dir_all(app_dir.join("demo_1.0_1-1.log")).unwrap();

        let writer = FileWriter::new(temp_dir.path(), 20 * MB, 500, 4);
        writer.submit(record("demo", "1.0", "doomed"));

        assert!(writer.flush("demo").await.is_err());
        // The failed batch is dropped, not requeued
        assert_eq!(writer.pending_count("demo"), 0);

        // Once the obstacle is gone the writer carries on
        std::fs::remove_dir(app_dir.join("demo_1.0_1-1.log")).unwrap();
        writer.submit(record("demo", "1.0", "recovered"));
        assert_eq!(writer.flush("demo").await.unwrap(), 1);

        let content = std::fs::read_to_string(app_dir.join("demo_1.0_1-1.log")).unwrap();
        assert!(content.contains("recovered"));
        assert!(!content.contains("doomed"));
    }

    #[tokio::test]
    async fn test_concurrent_flushes_single_writer() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * MB, 500, 4));

        for i in 0..50 {
            writer.submit(record("demo", "1.0", &format!("line {}", i)));
        }

        let (a, b) = tokio::join!(writer.flush("demo"), writer.flush("demo"));
        let written = a.unwrap() + b.unwrap();
        assert_eq!(written, 50);

        let content = std::fs::read_to_string(temp_dir.path().join("demo/demo_1.0_1-1.log")).unwrap();
        assert_eq!(content.lines().count(), 50);
    }
}
