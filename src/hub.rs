// Hub - The facade collaborators call into: submit, sessions, reads, push

use crate::buffer::{BufferStatus, BufferStore};
use crate::config::LogSettings;
use crate::error::Result;
use crate::push::{FanOut, PushReceiver, SubscriberId};
use crate::record::{parse_level, LogRecord};
use crate::sweeper::{RetentionSweeper, RotationSweeper};
use crate::writer::FileWriter;
use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default cap on records returned by a single incremental read
pub const DEFAULT_READ_LIMIT: usize = 1000;

/// Result of an incremental read: the matching records plus the highest
/// sequence number assigned so far, for the caller's next poll
pub struct ReadResult {
    pub records: Vec<Arc<LogRecord>>,
    pub highest_seq: u64,
}

/// Central log core: global sequencing, per-application ring buffers,
/// batched file persistence, push fan-out and the two disk sweepers.
///
/// Submission and reads are synchronous and non-blocking; all file I/O
/// happens in background tasks.
pub struct LogHub {
    settings: LogSettings,
    buffers: BufferStore,
    writer: FileWriter,
    fanout: FanOut,
    rotation: Arc<RotationSweeper>,
    retention: Arc<RetentionSweeper>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LogHub {
    /// Create a hub and ensure the log root exists
    pub fn new(settings: LogSettings) -> Result<Self> {
        settings.validate()?;
        std::fs::create_dir_all(&settings.logs_dir)?;

        let writer = FileWriter::new(
            &settings.logs_dir,
            settings.max_file_size(),
            settings.flush_size,
            settings.flush_workers,
        );
        let hub = Self {
            buffers: BufferStore::new(settings.cache_size),
            writer,
            fanout: FanOut::new(settings.max_subscribers),
            rotation: Arc::new(RotationSweeper::new(settings.rotation_max_size())),
            retention: Arc::new(RetentionSweeper::new(
                &settings.logs_dir,
                settings.cleanup.retention_days,
            )),
            tasks: Mutex::new(Vec::new()),
            settings,
        };

        info!(
            logs_dir = %hub.settings.logs_dir.display(),
            cache_size = hub.settings.cache_size,
            flush_size = hub.settings.flush_size,
            "Log hub initialized"
        );
        Ok(hub)
    }

    /// Ingest one record. Returns its assigned sequence number.
    ///
    /// The record lands in the ring buffer (always succeeds), is queued for
    /// batched persistence, and is pushed to live subscribers. Timestamp
    /// defaults to the ingestion time. Callable from any thread; threshold
    /// flushes are scheduled only when a tokio runtime is available, the
    /// periodic sweep covers the rest.
    pub fn submit(
        &self,
        app_code: &str,
        version: &str,
        level: &str,
        content: &str,
        timestamp: Option<DateTime<Local>>,
    ) -> u64 {
        let record = LogRecord {
            app_code: app_code.to_string(),
            version: version.to_string(),
            level: level.to_string(),
            content: content.to_string(),
            timestamp: timestamp.unwrap_or_else(Local::now),
            seq: 0,
        };

        let record = self.buffers.submit(record);
        self.writer.submit(Arc::clone(&record));
        self.fanout.notify(&record);
        record.seq
    }

    /// Ingest raw output lines, inferring a level per line and stamping them
    /// with the ingestion time. Blank lines are skipped.
    pub fn submit_lines<'a, I>(&self, app_code: &str, version: &str, lines: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Local::now();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            self.submit(app_code, version, parse_level(line), line, Some(now));
        }
    }

    /// Start a new run: flush the previous session's pending records, advance
    /// the on-disk run index, and clear the application's ring buffer.
    pub async fn begin_session(&self, app_code: &str, version: &str) -> Result<()> {
        self.writer.begin_session(app_code, version).await?;
        self.buffers.clear(app_code);
        Ok(())
    }

    /// Incremental poll: buffered records with `seq > after_seq`, oldest
    /// first, capped at `limit`. Unknown applications yield an empty result.
    pub fn read_since(&self, app_code: &str, after_seq: u64, limit: usize) -> ReadResult {
        ReadResult {
            records: self.buffers.read_since(app_code, after_seq, limit),
            highest_seq: self.buffers.sequencer().current(),
        }
    }

    /// Register a push subscriber for one application's records
    pub fn subscribe(&self, app_code: &str) -> Result<(SubscriberId, PushReceiver)> {
        self.fanout.subscribe(app_code)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.fanout.unsubscribe(id);
    }

    /// Register an application's externally written current log file with the
    /// rotation sweeper
    pub fn track_current_file<P: AsRef<Path>>(&self, app_code: &str, path: P) {
        self.rotation.track(app_code, path);
    }

    pub fn untrack_current_file(&self, app_code: &str) {
        self.rotation.untrack(app_code);
    }

    pub fn buffer_status(&self) -> BufferStatus {
        self.buffers.status()
    }

    pub fn settings(&self) -> &LogSettings {
        &self.settings
    }

    /// Spawn the periodic flush sweep, rotation sweep and retention sweep.
    /// Idempotent use is not supported; call once after construction.
    pub fn spawn_background_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        // Flush sweep: bounds staleness for applications that never reach
        // the count threshold
        let writer = self.writer.clone();
        let flush_interval = self.settings.flush_interval();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            interval.tick().await; // first tick fires immediately, skip it
            loop {
                interval.tick().await;
                writer.flush_all().await;
            }
        }));

        if self.settings.rotation.enabled {
            let rotation = Arc::clone(&self.rotation);
            let check_interval = self.settings.rotation_check_interval();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(check_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let sweeper = Arc::clone(&rotation);
                    if let Err(e) = tokio::task::spawn_blocking(move || sweeper.sweep_once()).await
                    {
                        error!(error = %e, "Rotation sweep task failed");
                    }
                }
            }));
        } else {
            info!("Rotation sweeper disabled");
        }

        if self.settings.cleanup.enabled {
            let retention = Arc::clone(&self.retention);
            tasks.push(tokio::spawn(async move {
                // Initial sweep at startup, then daily runs anchored at 02:00
                Self::run_retention_sweep(&retention).await;
                tokio::time::sleep(RetentionSweeper::delay_until_next_run()).await;
                loop {
                    Self::run_retention_sweep(&retention).await;
                    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                }
            }));
        } else {
            info!("Retention sweeper disabled");
        }
    }

    async fn run_retention_sweep(retention: &Arc<RetentionSweeper>) {
        let sweeper = Arc::clone(retention);
        if let Err(e) = tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
            error!(error = %e, "Retention sweep task failed");
        }
    }

    /// Stop background tasks and flush every pending queue to disk
    pub async fn shutdown(&self) {
        info!("Shutting down log hub");

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }

        self.writer.flush_all().await;
        info!("Log hub shut down");
    }
}
