use crate::error::{LogHubError, Result};
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, info};

/// Archive timestamp segment format: YYYYMMDD-HHMMSS
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Safety-net rotation for log files written directly by managed processes.
///
/// The embedding tool registers each application's "current log file" path;
/// on every sweep, any tracked file over the size ceiling is copied to an
/// archive name in the same directory and truncated in place, so the writing
/// process keeps its open file handle.
///
/// This is deliberately decoupled from the batched writer's own rotation:
/// the writer manages its `x-y` file history, this sweeper only ever touches
/// the single externally referenced path per application.
pub struct RotationSweeper {
    max_size: u64,
    tracked: RwLock<HashMap<String, PathBuf>>,
}

impl RotationSweeper {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or re-register) the current log file for an application
    pub fn track<P: AsRef<Path>>(&self, app_code: &str, path: P) {
        let mut tracked = self.tracked.write().unwrap_or_else(|e| e.into_inner());
        tracked.insert(app_code.to_string(), path.as_ref().to_path_buf());
    }

    pub fn untrack(&self, app_code: &str) {
        let mut tracked = self.tracked.write().unwrap_or_else(|e| e.into_inner());
        tracked.remove(app_code);
    }

    pub fn tracked_count(&self) -> usize {
        let tracked = self.tracked.read().unwrap_or_else(|e| e.into_inner());
        tracked.len()
    }

    /// Check every tracked file and rotate the ones over the ceiling.
    /// Returns the number of files rotated; per-file failures are logged and
    /// do not stop the sweep.
    pub fn sweep_once(&self) -> usize {
        let snapshot: Vec<(String, PathBuf)> = {
            let tracked = self.tracked.read().unwrap_or_else(|e| e.into_inner());
            tracked
                .iter()
                .map(|(app, path)| (app.clone(), path.clone()))
                .collect()
        };

        let mut rotated = 0;
        for (app_code, path) in snapshot {
            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                // Missing file: nothing to rotate yet
                Err(_) => continue,
            };
            if size < self.max_size {
                continue;
            }

            info!(
                app_code = %app_code,
                path = %path.display(),
                size_mb = size / (1024 * 1024),
                "Log file over size ceiling, rotating"
            );
            match Self::rotate_in_place(&path) {
                Ok(archive) => {
                    info!(
                        app_code = %app_code,
                        archive = %archive.display(),
                        "Archived log file"
                    );
                    rotated += 1;
                }
                Err(e) => {
                    error!(
                        app_code = %app_code,
                        path = %path.display(),
                        error = %e,
                        "Log rotation failed"
                    );
                }
            }
        }
        rotated
    }

    /// Copy the file to its archive name, then truncate the original to zero
    /// length so processes holding the handle keep writing to the same path.
    fn rotate_in_place(path: &Path) -> Result<PathBuf> {
        let dir = path
            .parent()
            .ok_or_else(|| LogHubError::RotationError("Invalid log file path".to_string()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LogHubError::RotationError("Invalid log file name".to_string()))?;

        let archive = dir.join(Self::archived_name(dir, stem));

        std::fs::copy(path, &archive)
            .map_err(|e| LogHubError::RotationError(format!("Failed to copy log file: {}", e)))?;

        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| LogHubError::RotationError(format!("Failed to reopen log file: {}", e)))?;
        file.set_len(0)
            .map_err(|e| LogHubError::RotationError(format!("Failed to truncate log file: {}", e)))?;

        Ok(archive)
    }

    /// Archive name for a file stem: a recognized trailing timestamp segment
    /// is replaced with the current timestamp, otherwise the first free
    /// `<stem>.<n>.log` is used.
    fn archived_name(dir: &Path, stem: &str) -> String {
        if let Some(base) = Self::strip_timestamp_segment(stem) {
            return format!(
                "{}.{}.log",
                base,
                Local::now().format(ARCHIVE_TIMESTAMP_FORMAT)
            );
        }

        let mut index = 1;
        loop {
            let candidate = format!("{}.{}.log", stem, index);
            if !dir.join(&candidate).exists() {
                return candidate;
            }
            index += 1;
        }
    }

    /// Recognize a trailing `.YYYYMMDD-HHMMSS` segment
    fn strip_timestamp_segment(stem: &str) -> Option<&str> {
        let (base, segment) = stem.rsplit_once('.')?;
        let bytes = segment.as_bytes();
        if bytes.len() != 15 || bytes[8] != b'-' {
            return None;
        }
        let digits_ok = bytes[..8].iter().all(u8::is_ascii_digit)
            && bytes[9..].iter().all(u8::is_ascii_digit);
        digits_ok.then_some(base)
    }
}
