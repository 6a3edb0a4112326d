use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Local hour at which the daily retention sweep is anchored
const SWEEP_HOUR: u32 = 2;

/// Deletes log files older than the retention window.
///
/// Sweeps the log root and its immediate per-application subdirectories for
/// `.log` files whose last-modified time falls before the cutoff. Deletion
/// failures are logged and never abort the sweep.
pub struct RetentionSweeper {
    logs_dir: PathBuf,
    retention_days: u64,
}

impl RetentionSweeper {
    pub fn new<P: AsRef<Path>>(logs_dir: P, retention_days: u64) -> Self {
        Self {
            logs_dir: logs_dir.as_ref().to_path_buf(),
            retention_days,
        }
    }

    /// Run one sweep; returns the number of files deleted
    pub fn sweep_once(&self) -> usize {
        info!(
            retention_days = self.retention_days,
            "Cleaning up expired log files"
        );

        if !self.logs_dir.is_dir() {
            warn!(dir = %self.logs_dir.display(), "Log root missing or not a directory");
            return 0;
        }

        let cutoff = SystemTime::now() - Duration::from_secs(self.retention_days * 24 * 60 * 60);

        let mut deleted = 0;
        let mut freed = 0;
        self.sweep_dir(&self.logs_dir, cutoff, true, &mut deleted, &mut freed);

        if deleted > 0 {
            info!(
                deleted,
                freed_mb = freed / (1024 * 1024),
                "Log cleanup finished"
            );
        } else {
            info!("Log cleanup finished, nothing expired");
        }
        deleted
    }

    fn sweep_dir(
        &self,
        dir: &Path,
        cutoff: SystemTime,
        descend: bool,
        deleted: &mut usize,
        freed: &mut u64,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read log directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();

            if path.is_dir() {
                // The writer keeps one subdirectory per application; one
                // level of descent covers everything it produces
                if descend {
                    self.sweep_dir(&path, cutoff, false, deleted, freed);
                }
                continue;
            }

            let is_log = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("log"))
                .unwrap_or(false);
            if !is_log {
                continue;
            }

            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), size = meta.len(), "Deleted expired log file");
                    *deleted += 1;
                    *freed += meta.len();
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete log file");
                }
            }
        }
    }

    /// Time until the next anchored daily run (02:00 local).
    ///
    /// Falls back to a flat 24 h if the local calendar does the unexpected.
    pub fn delay_until_next_run() -> Duration {
        Self::delay_from(Local::now().naive_local())
    }

    fn delay_from(now: NaiveDateTime) -> Duration {
        let Some(today_run) = now.date().and_hms_opt(SWEEP_HOUR, 0, 0) else {
            return Duration::from_secs(24 * 60 * 60);
        };

        // Exactly on the anchor counts as due now, not tomorrow
        let next = if now <= today_run {
            today_run
        } else {
            today_run + chrono::Duration::days(1)
        };

        (next - now)
            .to_std()
            .unwrap_or(Duration::from_secs(24 * 60 * 60))
    }
}
