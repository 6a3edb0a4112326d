use crate::error::{LogHubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the log core: buffering, batched file writing and the two
/// disk sweepers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Root directory for per-application log files
    pub logs_dir: PathBuf,

    /// Maximum records retained per application ring buffer
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Pending record count that triggers an asynchronous flush
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    /// Interval of the periodic flush sweep, in seconds
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Maximum size of a single writer-managed log file, in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Number of concurrent flush workers
    #[serde(default = "default_flush_workers")]
    pub flush_workers: usize,

    /// Maximum number of live push subscribers
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Rotation sweeper for externally tracked current files
    #[serde(default)]
    pub rotation: RotationSettings,

    /// Age-based log file cleanup
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

/// Settings for the background rotation sweeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Size ceiling for a tracked current file, in megabytes
    #[serde(default = "default_rotation_max_size_mb")]
    pub max_size_mb: u64,

    /// Check interval in seconds
    #[serde(default = "default_rotation_check_interval_secs")]
    pub check_interval_secs: u64,
}

/// Settings for the retention sweeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Log files older than this many days are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_cache_size() -> usize {
    5000
}

fn default_flush_size() -> usize {
    500
}

fn default_flush_interval_secs() -> u64 {
    // 5 minutes
    300
}

fn default_max_file_size_mb() -> u64 {
    20
}

fn default_flush_workers() -> usize {
    4
}

fn default_max_subscribers() -> usize {
    100
}

fn default_enabled() -> bool {
    true
}

fn default_rotation_max_size_mb() -> u64 {
    10
}

fn default_rotation_check_interval_secs() -> u64 {
    60
}

fn default_retention_days() -> u64 {
    7
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_rotation_max_size_mb(),
            check_interval_secs: default_rotation_check_interval_secs(),
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            retention_days: default_retention_days(),
        }
    }
}

impl LogSettings {
    /// Create settings with defaults for everything but the log root
    pub fn with_logs_dir<P: AsRef<Path>>(logs_dir: P) -> Self {
        Self {
            logs_dir: logs_dir.as_ref().to_path_buf(),
            cache_size: default_cache_size(),
            flush_size: default_flush_size(),
            flush_interval_secs: default_flush_interval_secs(),
            max_file_size_mb: default_max_file_size_mb(),
            flush_workers: default_flush_workers(),
            max_subscribers: default_max_subscribers(),
            rotation: RotationSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }

    /// Load settings from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<LogSettings> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LogHubError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let settings: LogSettings = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| LogHubError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| LogHubError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(LogHubError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.logs_dir.as_os_str().is_empty() {
            return Err(LogHubError::MissingConfigField("logs_dir".to_string()));
        }

        if self.cache_size == 0 {
            return Err(LogHubError::ConfigValidationError(
                "cache_size must be at least 1".to_string(),
            ));
        }

        if self.flush_size == 0 {
            return Err(LogHubError::ConfigValidationError(
                "flush_size must be at least 1".to_string(),
            ));
        }

        if self.flush_interval_secs == 0 {
            return Err(LogHubError::ConfigValidationError(
                "flush_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.max_file_size_mb == 0 {
            return Err(LogHubError::ConfigValidationError(
                "max_file_size_mb must be at least 1".to_string(),
            ));
        }

        if self.flush_workers == 0 {
            return Err(LogHubError::ConfigValidationError(
                "flush_workers must be at least 1".to_string(),
            ));
        }

        if self.rotation.max_size_mb == 0 {
            return Err(LogHubError::ConfigValidationError(
                "rotation.max_size_mb must be at least 1".to_string(),
            ));
        }

        if self.rotation.check_interval_secs == 0 {
            return Err(LogHubError::ConfigValidationError(
                "rotation.check_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Maximum writer file size in bytes
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Rotation sweeper size ceiling in bytes
    pub fn rotation_max_size(&self) -> u64 {
        self.rotation.max_size_mb * 1024 * 1024
    }

    /// Flush sweep interval as a Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Rotation check interval as a Duration
    pub fn rotation_check_interval(&self) -> Duration {
        Duration::from_secs(self.rotation.check_interval_secs)
    }
}
