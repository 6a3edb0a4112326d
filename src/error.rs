use thiserror::Error;

/// Main error type for the loghub log core
#[derive(Debug, Error)]
pub enum LogHubError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Log file errors
    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    #[error("Log flush failed for {0}: {1}")]
    FlushError(String, String),

    #[error("Log rotation failed: {0}")]
    RotationError(String),

    // Push delivery errors
    #[error("Subscriber limit reached ({0} connections)")]
    SubscriberLimit(usize),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for loghub operations
pub type Result<T> = std::result::Result<T, LogHubError>;
