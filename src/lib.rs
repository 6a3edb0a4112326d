// Library exports for the loghub log core

pub mod buffer;
pub mod config;
pub mod error;
pub mod hub;
pub mod push;
pub mod record;
pub mod sweeper;
pub mod writer;

pub use config::LogSettings;
pub use error::{LogHubError, Result};
pub use hub::{LogHub, ReadResult, DEFAULT_READ_LIMIT};
pub use record::LogRecord;
