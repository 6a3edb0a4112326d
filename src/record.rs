use chrono::{DateTime, Local};
use serde::Serialize;

/// Timestamp format used for log lines and serialized records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single log record flowing through the buffer, writer and push fan-out.
///
/// `seq` is assigned once by the sequencer at submission time and exists only
/// in memory; it is never written to disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub app_code: String,
    pub version: String,
    pub level: String,
    pub content: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    pub seq: u64,
}

impl LogRecord {
    /// Format the record as a persisted log line: `<timestamp> <content>`
    pub fn format_line(&self) -> String {
        format!(
            "{} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.content
        )
    }
}

fn serialize_timestamp<S>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Infer a log level from raw line content.
///
/// Lines that carry no recognizable level marker default to INFO.
pub fn parse_level(content: &str) -> &'static str {
    let upper = content.to_uppercase();
    if upper.contains("ERROR") {
        "ERROR"
    } else if upper.contains("WARN") {
        "WARN"
    } else if upper.contains("DEBUG") {
        "DEBUG"
    } else if upper.contains("TRACE") {
        "TRACE"
    } else {
        "INFO"
    }
}
