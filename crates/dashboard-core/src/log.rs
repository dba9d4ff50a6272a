//! User-visible message log kept alongside pipeline progress.

use chrono::{DateTime, Utc};

/// Severity of a log entry as shown to the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One message log entry.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Raw service payload attached to the message, if any.
    pub payload: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            payload: None,
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Attaches a raw payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Append-only list of log entries. Every entry is mirrored to `tracing`.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn push(&mut self, entry: LogEntry) {
        match entry.level {
            LogLevel::Error => tracing::error!(payload = ?entry.payload, "{}", entry.message),
            LogLevel::Warning => tracing::warn!("{}", entry.message),
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", entry.message),
        }
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_order_and_payload() {
        let mut log = MessageLog::default();
        log.push(LogEntry::info("started"));
        log.push(LogEntry::error("failed").with_payload(serde_json::json!({"node": "boom"})));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].level, LogLevel::Info);
        let last = log.last().expect("entry");
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.payload, Some(serde_json::json!({"node": "boom"})));
    }
}
