//! Diagnostics sink for marshalling warnings and failures

use std::cell::RefCell;
use tracing::Level;

/// Receives `(level, path, message)` diagnostics from the engines
pub trait Logger {
    fn log(&self, level: Level, path: &str, message: &str);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, path: &str, message: &str) {
        match level {
            Level::ERROR => tracing::error!(path, "{}", message),
            Level::WARN => tracing::warn!(path, "{}", message),
            Level::INFO => tracing::info!(path, "{}", message),
            Level::DEBUG => tracing::debug!(path, "{}", message),
            _ => tracing::trace!(path, "{}", message),
        }
    }
}

/// A single captured diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub path: String,
    pub message: String,
}

/// Keeps diagnostics in memory, e.g. to report lenient defaults after a load
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: RefCell<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    /// Records at WARN level
    pub fn warnings(&self) -> Vec<LogRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.level == Level::WARN)
            .cloned()
            .collect()
    }

    /// Records at ERROR level
    pub fn errors(&self) -> Vec<LogRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.level == Level::ERROR)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, path: &str, message: &str) {
        self.records.borrow_mut().push(LogRecord {
            level,
            path: path.to_string(),
            message: message.to_string(),
        });
    }
}
