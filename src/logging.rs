//! Leveled diagnostic narration for the harness.
//!
//! Every component takes an injected [`Logger`]; nothing in the harness
//! couples to a particular output. The logger filters by [`LogLevel`] and
//! forwards to a one-method [`LogSink`] capability:
//!
//! - [`ConsoleSink`]: errors to stderr, everything else to stdout (default)
//! - [`CaptureSink`]: records messages for assertion in tests
//! - [`NoopSink`]: drops everything; substitutable with zero behavioral
//!   change to the harness
//! - [`TracingSink`]: forwards to the `tracing` ecosystem
//!
//! Narration is cosmetic by design: no harness semantics depend on log
//! text, and no test should assert on exact messages.

use core::fmt;
use std::sync::{Arc, Mutex};

/// Narration verbosity, ordered from least to most verbose:
/// `Error < Info < Debug < Verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Failures only.
    Error,
    /// Trigger-cycle summaries.
    Info,
    /// Cycle separators and pipeline state transitions.
    #[default]
    Debug,
    /// Everything, including trigger labels.
    Verbose,
}

impl LogLevel {
    /// Returns a human-readable name for the level.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Verbose => "VERBOSE",
        }
    }

    /// Reads the level from the `FETCHLAB_LOG_LEVEL` environment variable,
    /// falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("FETCHLAB_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "verbose" | "trace" => Ok(Self::Verbose),
            _ => Err(()),
        }
    }
}

/// A leveled text sink. One method; implementations decide where the line
/// goes.
pub trait LogSink: Send + Sync {
    /// Writes one already-filtered message.
    fn write(&self, level: LogLevel, message: &str);
}

/// Errors to stderr, everything else to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&self, level: LogLevel, message: &str) {
        if level == LogLevel::Error {
            eprintln!("[{:>7}] {message}", level.name());
        } else {
            println!("[{:>7}] {message}", level.name());
        }
    }
}

/// Drops every message.
#[derive(Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn write(&self, _level: LogLevel, _message: &str) {}
}

/// A captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Level the line was written at.
    pub level: LogLevel,
    /// The message text.
    pub message: String,
}

/// Records messages for later inspection.
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CaptureSink {
    /// Creates an empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all captured records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().expect("lock poisoned").clone()
    }

    /// Returns the number of captured records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().expect("lock poisoned").len()
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for CaptureSink {
    fn write(&self, level: LogLevel, message: &str) {
        self.records.lock().expect("lock poisoned").push(LogRecord {
            level,
            message: message.to_owned(),
        });
    }
}

/// Forwards harness narration to `tracing` events.
///
/// `Verbose` maps to `trace!`; the other levels map to their namesakes.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "fetchlab", "{message}"),
            LogLevel::Info => tracing::info!(target: "fetchlab", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "fetchlab", "{message}"),
            LogLevel::Verbose => tracing::trace!(target: "fetchlab", "{message}"),
        }
    }
}

/// A cheap, cloneable handle pairing a level filter with a shared sink.
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Creates a logger writing to the console at the given level.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self::with_sink(level, Arc::new(ConsoleSink))
    }

    /// Creates a logger with a caller-supplied sink.
    #[must_use]
    pub fn with_sink(level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self { level, sink }
    }

    /// Creates a logger that drops everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::with_sink(LogLevel::Error, Arc::new(NoopSink))
    }

    /// Creates a logger backed by a fresh [`CaptureSink`], returning both.
    #[must_use]
    pub fn captured(level: LogLevel) -> (Self, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (Self::with_sink(level, sink.clone()), sink)
    }

    /// Returns the configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Returns true if a message at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    /// Writes a message if `level` passes the filter.
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            self.sink.write(level, message);
        }
    }

    /// Writes at `Error`.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Writes at `Info`.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Writes at `Debug`.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Writes at `Verbose`.
    pub fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("level", &self.level).finish()
    }
}
