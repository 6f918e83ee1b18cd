//! Leveled logging for the identity subsystem.
//!
//! Identity clients report through [`IdentityLogger`] instead of writing to the
//! console directly, so call sites can be checked in tests by swapping in a
//! recording logger.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of an identity log record, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// Sink for identity log records.
pub trait IdentityLogger: Send + Sync {
    /// Record `message` at `level`. `contains_pii` marks messages carrying
    /// personal data such as usernames or tokens.
    fn log(&self, level: LogLevel, message: &str, contains_pii: bool);
}

/// Forwards records to `tracing`, dropping anything flagged as PII and
/// anything less severe than `max_level`.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    max_level: LogLevel,
}

impl TracingLogger {
    pub fn new(max_level: LogLevel) -> Self {
        Self { max_level }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.max_level
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl IdentityLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, contains_pii: bool) {
        if contains_pii || !self.enabled(level) {
            return;
        }
        match level {
            LogLevel::Error => tracing::error!(target: "azbridge::identity", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "azbridge::identity", "{message}"),
            LogLevel::Info => tracing::info!(target: "azbridge::identity", "{message}"),
            LogLevel::Verbose => tracing::debug!(target: "azbridge::identity", "{message}"),
            LogLevel::Trace => tracing::trace!(target: "azbridge::identity", "{message}"),
        }
    }
}
