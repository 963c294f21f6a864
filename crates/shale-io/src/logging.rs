//! Levelled logging adapter.
//!
//! The storage layers report recovery events (truncations, dropped keys,
//! failed deletions) through this callback interface rather than a fixed
//! logging framework, so embedded hosts can route them into whatever sink
//! they have. The default sink, [`TracingLogger`], forwards to `tracing`.

use std::sync::Arc;

/// Severity of a log message, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Sentinel for sinks that discard everything.
    Disabled,
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

/// A levelled log sink.
///
/// Callers check `logger.level() <= level` before formatting a message, so
/// sinks that filter aggressively skip the formatting cost too.
pub trait Logger: Send + Sync {
    /// The minimum level this sink cares about.
    fn level(&self) -> LogLevel {
        LogLevel::Info
    }

    /// Consumes one message.
    fn log(&self, level: LogLevel, message: &str);
}

/// The default [`Logger`]: forwards every message to the matching `tracing`
/// macro and leaves filtering to the subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn level(&self) -> LogLevel {
        LogLevel::Trace
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Disabled => {}
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// Returns the default logger used when options leave the sink unset.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}
