//! Logging setup on top of `tracing`.
//!
//! The library only emits events; installing a subscriber is left to the
//! embedder, or to [`init_logging`] / [`init_from_env`] when asked.

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level for the runtime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (default)
    #[default]
    Error,
    /// Fatal level (least verbose)
    Fatal,
}

impl LogLevel {
    /// Convert to tracing level filter
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Fatal => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Install a fmt subscriber at `level`. Returns `false` if one was already set.
pub fn init_logging(level: LogLevel) -> bool {
    let filter = EnvFilter::new(level.to_tracing_level().as_str());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}

/// Install a fmt subscriber configured from `RUST_LOG`, falling back to
/// `LOG_LEVEL` and then `info`. Returns `false` if one was already set.
pub fn init_from_env() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse::<LogLevel>().ok())
            .unwrap_or(LogLevel::Info);
        EnvFilter::new(level.to_tracing_level().as_str())
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_fatal_maps_to_error() {
        assert_eq!(LogLevel::Fatal.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::default(), LogLevel::Error);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(LogLevel::Warn);
        assert!(!init_logging(LogLevel::Debug));
    }
}
