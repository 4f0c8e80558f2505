//! # Structured Logging
//!
//! The decode layer only emits `tracing` events. Applications that want to
//! see them can install the subscriber built here from the `logging`
//! section of [`RadioConfig`](crate::config::RadioConfig).
//!
//! Events from stream tasks run on the `dab-worker-N` pool threads, so
//! thread names are shown by default.
//!
//! ```rust,no_run
//! use dab_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! init_logging(&LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! });
//! tracing::info!(subchannel = 3, "channel registered");
//! ```

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Minimum severity written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-FIG and per-CIF detail
    Trace,
    Debug,
    #[default]
    Info,
    /// Refused sub-channels and failed stream tasks
    Warn,
    /// Rejected frames and panicking tasks
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of the written events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line, coloured
    Pretty,
    #[default]
    Compact,
}

/// `logging` section of the radio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Append to this file instead of writing to stdout
    pub file: Option<PathBuf>,
    pub timestamps: bool,
    /// Show which worker thread decoded the stream
    pub thread_names: bool,
    /// Append file:line to each event
    pub source_location: bool,
    /// Directive string such as `dab_core::fic=trace,dab_core::radio=debug`.
    /// Takes precedence over `RUST_LOG` and `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            file: None,
            timestamps: true,
            thread_names: true,
            source_location: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Debug output from the control stream and dispatcher, pretty printed.
    pub fn decoder_debug() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            source_location: true,
            filter: Some("info,dab_core::fic=debug,dab_core::radio=debug".to_string()),
            ..Default::default()
        }
    }

    /// Errors only, no timestamps. Used by tests and benchmarks.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            timestamps: false,
            thread_names: false,
            ..Default::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Only the first call has an effect. An unopenable log file falls back to
/// stdout.
pub fn init_logging(config: &LogConfig) {
    let file = config
        .file
        .as_ref()
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok());
    let (writer, ansi) = match file {
        Some(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(config.thread_names)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.timestamps) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(config.env_filter());
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_match_filter_syntax() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert!(EnvFilter::try_new(level.as_str()).is_ok());
            assert_eq!(level.to_string(), level.as_str());
        }
    }

    #[test]
    fn test_worker_thread_names_on_by_default() {
        let config = LogConfig::default();
        assert!(config.thread_names);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!LogConfig::quiet().thread_names);
    }

    #[test]
    fn test_decoder_debug_filter_parses() {
        let config = LogConfig::decoder_debug();
        let directives = config.filter.as_deref().unwrap_or_default();
        assert!(EnvFilter::try_new(directives).is_ok());
        assert!(directives.contains("dab_core::radio=debug"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: LogConfig = serde_yaml::from_str("level: debug\nformat: json\n").unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.timestamps);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_repeated_init_is_ignored() {
        init_logging(&LogConfig::quiet());
        init_logging(&LogConfig::quiet());
    }
}
