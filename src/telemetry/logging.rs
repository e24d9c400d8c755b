//! Subscriber setup for the `dispatch` binary.
//!
//! Both formats share one writer: an append-mode log file when a path is
//! configured, stderr otherwise.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Resolved logging settings, built by [`crate::config::load`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `dispatch_core=trace`.
    pub level: String,
    /// Append events here instead of stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file {path}: {reason}")]
    FileOpen { path: PathBuf, reason: String },
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Only the first successful call wins.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let path = config.output_path.as_deref();
    let writer = open_writer(path)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(path.is_none()).with_writer(writer))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

fn open_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LogError::FileOpen {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_writer_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("dispatch.log");

        match open_writer(Some(&missing)) {
            Err(LogError::FileOpen { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected FileOpen, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_writer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dispatch.log");
        assert!(open_writer(Some(&target)).is_ok());
        assert!(target.exists());
    }

    #[test]
    fn test_bad_filter_is_rejected_before_install() {
        let config = LogConfig {
            level: "dispatch_core=verbose".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }
}
