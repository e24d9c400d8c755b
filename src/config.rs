//! Dispatcher configuration loading from environment variables and TOML.
//!
//! Values come from an optional TOML file named by `DISPATCH_CONFIG_FILE`,
//! then `DISPATCH_*` environment variables override individual keys.
//! Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DISPATCH_CONFIG_FILE` | unset | Path to a TOML config file |
//! | `DISPATCH_DRAIN_HZ` | 50 | Drain ticks per second |
//! | `DISPATCH_WORKER_THREADS` | 0 | Pool size (0 = thread per request) |
//! | `DISPATCH_WORKER_STACK_SIZE` | 2097152 | Worker stack size (bytes) |
//! | `DISPATCH_QUEUE_SIZE` | 1024 | Max jobs waiting for a pool thread |
//! | `DISPATCH_DEFAULT_TIMEOUT_MS` | 0 | Per-submission timeout (0 = none) |
//! | `DISPATCH_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `DISPATCH_LOG_LEVEL` | info | Log filter directive |
//! | `DISPATCH_LOG_FORMAT` | json | `json` or `pretty` |

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{
    DispatcherConfig, WorkerConfig, WorkerStrategy, DEFAULT_DRAIN_HZ, MAX_DRAIN_HZ,
};
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const MIN_STACK_SIZE: usize = 64 * 1024; // floor: 64 KiB
const DEFAULT_QUEUE_SIZE: usize = 1024;
const DEFAULT_SHUTDOWN_SECS: u64 = 30;

/// Errors reading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// TOML file layout. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub drain_hz: Option<f64>,
    pub worker_threads: Option<usize>,
    pub worker_stack_size: Option<usize>,
    pub queue_size: Option<usize>,
    pub default_timeout_ms: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub log_file: Option<PathBuf>,
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub drain_hz: f64,
    pub worker_strategy: WorkerStrategy,
    pub worker_threads: usize,
    pub worker_stack_size: usize,
    pub queue_size: usize,
    pub default_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All configuration: dispatcher plus logging.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub dispatcher: DispatcherConfig,
    pub log: LogConfig,
    /// File the values were seeded from, if any.
    pub source_file: Option<PathBuf>,
}

/// Parse an env var, returning `None` on missing or invalid.
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse::<T>().ok()
}

/// Read and parse a TOML config file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Overlay `DISPATCH_*` environment variables onto file values.
fn apply_env(mut file: FileConfig) -> FileConfig {
    if let Some(v) = parse_env("DISPATCH_DRAIN_HZ") {
        file.drain_hz = Some(v);
    }
    if let Some(v) = parse_env("DISPATCH_WORKER_THREADS") {
        file.worker_threads = Some(v);
    }
    if let Some(v) = parse_env("DISPATCH_WORKER_STACK_SIZE") {
        file.worker_stack_size = Some(v);
    }
    if let Some(v) = parse_env("DISPATCH_QUEUE_SIZE") {
        file.queue_size = Some(v);
    }
    if let Some(v) = parse_env("DISPATCH_DEFAULT_TIMEOUT_MS") {
        file.default_timeout_ms = Some(v);
    }
    if let Some(v) = parse_env("DISPATCH_SHUTDOWN_TIMEOUT") {
        file.shutdown_timeout_secs = Some(v);
    }
    if let Ok(v) = std::env::var("DISPATCH_LOG_LEVEL") {
        if !v.trim().is_empty() {
            file.log_level = Some(v);
        }
    }
    if let Some(v) = parse_env("DISPATCH_LOG_FORMAT") {
        file.log_format = Some(v);
    }
    file
}

/// Load worker configuration.
fn build_worker_config(file: &FileConfig) -> WorkerConfig {
    let threads = file.worker_threads.unwrap_or(0);
    let stack_size = file
        .worker_stack_size
        .unwrap_or(DEFAULT_STACK_SIZE)
        .max(MIN_STACK_SIZE);
    let queue_size = file.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE).max(1);

    let base = WorkerConfig {
        stack_size,
        queue_size,
        ..WorkerConfig::default()
    };
    match NonZeroUsize::new(threads) {
        Some(threads) => WorkerConfig {
            strategy: WorkerStrategy::Pooled,
            threads,
            ..base
        },
        None => base,
    }
}

/// Resolve final values with defaults and clamping.
fn build(file: FileConfig, source_file: Option<PathBuf>) -> EnvConfig {
    let drain_hz = file
        .drain_hz
        .filter(|hz| hz.is_finite() && *hz > 0.0)
        .unwrap_or(DEFAULT_DRAIN_HZ)
        .min(MAX_DRAIN_HZ);
    let default_timeout = file
        .default_timeout_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);
    let shutdown_secs = file
        .shutdown_timeout_secs
        .unwrap_or(DEFAULT_SHUTDOWN_SECS)
        .max(1);

    let dispatcher = DispatcherConfig {
        drain_hz,
        default_timeout,
        workers: build_worker_config(&file),
        shutdown_timeout: Duration::from_secs(shutdown_secs),
    };

    let log = LogConfig {
        format: file.log_format.unwrap_or_default(),
        level: file.log_level.unwrap_or_else(|| "info".to_string()),
        output_path: file.log_file,
    };

    EnvConfig { dispatcher, log, source_file }
}

/// Load all configuration from the environment, seeded by
/// `DISPATCH_CONFIG_FILE` when set.
///
/// Missing or invalid values fall back to safe defaults. Only an unreadable
/// or malformed config file is an error.
pub fn load() -> Result<EnvConfig, ConfigError> {
    let source_file = std::env::var_os("DISPATCH_CONFIG_FILE")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    let file = match &source_file {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };
    Ok(build(apply_env(file), source_file))
}

/// Load configuration from a specific file, with env overrides applied.
pub fn load_from(path: &Path) -> Result<EnvConfig, ConfigError> {
    let file = load_file(path)?;
    Ok(build(apply_env(file), Some(path.to_path_buf())))
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let workers = &self.dispatcher.workers;
        EffectiveConfig {
            drain_hz: self.dispatcher.drain_hz,
            worker_strategy: workers.strategy,
            worker_threads: match workers.strategy {
                WorkerStrategy::ThreadPerRequest => 0,
                WorkerStrategy::Pooled => workers.threads.get(),
            },
            worker_stack_size: workers.stack_size,
            queue_size: workers.queue_size,
            default_timeout_ms: self
                .dispatcher
                .default_timeout
                .map(|t| t.as_millis() as u64)
                .unwrap_or(0),
            shutdown_timeout_secs: self.dispatcher.shutdown_timeout.as_secs(),
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "DISPATCH_CONFIG_FILE",
        "DISPATCH_DRAIN_HZ",
        "DISPATCH_WORKER_THREADS",
        "DISPATCH_WORKER_STACK_SIZE",
        "DISPATCH_QUEUE_SIZE",
        "DISPATCH_DEFAULT_TIMEOUT_MS",
        "DISPATCH_SHUTDOWN_TIMEOUT",
        "DISPATCH_LOG_LEVEL",
        "DISPATCH_LOG_FORMAT",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.dispatcher.drain_hz, 50.0);
        assert_eq!(cfg.dispatcher.workers.strategy, WorkerStrategy::ThreadPerRequest);
        assert_eq!(cfg.dispatcher.workers.stack_size, 2 * 1024 * 1024);
        assert_eq!(cfg.dispatcher.workers.queue_size, 1024);
        assert_eq!(cfg.dispatcher.default_timeout, None);
        assert_eq!(cfg.dispatcher.shutdown_timeout.as_secs(), 30);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert!(cfg.source_file.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("DISPATCH_DRAIN_HZ", "25");
        std::env::set_var("DISPATCH_WORKER_THREADS", "4");
        std::env::set_var("DISPATCH_DEFAULT_TIMEOUT_MS", "1500");
        std::env::set_var("DISPATCH_LOG_FORMAT", "pretty");
        let cfg = load().unwrap();
        assert_eq!(cfg.dispatcher.drain_hz, 25.0);
        assert_eq!(cfg.dispatcher.workers.strategy, WorkerStrategy::Pooled);
        assert_eq!(cfg.dispatcher.workers.threads.get(), 4);
        assert_eq!(cfg.dispatcher.default_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("DISPATCH_DRAIN_HZ", "fast");
        std::env::set_var("DISPATCH_WORKER_THREADS", "-3");
        std::env::set_var("DISPATCH_LOG_FORMAT", "xml");
        let cfg = load().unwrap();
        assert_eq!(cfg.dispatcher.drain_hz, 50.0);
        assert_eq!(cfg.dispatcher.workers.strategy, WorkerStrategy::ThreadPerRequest);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_values_are_clamped() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("DISPATCH_DRAIN_HZ", "0");
        std::env::set_var("DISPATCH_WORKER_STACK_SIZE", "16");
        std::env::set_var("DISPATCH_SHUTDOWN_TIMEOUT", "0");
        std::env::set_var("DISPATCH_QUEUE_SIZE", "0");
        let cfg = load().unwrap();
        assert_eq!(cfg.dispatcher.drain_hz, 50.0);
        assert!(cfg.dispatcher.workers.stack_size >= 64 * 1024);
        assert!(cfg.dispatcher.shutdown_timeout.as_secs() >= 1);
        assert!(cfg.dispatcher.workers.queue_size >= 1);

        std::env::set_var("DISPATCH_DRAIN_HZ", "1000000");
        let cfg = load().unwrap();
        assert!(cfg.dispatcher.drain_hz <= MAX_DRAIN_HZ, "must be clamped");
        clear_env_vars();
    }

    #[test]
    fn test_huge_timeouts_load_and_shut_down() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("DISPATCH_SHUTDOWN_TIMEOUT", u64::MAX.to_string());
        std::env::set_var("DISPATCH_DEFAULT_TIMEOUT_MS", u64::MAX.to_string());
        let cfg = load().unwrap();
        clear_env_vars();

        let dispatcher = crate::scheduler::Dispatcher::new(cfg.dispatcher).unwrap();
        dispatcher.submit(|| 1u32, |_| {}).unwrap();
        assert_eq!(
            dispatcher.shutdown(),
            crate::shutdown::ShutdownResult::Complete
        );
    }

    #[test]
    fn test_toml_file_then_env_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let file = write_toml(
            "drain_hz = 30.0\nworker_threads = 2\nlog_level = \"debug\"\nlog_format = \"pretty\"\n",
        );
        std::env::set_var("DISPATCH_CONFIG_FILE", file.path());
        std::env::set_var("DISPATCH_WORKER_THREADS", "6");

        let cfg = load().unwrap();
        assert_eq!(cfg.dispatcher.drain_hz, 30.0);
        assert_eq!(cfg.dispatcher.workers.threads.get(), 6);
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.source_file.as_deref(), Some(file.path()));
        clear_env_vars();
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let file = write_toml("drain_hz = \"very fast\"\n");
        let err = load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_toml("unknown_key = 1\n");
        assert!(load_from(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_file(Path::new("/nonexistent/dispatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_effective_config_contains_all_fields() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("DISPATCH_WORKER_THREADS", "3");
        let eff = load().unwrap().effective_config();
        assert!(eff.drain_hz > 0.0);
        assert_eq!(eff.worker_strategy, WorkerStrategy::Pooled);
        assert_eq!(eff.worker_threads, 3);
        assert!(eff.worker_stack_size > 0);
        assert!(eff.queue_size > 0);
        assert_eq!(eff.default_timeout_ms, 0);
        assert!(eff.shutdown_timeout_secs > 0);
        assert_eq!(eff.log_level, "info");
        clear_env_vars();
    }
}
