//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from the environment (and the optional TOML
//! file) without constructing a dispatcher.

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::scheduler::{WorkerStrategy, MAX_DRAIN_HZ};

/// Exit code for an unreadable or malformed config file.
const EXIT_CONFIG_ERROR: i32 = 2;

/// Print effective config to stdout, as `KEY=value` lines or JSON.
pub fn run_show(json: bool) -> i32 {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };
    let cfg = env.effective_config();

    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("ERROR: failed to serialize config: {e}");
                return 1;
            }
        }
    } else {
        if let Some(path) = &env.source_file {
            println!("# loaded from {}", path.display());
        }
        print_config(&cfg);
    }
    0
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("DISPATCH_DRAIN_HZ=50");
    println!("DISPATCH_WORKER_THREADS=0");
    println!("DISPATCH_WORKER_STACK_SIZE=2097152");
    println!("DISPATCH_QUEUE_SIZE=1024");
    println!("DISPATCH_DEFAULT_TIMEOUT_MS=0");
    println!("DISPATCH_SHUTDOWN_TIMEOUT=30");
    println!("DISPATCH_LOG_LEVEL=info");
    println!("DISPATCH_LOG_FORMAT=json");
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the config file
/// cannot be loaded.
pub fn run_validate() -> i32 {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    let warnings = collect_warnings(&env);
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn collect_warnings(env: &EnvConfig) -> Vec<String> {
    let cfg = env.effective_config();
    let mut warnings = Vec::new();

    if cfg.drain_hz >= MAX_DRAIN_HZ {
        warnings.push(format!(
            "DISPATCH_DRAIN_HZ is at the {MAX_DRAIN_HZ} Hz ceiling; callbacks will dominate the owning thread"
        ));
    }

    let interval_ms = 1000.0 / cfg.drain_hz;
    if cfg.default_timeout_ms > 0 && (cfg.default_timeout_ms as f64) < interval_ms {
        warnings.push(format!(
            "DISPATCH_DEFAULT_TIMEOUT_MS ({}) is shorter than one drain interval ({interval_ms:.1}ms)",
            cfg.default_timeout_ms
        ));
    }

    if cfg.worker_strategy == WorkerStrategy::Pooled && cfg.queue_size < cfg.worker_threads {
        warnings.push(format!(
            "DISPATCH_QUEUE_SIZE ({}) < DISPATCH_WORKER_THREADS ({}); submissions will be rejected under load",
            cfg.queue_size, cfg.worker_threads
        ));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("DISPATCH_DRAIN_HZ={}", cfg.drain_hz);
    println!("DISPATCH_WORKER_THREADS={}", cfg.worker_threads);
    println!("DISPATCH_WORKER_STACK_SIZE={}", cfg.worker_stack_size);
    println!("DISPATCH_QUEUE_SIZE={}", cfg.queue_size);
    println!("DISPATCH_DEFAULT_TIMEOUT_MS={}", cfg.default_timeout_ms);
    println!("DISPATCH_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("DISPATCH_LOG_LEVEL={}", cfg.log_level);
    println!(
        "DISPATCH_LOG_FORMAT={}",
        match cfg.log_format {
            crate::telemetry::LogFormat::Json => "json",
            crate::telemetry::LogFormat::Pretty => "pretty",
        }
    );
}
