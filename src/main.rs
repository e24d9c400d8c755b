//! Dispatch Core command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `dispatch-core-cli demo [COUNT]` - Run a simulated workload (default)
//! - `dispatch-core-cli config show [--json]` - Print effective configuration
//! - `dispatch-core-cli config defaults` - Print default configuration
//! - `dispatch-core-cli config validate` - Validate configuration (exit 0/1)

use std::process::ExitCode;

use dispatch_core::cli::{self, DEFAULT_DEMO_COUNT};
use dispatch_core::config;
use dispatch_core::telemetry::init_logging;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("demo");

    match command {
        "demo" => run_demo(&args),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json = args.get(3).map(|s| s.as_str()) == Some("--json");
                    ExitCode::from(cli::run_show(json) as u8)
                }
                "defaults" => {
                    cli::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(cli::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("dispatch-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn run_demo(args: &[String]) -> ExitCode {
    let count = match args.get(2) {
        None => DEFAULT_DEMO_COUNT,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                eprintln!("Invalid job count: {}", raw);
                print_command_help("demo");
                return ExitCode::FAILURE;
            }
        },
    };

    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2u8);
        }
    };
    if let Err(e) = init_logging(&env.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2u8);
    }

    match cli::run_demo(env.dispatcher, count) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Demo failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "dispatch-core - Background work dispatcher v{}

USAGE:
    dispatch-core-cli [COMMAND] [OPTIONS]

COMMANDS:
    demo         Run a simulated terrain/entity workload (default)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    dispatch-core-cli                       # 24-job demo
    dispatch-core-cli demo 200              # 200-job demo
    dispatch-core-cli config show --json    # Effective config as JSON
    dispatch-core-cli config validate       # Validate configuration

ENVIRONMENT:
    DISPATCH_CONFIG_FILE         TOML config file
    DISPATCH_DRAIN_HZ            Drain ticks per second (default: 50)
    DISPATCH_WORKER_THREADS      Pool size, 0 = thread per request (default: 0)
    DISPATCH_DEFAULT_TIMEOUT_MS  Per-submission timeout, 0 = none (default: 0)
    DISPATCH_LOG_LEVEL           Log filter (default: info)
    DISPATCH_LOG_FORMAT          json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "demo" => {
            eprintln!(
                "dispatch-core-cli demo - Run a simulated workload

USAGE:
    dispatch-core-cli demo [COUNT]

DESCRIPTION:
    Submits COUNT jobs (default: {}) spread over every category and
    priority, cancels every seventh one, then drains results on the main
    thread at the configured rate. Prints a JSON report with the final
    dispatcher counters.
",
                DEFAULT_DEMO_COUNT
            );
        }
        "config" => {
            eprintln!(
                "dispatch-core-cli config - Inspect configuration

USAGE:
    dispatch-core-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show [--json]  Print effective configuration
    defaults       Print default values
    validate       Check for misconfiguration

EXIT CODES:
    0  Valid
    1  Warnings found
    2  Config file unreadable or malformed
"
            );
        }
        _ => {
            eprintln!("No detailed help for '{}'", command);
            print_usage();
        }
    }
}
