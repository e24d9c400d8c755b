//! CLI subcommands for the dispatcher binary.
//!
//! ## Usage
//!
//! ```bash
//! dispatch-core-cli demo 48          # Run a simulated terrain/entity workload
//! dispatch-core-cli config show      # Print effective configuration
//! dispatch-core-cli config validate  # Check configuration, exit 1 on warnings
//! ```

pub mod config_cmd;
pub mod demo_cmd;

pub use config_cmd::{run_defaults, run_show, run_validate};
pub use demo_cmd::{run_demo, DemoReport, DEFAULT_DEMO_COUNT};
