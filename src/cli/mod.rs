//! # CLI Module
//!
//! Command-line front end for the `minicoap` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Serve the `/temp` resource over UDP:
//!
//! ```bash
//! minicoap serve --addr 0.0.0.0:5683
//! minicoap serve --config minicoap.yaml --thermal-zone /sys/class/thermal/thermal_zone1/temp
//! minicoap serve --fixed-reading 42.5
//! ```
//!
//! Options:
//! - `--addr <ADDR>` - UDP address to bind, overrides the config file
//! - `--config <FILE>` - YAML server configuration
//! - `--thermal-zone <PATH>` - sysfs file read by `/temp` (default: thermal_zone0)
//! - `--fixed-reading <VALUE>` - serve a constant instead of a sensor
//!
//! `MINICOAP_*` variables are applied on top of the file. Logging follows
//! `MINICOAP_LOG_*` and `RUST_LOG`. SIGINT or SIGTERM stops the server.
//!
//! ### `get`
//!
//! One confirmable GET, printing the response code and payload:
//!
//! ```bash
//! minicoap get --addr 127.0.0.1:5683 --path /temp
//! ```

mod commands;


pub use commands::{get, run_cli, Cli, Commands};
