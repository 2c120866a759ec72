//! # veil-cli: Veil Command-Line Tool
//!
//! ## Subcommands
//!
//! - `simulate`: run one batch round in-process with concurrent operators
//! - `select-committee`: recompute a committee from its seed inputs
//! - `verify-log`: check the hash chain of an exported event log
//!
//! Argument structs live next to their handlers. Output is JSON on stdout;
//! diagnostics go through `tracing` on stderr.

pub mod audit;
pub mod config;
pub mod simulate;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` controls the filter, `warn`
/// when unset.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
