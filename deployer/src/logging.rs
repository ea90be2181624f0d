//! Diagnostic tracing for deployer operations.
//!
//! Every remote operation emits `tracing` spans and events; this module only
//! decides where they go. Library callers install their own subscriber, the
//! CLI calls [`init`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for the CLI.
///
/// `RUST_LOG` wins when set. Otherwise `verbosity` picks the default level:
/// 0 → `warn`, 1 → `info`, 2+ → `debug`. Output goes to stderr in compact
/// format so stdout stays clean for command results.
///
/// # Example
/// ```bash
/// RUST_LOG=deployer=debug deployer service deploy worker
/// ```
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
