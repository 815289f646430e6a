//! Logging init, grounded on the daemon binary's former inline
//! `init_logging` helper — pulled out into its own crate so both the
//! daemon and the CLI can share it.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global `tracing` subscriber. `default_directive` is used
/// only when `RUST_LOG` is unset, e.g. `"info,meridian=debug"`.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
