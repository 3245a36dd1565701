//! Structured logging setup. The engine crate this service is modeled on
//! logs through its own domain-event `Logger` trait; a standalone service
//! has no such domain-event bus, so initialization instead follows the
//! plain `tracing_subscriber::fmt::init()` call each of the pack's server
//! binaries makes at the top of `main`, configured for JSON output (the
//! `json` feature already carried in Cargo.toml) and filterable via
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
