//! Structured logging infrastructure for WorkNet nodes.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use worknet_core::logging;
///
/// logging::init();
/// tracing::info!("Node started");
/// ```
pub fn init() {
    init_with_level("info");
}

/// Initialize logging, falling back to `default_level` when `RUST_LOG` is unset.
///
/// The node service passes the `log_level` from its configuration file here.
pub fn init_with_level(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for log collectors.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
///
/// # Example
/// ```no_run
/// use worknet_core::logging;
///
/// logging::init_json();
/// tracing::info!(node = "WorkNet-1a2b", "Node started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
