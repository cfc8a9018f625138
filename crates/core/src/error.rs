//! Core error types

use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for WorkNet
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed hardware address
    #[error("Invalid hardware address: {0}")]
    InvalidMac(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
