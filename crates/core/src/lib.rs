//! Core functionality for WorkNet wearable mesh nodes.
//!
//! This crate provides the configuration, error, logging and identity types
//! shared by the mesh protocol crate and the node service.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    CacheConfig, Config, ConfigError, ElectionConfig, MeshConfig, NodeConfig, RetryConfig,
    SensorEntry, SensorsConfig, StatusConfig, TimerConfig, UplinkConfig,
};
pub use error::{Error, Result};
pub use types::{format_mac, parse_mac, NodeId, NodeIdentity};
