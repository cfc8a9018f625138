//! Error types for WorkNet mesh operations.
//!
//! None of these are fatal to a node: transport failures feed the retry
//! counters, malformed messages are dropped, and sensor failures disable the
//! sensor until it re-initializes.

use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Mesh broadcast could not be queued
    #[error("Mesh transport error: {0}")]
    Transport(String),

    /// Uplink link-layer or request failure
    #[error("Uplink error: {0}")]
    Uplink(String),

    /// Sink answered with a non-success status
    #[error("Sink rejected request with status {status}")]
    SinkStatus { status: u16 },

    /// Payload did not match the wire schema
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Payload carried a `type` this node does not handle
    #[error("Unknown message type: {message_type}")]
    UnknownMessageType { message_type: String },

    /// Sensor driver failure
    #[error("Sensor {sensor} failed: {reason}")]
    Sensor { sensor: String, reason: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
