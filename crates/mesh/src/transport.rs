//! Seams to the radio and the uplink.
//!
//! The mesh layer gives broadcast delivery of text payloads; the uplink link
//! gives association with the access point plus the two HTTP exchanges with
//! the data sink. Both are implemented by the node service (UDP and HTTP) and
//! by in-memory doubles in tests.

use async_trait::async_trait;

use crate::error::MeshResult;

/// Broadcast text delivery to every reachable mesh node.
pub trait MeshTransport: Send {
    /// Queue `payload` for broadcast. Must not block.
    fn broadcast(&mut self, payload: &str) -> MeshResult<()>;

    /// Nodes currently visible on the mesh, including this one.
    fn node_count(&self) -> usize;
}

/// Link to the external data sink.
#[async_trait]
pub trait UplinkLink: Send {
    /// Associate with the access point.
    async fn connect(&mut self) -> MeshResult<()>;

    /// Drop the association.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Received signal strength in dBm while associated.
    fn signal_strength(&self) -> Option<i32>;

    /// Liveness request (GET) against the sink.
    async fn check_sink(&mut self) -> MeshResult<()>;

    /// Deliver a report body (POST).
    async fn post_report(&mut self, body: &str) -> MeshResult<()>;
}
