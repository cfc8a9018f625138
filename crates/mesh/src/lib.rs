//! WorkNet Mesh - Bridge Election and Data Aggregation
//!
//! Protocol layer run by every wearable node on the mesh. One node at a time
//! holds the uplink to the external data sink and forwards an aggregated
//! report of the whole network; every other node broadcasts its readings.
//!
//! # Core Components
//!
//! - **Election**: signal-strength bridge election with hysteresis and heartbeat liveness
//! - **Aggregate Cache**: latest readings and derived status of every node heard
//! - **Uplink Gateway**: bounded association, timeouts and retry budgets for the sink
//! - **Node Controller**: single-task driver turning ticks and messages into actions
//! - **Sensors**: driver polling with per-sensor intervals and re-initialization
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use worknet_core::{Config, NodeIdentity};
//! use worknet_mesh::{MeshTransport, MeshResult, NodeController, UplinkLink};
//!
//! # async fn run<M: MeshTransport, U: UplinkLink>(mesh: M, link: U) -> MeshResult<()> {
//! let config = Config::default();
//! let identity = NodeIdentity::from_mac([0x24, 0x6f, 0x28, 0xa1, 0x1a, 0x2b], "SafeHat");
//! let mut node = NodeController::new(identity, &config, mesh, link);
//!
//! node.on_probe_tick().await;
//! node.on_report_tick().await;
//! println!("Role: {}", node.role());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod election;
pub mod error;
pub mod message;
pub mod node;
pub mod report;
pub mod retry;
pub mod sensor;
pub mod transport;
pub mod uplink;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types
pub use aggregate::{AggregateCache, ChildRecord, ChildStatus, StatusClassifier, UpdateOutcome};
pub use election::{
    ClaimOutcome, Election, ElectionState, HeartbeatOutcome, LocalDecision, Role, SIGNAL_SENTINEL,
};
pub use error::{MeshError, MeshResult};
pub use message::MeshMessage;
pub use node::{DispatchOutcome, NodeController, NodeStats};
pub use report::{NetworkReport, RootStatus};
pub use retry::{RetryCounter, RetryState};
pub use sensor::{
    snapshot_channel, SensorDriver, SensorPoller, SensorReadings, SensorSnapshot,
    SnapshotPublisher, SnapshotReceiver, Vector3,
};
pub use transport::{MeshTransport, UplinkLink};
pub use uplink::{Eligibility, ProbeOutcome, SendOutcome, UplinkGateway};
