//! Mesh wire messages.
//!
//! Every payload is a JSON object with a `type` discriminator. Parsing goes
//! through a [`serde_json::Value`] first so an unknown `type` can be told
//! apart from a broken payload; both are dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use worknet_core::NodeId;

use crate::error::{MeshError, MeshResult};
use crate::sensor::{SensorReadings, SensorSnapshot};

/// Discriminators this node understands.
pub const KNOWN_TYPES: [&str; 3] = ["election_claim", "bridge_heartbeat", "sensor_data"];

/// Messages exchanged over the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshMessage {
    /// Sender claims the bridge role with its uplink signal (dBm)
    ElectionClaim { node_id: NodeId, signal: i32 },

    /// Periodic liveness signal from the bridge
    BridgeHeartbeat { node_id: NodeId },

    /// Latest sensor readings of the sender
    SensorData {
        node_id: NodeId,
        timestamp: u64,
        data: SensorReadings,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mac: Option<String>,
    },
}

impl MeshMessage {
    pub fn claim(node_id: NodeId, signal: i32) -> Self {
        MeshMessage::ElectionClaim { node_id, signal }
    }

    pub fn heartbeat(node_id: NodeId) -> Self {
        MeshMessage::BridgeHeartbeat { node_id }
    }

    /// Sensor report carrying the sender's MAC.
    pub fn sensor_data(node_id: NodeId, mac: &str, snapshot: &SensorSnapshot) -> Self {
        MeshMessage::SensorData {
            node_id,
            timestamp: snapshot.timestamp,
            data: snapshot.readings.clone(),
            mac: Some(mac.to_string()),
        }
    }

    /// Originating node.
    pub fn node_id(&self) -> &NodeId {
        match self {
            MeshMessage::ElectionClaim { node_id, .. }
            | MeshMessage::BridgeHeartbeat { node_id }
            | MeshMessage::SensorData { node_id, .. } => node_id,
        }
    }

    /// Wire discriminator.
    pub fn message_type(&self) -> &'static str {
        match self {
            MeshMessage::ElectionClaim { .. } => "election_claim",
            MeshMessage::BridgeHeartbeat { .. } => "bridge_heartbeat",
            MeshMessage::SensorData { .. } => "sensor_data",
        }
    }

    pub fn encode(&self) -> MeshResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a mesh payload.
    pub fn parse(payload: &str) -> MeshResult<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| MeshError::MalformedMessage(e.to_string()))?;

        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MeshError::MalformedMessage("missing type discriminator".to_string()))?;

        if !KNOWN_TYPES.contains(&message_type) {
            return Err(MeshError::UnknownMessageType {
                message_type: message_type.to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| MeshError::MalformedMessage(e.to_string()))
    }
}
