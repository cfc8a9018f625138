//! Aggregated network report posted by the bridge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worknet_core::{NodeId, NodeIdentity};

use crate::aggregate::{ChildRecord, ChildStatus};
use crate::election::ElectionState;
use crate::error::MeshResult;
use crate::sensor::SensorSnapshot;

/// Uplink state of the reporting bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootStatus {
    Online,
    Offline,
}

/// Body of the uplink POST.
///
/// The three `children-*` arrays are index-aligned and never include the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkReport {
    pub root_id: NodeId,
    pub root_status: RootStatus,
    pub root_mac: String,
    pub children_ids: Vec<NodeId>,
    pub children_status: Vec<ChildStatus>,
    pub children_macs: Vec<String>,
    pub sensor_data: BTreeMap<NodeId, SensorSnapshot>,
}

impl NetworkReport {
    /// Assemble a report from the bridge's view of the mesh.
    ///
    /// `children` is expected in render order; `own_snapshot` is the bridge's
    /// latest local reading.
    pub fn build(
        identity: &NodeIdentity,
        election: &ElectionState,
        children: &[ChildRecord],
        own_snapshot: Option<&SensorSnapshot>,
    ) -> Self {
        let root_status = if election.server_reachable {
            RootStatus::Online
        } else {
            RootStatus::Offline
        };

        let mut report = Self {
            root_id: identity.node_id.clone(),
            root_status,
            root_mac: identity.mac.clone(),
            children_ids: Vec::with_capacity(children.len()),
            children_status: Vec::with_capacity(children.len()),
            children_macs: Vec::with_capacity(children.len()),
            sensor_data: BTreeMap::new(),
        };

        for child in children.iter().filter(|c| c.node_id != identity.node_id) {
            report.children_ids.push(child.node_id.clone());
            report.children_status.push(child.status);
            report.children_macs.push(child.mac.clone());
            if let Some(snapshot) = &child.snapshot {
                report
                    .sensor_data
                    .insert(child.node_id.clone(), snapshot.clone());
            }
        }

        if let Some(snapshot) = own_snapshot {
            report
                .sensor_data
                .insert(identity.node_id.clone(), snapshot.clone());
        }

        report
    }

    pub fn child_count(&self) -> usize {
        self.children_ids.len()
    }

    pub fn to_json(&self) -> MeshResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
