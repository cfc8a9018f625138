//! Sensor Aggregate Cache
//!
//! Latest state of every node heard on the mesh, keyed by node id, plus the
//! motion-based status classifier. Records are created on first contact and
//! overwritten afterwards; they are only removed when a child TTL is
//! configured.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use worknet_core::{NodeId, StatusConfig};

use crate::sensor::SensorSnapshot;

/// Derived health of a child node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChildStatus {
    Online,
    Warning,
    Alert,
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChildStatus::Online => "Online",
            ChildStatus::Warning => "Warning",
            ChildStatus::Alert => "Alert",
        };
        f.write_str(s)
    }
}

/// Latest known state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub node_id: NodeId,
    pub status: ChildStatus,
    pub mac: String,
    /// Unix milliseconds of the last message from this node
    pub last_seen: u64,
    pub snapshot: Option<SensorSnapshot>,
}

/// Maps acceleration excursions to a status.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    warning_accel: f32,
    alert_accel: f32,
}

impl StatusClassifier {
    pub fn new(warning_accel: f32, alert_accel: f32) -> Self {
        Self {
            warning_accel,
            alert_accel,
        }
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        Self::new(config.warning_accel, config.alert_accel)
    }

    /// Classify by the largest accelerometer axis magnitude.
    pub fn classify(&self, snapshot: &SensorSnapshot) -> ChildStatus {
        let peak = match snapshot.readings.accel {
            Some(accel) => accel.max_abs(),
            None => return ChildStatus::Online,
        };

        if peak > self.alert_accel {
            ChildStatus::Alert
        } else if peak > self.warning_accel {
            ChildStatus::Warning
        } else {
            ChildStatus::Online
        }
    }
}

/// Result of folding one message into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub status: ChildStatus,
    /// Status before this update; `None` for a first contact
    pub previous: Option<ChildStatus>,
}

impl UpdateOutcome {
    /// Whether the status moved (a new node counts only if it is not `Online`).
    pub fn status_changed(&self) -> bool {
        match self.previous {
            Some(previous) => previous != self.status,
            None => self.status != ChildStatus::Online,
        }
    }
}

/// Per-node latest-state store.
#[derive(Debug)]
pub struct AggregateCache {
    records: HashMap<NodeId, ChildRecord>,
    classifier: StatusClassifier,
    child_ttl: Option<Duration>,
}

impl AggregateCache {
    /// Create a cache; `child_ttl = None` keeps records forever.
    pub fn new(classifier: StatusClassifier, child_ttl: Option<Duration>) -> Self {
        Self {
            records: HashMap::new(),
            classifier,
            child_ttl,
        }
    }

    /// Insert or overwrite the record for `node_id` and re-derive its status.
    pub fn update(
        &mut self,
        node_id: NodeId,
        mac: Option<&str>,
        snapshot: SensorSnapshot,
        now_ms: u64,
    ) -> UpdateOutcome {
        let status = self.classifier.classify(&snapshot);

        match self.records.get_mut(&node_id) {
            Some(record) => {
                let previous = record.status;
                record.status = status;
                record.last_seen = now_ms;
                record.snapshot = Some(snapshot);
                if let Some(mac) = mac {
                    record.mac = mac.to_string();
                }
                UpdateOutcome {
                    status,
                    previous: Some(previous),
                }
            }
            None => {
                self.records.insert(
                    node_id.clone(),
                    ChildRecord {
                        node_id,
                        status,
                        mac: mac.unwrap_or_default().to_string(),
                        last_seen: now_ms,
                        snapshot: Some(snapshot),
                    },
                );
                UpdateOutcome {
                    status,
                    previous: None,
                }
            }
        }
    }

    /// Records ordered by node id.
    pub fn render(&self) -> Vec<ChildRecord> {
        let mut records: Vec<ChildRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&ChildRecord> {
        self.records.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove records older than the configured TTL. No-op without a TTL.
    pub fn evict_stale(&mut self, now_ms: u64) -> Vec<NodeId> {
        let ttl_ms = match self.child_ttl {
            Some(ttl) => ttl.as_millis() as u64,
            None => return Vec::new(),
        };

        let stale: Vec<NodeId> = self
            .records
            .values()
            .filter(|r| now_ms.saturating_sub(r.last_seen) > ttl_ms)
            .map(|r| r.node_id.clone())
            .collect();
        for node_id in &stale {
            self.records.remove(node_id);
        }
        stale
    }
}
