//! Node Controller
//!
//! Owns one node's election machine, aggregate cache and uplink gateway, and
//! turns timer ticks and mesh payloads into protocol actions. All methods run
//! on the node's single event task; nothing here is shared across tasks.

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use worknet_core::{Config, NodeId, NodeIdentity};

use crate::aggregate::{AggregateCache, ChildRecord, StatusClassifier};
use crate::election::{
    ClaimOutcome, Election, ElectionState, HeartbeatOutcome, LocalDecision, Role,
};
use crate::message::MeshMessage;
use crate::report::NetworkReport;
use crate::sensor::{current_timestamp, SensorReadings, SensorSnapshot};
use crate::transport::{MeshTransport, UplinkLink};
use crate::uplink::{Eligibility, ProbeOutcome, SendOutcome, UplinkGateway};

/// What a dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Report delivered upstream
    Sent,
    /// Delivery failed within budget
    Failed,
    /// Backing off from an earlier failure; nothing was posted
    Deferred,
    /// Delivery budget exhausted; bridge role given up
    Demoted,
    /// Own readings broadcast on the mesh
    Relayed,
    /// Mesh broadcast failed
    RelayFailed,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub reports_sent: u64,
    pub reports_failed: u64,
    pub relays_sent: u64,
    pub messages_dropped: u64,
    pub demotions: u64,
}

/// Protocol driver for one node.
pub struct NodeController<M: MeshTransport, U: UplinkLink> {
    identity: NodeIdentity,
    election: Election,
    cache: AggregateCache,
    gateway: UplinkGateway<U>,
    mesh: M,
    local_snapshot: Option<SensorSnapshot>,
    rejoin_holdoff: Duration,
    stats: NodeStats,
}

impl<M: MeshTransport, U: UplinkLink> NodeController<M, U> {
    pub fn new(identity: NodeIdentity, config: &Config, mesh: M, link: U) -> Self {
        let election = Election::new(identity.node_id.clone(), &config.election);
        let cache = AggregateCache::new(
            StatusClassifier::from_config(&config.status),
            config.cache.child_ttl(),
        );
        let gateway = UplinkGateway::new(link, &config.uplink, &config.retry);

        Self {
            identity,
            election,
            cache,
            gateway,
            mesh,
            local_snapshot: None,
            rejoin_holdoff: config.election.bridge_timeout() * 2,
            stats: NodeStats::default(),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn node_id(&self) -> &NodeId {
        &self.identity.node_id
    }

    pub fn role(&self) -> Role {
        self.election.role()
    }

    pub fn election_state(&self) -> &ElectionState {
        self.election.state()
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub fn gateway(&self) -> &UplinkGateway<U> {
        &self.gateway
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Store the latest local reading.
    pub fn set_local_snapshot(&mut self, snapshot: SensorSnapshot) {
        self.local_snapshot = Some(snapshot);
    }

    /// Handle one payload received from the mesh. Bad payloads are logged and dropped.
    pub async fn on_message(&mut self, from: &str, payload: &str) {
        let message = match MeshMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(from, error = %e, "Dropping mesh message");
                self.stats.messages_dropped += 1;
                return;
            }
        };

        if message.node_id() == &self.identity.node_id {
            return;
        }
        debug!(from, message_type = message.message_type(), node_id = %message.node_id(), "Mesh message");

        match message {
            MeshMessage::ElectionClaim { node_id, signal } => {
                self.handle_claim(node_id, signal);
            }
            MeshMessage::BridgeHeartbeat { node_id } => {
                self.handle_heartbeat(node_id);
            }
            MeshMessage::SensorData {
                node_id,
                timestamp,
                data,
                mac,
            } => {
                self.handle_sensor_data(node_id, timestamp, data, mac).await;
            }
        }
    }

    /// Probe the uplink and contest the bridge role when it is worth it.
    pub async fn on_probe_tick(&mut self) -> ProbeOutcome {
        let outcome = self.gateway.probe().await;
        match outcome {
            ProbeOutcome::Deferred => {}
            ProbeOutcome::Reachable { signal } if !self.may_contest() => {
                debug!(signal, "Sink rejected recent reports, not contesting");
            }
            ProbeOutcome::Reachable { signal } => match self.election.on_local_reachable(signal) {
                LocalDecision::Contest => self.contest(signal).await,
                LocalDecision::AlreadyBridge | LocalDecision::Defer => {}
            },
            ProbeOutcome::Unreachable { exhausted } => {
                self.election.on_local_unreachable();
                if exhausted && self.election.is_bridge() {
                    self.demote("uplink unreachable");
                }
            }
        }
        outcome
    }

    /// Broadcast a heartbeat while bridge.
    pub fn on_heartbeat_tick(&mut self) {
        if self.election.is_bridge() {
            self.broadcast(&MeshMessage::heartbeat(self.identity.node_id.clone()));
        }
    }

    /// Periodic dispatch of the report (bridge) or own readings (others).
    pub async fn on_report_tick(&mut self) -> DispatchOutcome {
        self.dispatch().await
    }

    /// Vacate a silent bridge and evict stale children.
    pub fn on_liveness_tick(&mut self) {
        self.election.check_liveness(Instant::now());

        let evicted = self.cache.evict_stale(current_timestamp());
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted stale nodes from cache");
        }
    }

    /// Log the current mesh topology.
    pub fn on_topology_tick(&self) {
        let bridge = self
            .election
            .state()
            .current_bridge_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());

        info!(
            role = %self.role(),
            nodes = self.mesh.node_count(),
            bridge = %bridge,
            cached = self.cache.len(),
            "Topology"
        );
    }

    /// Send the report upstream when bridge, otherwise relay own readings.
    pub async fn dispatch(&mut self) -> DispatchOutcome {
        if !self.election.is_bridge() {
            return self.relay_local();
        }

        let children: Vec<ChildRecord> = self.cache.render();
        let report = NetworkReport::build(
            &self.identity,
            self.election.state(),
            &children,
            self.local_snapshot.as_ref(),
        );

        match self.gateway.send(&report).await {
            SendOutcome::Delivered => {
                self.stats.reports_sent += 1;
                DispatchOutcome::Sent
            }
            SendOutcome::Failed { delay } => {
                debug!(retry_in_ms = delay.as_millis() as u64, "Report will be retried on next dispatch");
                self.stats.reports_failed += 1;
                DispatchOutcome::Failed
            }
            SendOutcome::Deferred => DispatchOutcome::Deferred,
            SendOutcome::Exhausted => {
                self.stats.reports_failed += 1;
                self.demote("report delivery failed");
                DispatchOutcome::Demoted
            }
        }
    }

    /// A node whose reports were rejected leaves the role to others. It
    /// contests again only once no bridge has been heard for the holdoff.
    fn may_contest(&self) -> bool {
        match self.gateway.eligibility() {
            Eligibility::Eligible | Eligibility::Unreachable => true,
            Eligibility::Rejecting { since } => {
                self.election.is_bridge()
                    || (self.election.state().current_bridge_id.is_none()
                        && Instant::now() >= since + self.rejoin_holdoff)
            }
        }
    }

    async fn contest(&mut self, signal: i32) {
        if !self.gateway.acquire().await {
            self.election.abandon_candidacy();
            return;
        }

        if let Some(signal) = self.election.confirm_bridge(signal) {
            self.broadcast(&MeshMessage::claim(self.identity.node_id.clone(), signal));
        }
    }

    fn handle_claim(&mut self, claimant: NodeId, signal: i32) {
        match self.election.on_claim(claimant, signal, Instant::now()) {
            ClaimOutcome::Accepted { demoted: true } => {
                self.stats.demotions += 1;
                self.gateway.reset_send_budget();
            }
            ClaimOutcome::Rejected { reassert: true } => self.reassert(),
            ClaimOutcome::Accepted { demoted: false }
            | ClaimOutcome::Rejected { reassert: false }
            | ClaimOutcome::Ignored => {}
        }
    }

    fn handle_heartbeat(&mut self, sender: NodeId) {
        if self.election.on_heartbeat(sender, Instant::now()) == HeartbeatOutcome::Conflict {
            self.reassert();
        }
    }

    async fn handle_sensor_data(
        &mut self,
        node_id: NodeId,
        timestamp: u64,
        data: SensorReadings,
        mac: Option<String>,
    ) {
        let snapshot = SensorSnapshot::new(timestamp, data);
        let outcome = self
            .cache
            .update(node_id.clone(), mac.as_deref(), snapshot, current_timestamp());

        if !outcome.status_changed() {
            return;
        }

        info!(
            %node_id,
            status = %outcome.status,
            previous = ?outcome.previous,
            "Node status changed"
        );
        if self.election.is_bridge() {
            self.dispatch().await;
        }
    }

    fn reassert(&mut self) {
        let signal = self.election.state().best_signal;
        debug!(signal, "Re-asserting bridge claim");
        self.broadcast(&MeshMessage::claim(self.identity.node_id.clone(), signal));
    }

    fn demote(&mut self, reason: &str) {
        warn!(reason, "Giving up bridge role");
        self.election.demote();
        self.gateway.reset_send_budget();
        self.stats.demotions += 1;
    }

    fn relay_local(&mut self) -> DispatchOutcome {
        let snapshot = self
            .local_snapshot
            .clone()
            .unwrap_or_else(|| SensorSnapshot::new(current_timestamp(), SensorReadings::default()));
        let message =
            MeshMessage::sensor_data(self.identity.node_id.clone(), &self.identity.mac, &snapshot);

        if self.broadcast(&message) {
            self.stats.relays_sent += 1;
            DispatchOutcome::Relayed
        } else {
            DispatchOutcome::RelayFailed
        }
    }

    fn broadcast(&mut self, message: &MeshMessage) -> bool {
        let result = message
            .encode()
            .and_then(|payload| self.mesh.broadcast(&payload));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(message_type = message.message_type(), error = %e, "Mesh broadcast failed");
                false
            }
        }
    }
}
