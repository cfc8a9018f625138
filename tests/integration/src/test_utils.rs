//! Test utilities for multi-node integration tests
//!
//! [`SimNetwork`] wires several [`NodeController`]s to a shared in-memory
//! broadcast bus. Every broadcast lands in every inbox, the sender's own
//! included, and is delivered only when the test calls
//! [`SimNetwork::deliver_all`], so interleavings are explicit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::EnvFilter;
use worknet_core::{Config, NodeId, NodeIdentity};
use worknet_mesh::testing::MockUplink;
use worknet_mesh::{DispatchOutcome, MeshResult, MeshTransport, NodeController, Role};

/// Delivery rounds before a mesh is considered to be oscillating.
const MAX_ROUNDS: usize = 64;

/// Install a test log writer; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Configuration with short timers for simulated runs.
pub fn sim_config() -> Config {
    let mut config = Config::default();
    config.uplink.connect_attempts = 2;
    config.uplink.connect_timeout_ms = 100;
    config.uplink.request_timeout_ms = 100;
    config.election.hysteresis_db = 5;
    config.election.heartbeat_interval_ms = 1000;
    config.election.bridge_timeout_ms = 4000;
    config.retry.allowed_failures = 3;
    config.retry.min_interval_ms = 100;
    config.retry.max_interval_ms = 800;
    config
}

#[derive(Debug, Default)]
struct BusState {
    inboxes: Vec<VecDeque<String>>,
}

type SharedBus = Arc<Mutex<BusState>>;

fn lock(bus: &SharedBus) -> MutexGuard<'_, BusState> {
    bus.lock().unwrap_or_else(|e| e.into_inner())
}

/// One node's attachment to the shared bus.
pub struct BusTransport {
    bus: SharedBus,
}

impl MeshTransport for BusTransport {
    fn broadcast(&mut self, payload: &str) -> MeshResult<()> {
        for inbox in lock(&self.bus).inboxes.iter_mut() {
            inbox.push_back(payload.to_string());
        }
        Ok(())
    }

    fn node_count(&self) -> usize {
        lock(&self.bus).inboxes.len()
    }
}

pub type SimNode = NodeController<BusTransport, MockUplink>;

/// Simulated mesh of nodes with scripted uplinks.
pub struct SimNetwork {
    config: Config,
    bus: SharedBus,
    nodes: Vec<SimNode>,
    links: Vec<MockUplink>,
}

impl SimNetwork {
    pub fn new(config: Config) -> Self {
        init_tracing();
        Self {
            config,
            bus: SharedBus::default(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Add a node whose uplink answers with `signal` dBm.
    pub fn add_node(&mut self, id: &str, signal: i32) {
        self.attach(id, MockUplink::new(signal));
    }

    /// Add a node that cannot reach the sink.
    pub fn add_offline_node(&mut self, id: &str) {
        self.attach(id, MockUplink::offline());
    }

    fn attach(&mut self, id: &str, link: MockUplink) {
        let index = self.nodes.len();
        lock(&self.bus).inboxes.push(VecDeque::new());

        let identity = NodeIdentity {
            chip_id: index as u32,
            node_id: NodeId::from(id),
            name: format!("SafeHat-{}", id),
            mac: format!("02:00:00:00:00:{:02x}", index),
        };
        let transport = BusTransport {
            bus: self.bus.clone(),
        };
        self.nodes.push(NodeController::new(
            identity,
            &self.config,
            transport,
            link.clone(),
        ));
        self.links.push(link);
    }

    fn index(&self, id: &str) -> usize {
        self.nodes
            .iter()
            .position(|n| n.node_id().as_str() == id)
            .unwrap_or_else(|| panic!("no node {id} in simulation"))
    }

    pub fn node(&self, id: &str) -> &SimNode {
        &self.nodes[self.index(id)]
    }

    pub fn node_mut(&mut self, id: &str) -> &mut SimNode {
        let index = self.index(id);
        &mut self.nodes[index]
    }

    pub fn link(&self, id: &str) -> &MockUplink {
        &self.links[self.index(id)]
    }

    pub fn role(&self, id: &str) -> Role {
        self.node(id).role()
    }

    pub async fn probe(&mut self, id: &str) {
        self.node_mut(id).on_probe_tick().await;
    }

    /// Probe every node before any message is delivered.
    pub async fn probe_all(&mut self) {
        for node in &mut self.nodes {
            node.on_probe_tick().await;
        }
    }

    pub fn heartbeat_all(&mut self) {
        for node in &mut self.nodes {
            node.on_heartbeat_tick();
        }
    }

    pub fn liveness_all(&mut self) {
        for node in &mut self.nodes {
            node.on_liveness_tick();
        }
    }

    pub async fn dispatch(&mut self, id: &str) -> DispatchOutcome {
        self.node_mut(id).dispatch().await
    }

    /// Dispatch on `id` once a second until its delivery budget runs out.
    pub async fn dispatch_until_demoted(&mut self, id: &str) {
        for _ in 0..MAX_ROUNDS {
            tokio::time::advance(tokio::time::Duration::from_secs(1)).await;
            if self.dispatch(id).await == DispatchOutcome::Demoted {
                return;
            }
        }
        panic!("{id} was never demoted");
    }

    /// Dispatch on every node in insertion order.
    pub async fn dispatch_all(&mut self) {
        for node in &mut self.nodes {
            node.dispatch().await;
        }
    }

    /// Deliver queued broadcasts until the mesh is quiet. Returns the count delivered.
    pub async fn deliver_all(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            let mut delivered = 0;
            for index in 0..self.nodes.len() {
                let pending: Vec<String> = lock(&self.bus).inboxes[index].drain(..).collect();
                let from = format!("bus-{}", index);
                for payload in pending {
                    self.nodes[index].on_message(&from, &payload).await;
                    delivered += 1;
                }
            }
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
        panic!("mesh did not quiesce after {MAX_ROUNDS} rounds");
    }

    /// Ids of nodes that currently consider themselves bridge.
    pub fn bridges(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.role() == Role::Bridge)
            .map(|n| n.node_id().clone())
            .collect()
    }

    /// The bridge every node records, if they all agree.
    pub fn agreed_bridge(&self) -> Option<NodeId> {
        let first = self.nodes.first()?.election_state().current_bridge_id.clone();
        self.nodes
            .iter()
            .all(|n| n.election_state().current_bridge_id == first)
            .then_some(first)
            .flatten()
    }
}
