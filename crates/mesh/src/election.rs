//! Bridge Election State Machine
//!
//! Each node runs this machine independently. Claims carry the claimant's
//! uplink signal; the best signal wins and equal signals go to the lowest
//! [`NodeId`]. Heartbeats only prove liveness of an already-recorded bridge.
//! Agreement is best-effort: two nodes may both be bridge for a short window,
//! and the rejecting bridge re-broadcasts its claim so the weaker one demotes.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};
use worknet_core::{ElectionConfig, NodeId};

/// Signal recorded when no bridge is known.
pub const SIGNAL_SENTINEL: i32 = -1000;

/// Role of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Not contending for the uplink
    Idle,
    /// Uplink reachable and contesting; acquiring the link
    BridgeCandidate,
    /// Confirmed bridge, forwarding reports upstream
    Bridge,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Idle => "NODE",
            Role::BridgeCandidate => "CANDIDATE",
            Role::Bridge => "BRIDGE",
        };
        f.write_str(s)
    }
}

/// Election view of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionState {
    pub role: Role,
    pub best_signal: i32,
    pub current_bridge_id: Option<NodeId>,
    pub server_reachable: bool,
}

impl Default for ElectionState {
    fn default() -> Self {
        Self {
            role: Role::Idle,
            best_signal: SIGNAL_SENTINEL,
            current_bridge_id: None,
            server_reachable: false,
        }
    }
}

/// What the node should do after a successful reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDecision {
    /// Contest the role: acquire the uplink, then confirm
    Contest,
    /// Already bridge; nothing to announce
    AlreadyBridge,
    /// Recorded bridge is as good or better
    Defer,
}

/// Result of handling a peer's claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Claimant recorded as bridge
    Accepted {
        /// Local node gave up the bridge role
        demoted: bool,
    },
    /// Claim was not better than the incumbent
    Rejected {
        /// Local node is bridge and should re-broadcast its own claim
        reassert: bool,
    },
    /// Echo of our own claim
    Ignored,
}

/// Result of handling a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Heartbeat from the recorded bridge
    Refreshed,
    /// No bridge was recorded; sender adopted
    Adopted,
    /// Local node is bridge and another node claims to be; re-assert
    Conflict,
    /// Heartbeat from a non-recorded node while a bridge is known
    Ignored,
}

/// Per-node election state machine.
#[derive(Debug)]
pub struct Election {
    self_id: NodeId,
    state: ElectionState,
    hysteresis: i32,
    bridge_timeout: Duration,
    last_bridge_contact: Option<Instant>,
}

impl Election {
    pub fn new(self_id: NodeId, config: &ElectionConfig) -> Self {
        Self {
            self_id,
            state: ElectionState::default(),
            hysteresis: config.hysteresis_db,
            bridge_timeout: config.bridge_timeout(),
            last_bridge_contact: None,
        }
    }

    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    pub fn role(&self) -> Role {
        self.state.role
    }

    pub fn is_bridge(&self) -> bool {
        self.state.role == Role::Bridge
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// React to a successful local reachability probe.
    pub fn on_local_reachable(&mut self, local_signal: i32) -> LocalDecision {
        if self.state.role == Role::Bridge {
            self.state.server_reachable = true;
            return LocalDecision::AlreadyBridge;
        }

        let contest = match &self.state.current_bridge_id {
            None => true,
            Some(bridge) if *bridge == self.self_id => true,
            Some(_) => {
                i64::from(local_signal) - i64::from(self.state.best_signal)
                    >= i64::from(self.hysteresis)
            }
        };

        if contest {
            debug!(
                local_signal,
                best_signal = self.state.best_signal,
                "Contesting bridge role"
            );
            self.state.role = Role::BridgeCandidate;
            LocalDecision::Contest
        } else {
            LocalDecision::Defer
        }
    }

    /// Uplink acquired while candidate: take the role. Returns the signal to claim with.
    ///
    /// Returns `None` when a better claim arrived during acquisition.
    pub fn confirm_bridge(&mut self, local_signal: i32) -> Option<i32> {
        if self.state.role != Role::BridgeCandidate {
            return None;
        }

        self.state.role = Role::Bridge;
        self.state.current_bridge_id = Some(self.self_id.clone());
        self.state.best_signal = local_signal;
        self.state.server_reachable = true;
        info!(signal = local_signal, "Became bridge");
        Some(local_signal)
    }

    /// Uplink acquisition failed while candidate.
    pub fn abandon_candidacy(&mut self) {
        if self.state.role == Role::BridgeCandidate {
            self.state.role = Role::Idle;
        }
    }

    /// A reachability probe failed.
    pub fn on_local_unreachable(&mut self) {
        self.state.server_reachable = false;
        self.abandon_candidacy();
    }

    /// Handle an election claim from `claimant`.
    pub fn on_claim(&mut self, claimant: NodeId, signal: i32, now: Instant) -> ClaimOutcome {
        if claimant == self.self_id {
            return ClaimOutcome::Ignored;
        }

        if self.state.current_bridge_id.as_ref() == Some(&claimant) {
            self.last_bridge_contact = Some(now);
        }

        if !self.claim_wins(&claimant, signal) {
            debug!(%claimant, signal, best_signal = self.state.best_signal, "Rejected claim");
            return ClaimOutcome::Rejected {
                reassert: self.is_bridge(),
            };
        }

        let demoted = self.is_bridge();
        self.state.best_signal = signal;
        self.state.current_bridge_id = Some(claimant.clone());
        self.last_bridge_contact = Some(now);

        if self.state.role != Role::Idle {
            self.state.role = Role::Idle;
            self.state.server_reachable = false;
        }

        if demoted {
            info!(%claimant, signal, "Yielding bridge role to better claim");
        } else {
            debug!(%claimant, signal, "Accepted claim");
        }
        ClaimOutcome::Accepted { demoted }
    }

    /// Handle a heartbeat from `sender`.
    pub fn on_heartbeat(&mut self, sender: NodeId, now: Instant) -> HeartbeatOutcome {
        if sender == self.self_id {
            return HeartbeatOutcome::Ignored;
        }

        match &self.state.current_bridge_id {
            Some(bridge) if *bridge == sender => {
                self.last_bridge_contact = Some(now);
                HeartbeatOutcome::Refreshed
            }
            None => {
                debug!(%sender, "Adopting bridge from heartbeat");
                self.state.current_bridge_id = Some(sender);
                self.last_bridge_contact = Some(now);
                HeartbeatOutcome::Adopted
            }
            Some(_) if self.is_bridge() => HeartbeatOutcome::Conflict,
            Some(_) => HeartbeatOutcome::Ignored,
        }
    }

    /// Vacate a remote bridge that has been silent past the timeout.
    ///
    /// Returns true when the recorded bridge was cleared.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        let bridge = match &self.state.current_bridge_id {
            Some(bridge) if *bridge != self.self_id => bridge.clone(),
            _ => return false,
        };

        let silent_for = match self.last_bridge_contact {
            Some(last) => now.saturating_duration_since(last),
            None => self.bridge_timeout + Duration::from_millis(1),
        };
        if silent_for <= self.bridge_timeout {
            return false;
        }

        info!(%bridge, silent_ms = silent_for.as_millis() as u64, "Bridge heartbeat lost, role vacant");
        self.clear_bridge();
        true
    }

    /// Give up the bridge role after sustained uplink failure.
    pub fn demote(&mut self) {
        self.state.role = Role::Idle;
        self.state.server_reachable = false;
        self.clear_bridge();
    }

    fn clear_bridge(&mut self) {
        self.state.current_bridge_id = None;
        self.state.best_signal = SIGNAL_SENTINEL;
        self.last_bridge_contact = None;
    }

    /// Better signal wins; equal signal goes to the lower id of claimant and incumbent.
    fn claim_wins(&self, claimant: &NodeId, signal: i32) -> bool {
        if signal != self.state.best_signal {
            return signal > self.state.best_signal;
        }
        let incumbent = self
            .state
            .current_bridge_id
            .as_ref()
            .unwrap_or(&self.self_id);
        claimant < incumbent
    }
}
