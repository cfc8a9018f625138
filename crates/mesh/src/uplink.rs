//! Uplink Gateway
//!
//! Wraps an [`UplinkLink`] with bounded association attempts, per-request
//! timeouts and two independent retry budgets: one for reachability probes,
//! one for report delivery. Each budget backs off between attempts. Exhausting
//! either one costs the node its bridge eligibility (see [`Eligibility`]).

use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};
use worknet_core::{RetryConfig, UplinkConfig};

use crate::error::{MeshError, MeshResult};
use crate::report::NetworkReport;
use crate::retry::{RetryCounter, RetryState};
use crate::transport::UplinkLink;

/// Result of a reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Sink answered; `signal` is the link RSSI in dBm
    Reachable { signal: i32 },
    /// Probe failed; `exhausted` once the probe budget is spent
    Unreachable { exhausted: bool },
    /// Still backing off from an earlier failure
    Deferred,
}

/// Result of a report delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Counted failure, still within budget
    Failed { delay: Duration },
    /// Still backing off from an earlier failure; nothing was posted
    Deferred,
    /// Budget exceeded; the caller should give up the bridge role
    Exhausted,
}

/// Whether this node may take the bridge role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Probe budget spent; restored by the next reachable probe
    Unreachable,
    /// Delivery budget spent at `since`. The sink may still answer probes,
    /// so only a delivered report restores eligibility.
    Rejecting { since: Instant },
}

/// Retrying front for the uplink link.
pub struct UplinkGateway<U: UplinkLink> {
    link: U,
    probe_retry: RetryCounter,
    send_retry: RetryCounter,
    connect_attempts: u32,
    connect_timeout: Duration,
    request_timeout: Duration,
    fallback_signal: i32,
    next_probe_at: Option<Instant>,
    next_send_at: Option<Instant>,
    eligibility: Eligibility,
}

impl<U: UplinkLink> UplinkGateway<U> {
    pub fn new(link: U, uplink: &UplinkConfig, retry: &RetryConfig) -> Self {
        Self {
            link,
            probe_retry: RetryCounter::from_config(retry),
            send_retry: RetryCounter::from_config(retry),
            connect_attempts: uplink.connect_attempts,
            connect_timeout: uplink.connect_timeout(),
            request_timeout: uplink.request_timeout(),
            fallback_signal: uplink.signal_dbm,
            next_probe_at: None,
            next_send_at: None,
            eligibility: Eligibility::Eligible,
        }
    }

    /// Check that the sink answers, associating first if needed.
    pub async fn probe(&mut self) -> ProbeOutcome {
        let now = Instant::now();
        if matches!(self.next_probe_at, Some(at) if now < at) {
            return ProbeOutcome::Deferred;
        }

        match self.try_probe().await {
            Ok(signal) => {
                self.probe_retry.record_success();
                self.next_probe_at = None;
                if self.eligibility == Eligibility::Unreachable {
                    self.eligibility = Eligibility::Eligible;
                }
                debug!(signal, "Uplink reachable");
                ProbeOutcome::Reachable { signal }
            }
            Err(e) => match self.probe_retry.record_failure() {
                RetryState::Retry { delay } => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Uplink probe failed");
                    self.next_probe_at = Some(now + delay);
                    ProbeOutcome::Unreachable { exhausted: false }
                }
                RetryState::Exhausted => {
                    warn!(
                        error = %e,
                        failures = self.probe_retry.consecutive_failures(),
                        "Uplink unreachable, probe budget exhausted"
                    );
                    self.probe_retry.restart();
                    self.next_probe_at = None;
                    if self.eligibility == Eligibility::Eligible {
                        self.eligibility = Eligibility::Unreachable;
                    }
                    ProbeOutcome::Unreachable { exhausted: true }
                }
            },
        }
    }

    /// Make sure the link is associated before taking the bridge role.
    pub async fn acquire(&mut self) -> bool {
        match self.ensure_connected().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to acquire uplink");
                false
            }
        }
    }

    /// Post a report, reconnecting once if the link dropped.
    ///
    /// Inside the backoff window of an earlier failure nothing is posted and
    /// the budget is left untouched.
    pub async fn send(&mut self, report: &NetworkReport) -> SendOutcome {
        if matches!(self.next_send_at, Some(at) if Instant::now() < at) {
            debug!("Report delivery backing off");
            return SendOutcome::Deferred;
        }

        let body = match report.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode network report");
                return self.count_send_failure();
            }
        };

        let error = match self.post(&body).await {
            Ok(()) => return self.delivered(report),
            Err(e) => e,
        };

        if !self.link.is_connected() {
            debug!(error = %error, "Uplink dropped during send, reconnecting");
            if self.ensure_connected().await.is_ok() && self.post(&body).await.is_ok() {
                return self.delivered(report);
            }
        }

        warn!(error = %error, "Failed to send network report");
        self.count_send_failure()
    }

    /// Start a fresh delivery budget, e.g. after losing the bridge role.
    pub fn reset_send_budget(&mut self) {
        self.send_retry.restart();
        self.next_send_at = None;
    }

    pub fn eligibility(&self) -> Eligibility {
        self.eligibility
    }

    pub fn is_bridge_eligible(&self) -> bool {
        self.eligibility == Eligibility::Eligible
    }

    pub fn send_failures(&self) -> u32 {
        self.send_retry.consecutive_failures()
    }

    pub fn probe_failures(&self) -> u32 {
        self.probe_retry.consecutive_failures()
    }

    pub fn link(&self) -> &U {
        &self.link
    }

    async fn try_probe(&mut self) -> MeshResult<i32> {
        self.ensure_connected().await?;
        timeout(self.request_timeout, self.link.check_sink())
            .await
            .map_err(|_| MeshError::Timeout("sink liveness request".to_string()))??;
        Ok(self.link.signal_strength().unwrap_or(self.fallback_signal))
    }

    async fn post(&mut self, body: &str) -> MeshResult<()> {
        timeout(self.request_timeout, self.link.post_report(body))
            .await
            .map_err(|_| MeshError::Timeout("report delivery".to_string()))?
    }

    async fn ensure_connected(&mut self) -> MeshResult<()> {
        if self.link.is_connected() {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 1..=self.connect_attempts {
            match timeout(self.connect_timeout, self.link.connect()).await {
                Ok(Ok(())) => {
                    info!(attempt, "Uplink associated");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    debug!(attempt, error = %e, "Uplink association failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!(attempt, "Uplink association timed out");
                    self.link.disconnect().await;
                    last_error = Some(MeshError::Timeout(format!(
                        "uplink association attempt {}",
                        attempt
                    )));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| MeshError::Uplink("no association attempts configured".to_string())))
    }

    fn delivered(&mut self, report: &NetworkReport) -> SendOutcome {
        self.send_retry.record_success();
        self.next_send_at = None;
        self.eligibility = Eligibility::Eligible;
        debug!(children = report.child_count(), "Network report delivered");
        SendOutcome::Delivered
    }

    fn count_send_failure(&mut self) -> SendOutcome {
        match self.send_retry.record_failure() {
            RetryState::Retry { delay } => {
                self.next_send_at = Some(Instant::now() + delay);
                SendOutcome::Failed { delay }
            }
            RetryState::Exhausted => {
                warn!(
                    failures = self.send_retry.consecutive_failures(),
                    "Report delivery budget exhausted"
                );
                self.send_retry.restart();
                self.next_send_at = None;
                self.eligibility = Eligibility::Rejecting {
                    since: Instant::now(),
                };
                SendOutcome::Exhausted
            }
        }
    }
}
