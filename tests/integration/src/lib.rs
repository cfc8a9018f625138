//! Multi-node integration tests for the WorkNet mesh
//!
//! This test suite runs several node controllers over an in-memory mesh and
//! validates:
//! - Bridge election convergence (signal strength, lowest-id tie-break)
//! - Late joiners and heartbeat liveness
//! - Bridge failover after sustained uplink failure
//! - Aggregated reporting and immediate dispatch on status change

pub mod test_utils;

#[cfg(test)]
mod election_convergence_tests;

#[cfg(test)]
mod failover_tests;

#[cfg(test)]
mod aggregation_tests;
