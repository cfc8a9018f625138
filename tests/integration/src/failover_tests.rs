//! Bridge demotion, liveness timeout and takeover.

use crate::test_utils::{sim_config, SimNetwork};
use tokio::time::Duration;
use worknet_core::NodeId;
use worknet_mesh::{
    DispatchOutcome, ProbeOutcome, Role, SensorReadings, SensorSnapshot, Vector3, SIGNAL_SENTINEL,
};

async fn converged(a: i32, b: i32) -> SimNetwork {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", a);
    net.add_node("B", b);
    net.probe_all().await;
    net.deliver_all().await;
    net
}

#[tokio::test(start_paused = true)]
async fn test_bridge_demotes_after_exhausted_sends() {
    let mut net = converged(-40, -60).await;
    net.link("A").script().fail_posts = 4;

    for _ in 0..3 {
        assert_eq!(net.dispatch("A").await, DispatchOutcome::Failed);
        assert_eq!(net.role("A"), Role::Bridge);
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    assert_eq!(net.dispatch("A").await, DispatchOutcome::Demoted);

    let state = net.node("A").election_state();
    assert_eq!(state.role, Role::Idle);
    assert!(!state.server_reachable);
    assert_eq!(state.current_bridge_id, None);
    assert_eq!(state.best_signal, SIGNAL_SENTINEL);
    assert!(net.bridges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_success_resets_send_budget() {
    let mut net = converged(-40, -60).await;
    net.link("A").script().fail_posts = 3;

    for _ in 0..3 {
        assert_eq!(net.dispatch("A").await, DispatchOutcome::Failed);
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    assert_eq!(net.dispatch("A").await, DispatchOutcome::Sent);
    assert_eq!(net.node("A").gateway().send_failures(), 0);

    net.link("A").script().fail_posts = 3;
    for _ in 0..3 {
        assert_eq!(net.dispatch("A").await, DispatchOutcome::Failed);
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    assert_eq!(net.role("A"), Role::Bridge);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_bridge_alive() {
    let mut net = converged(-40, -60).await;

    for _ in 0..10 {
        tokio::time::advance(Duration::from_millis(1000)).await;
        net.heartbeat_all();
        net.deliver_all().await;
        net.liveness_all();
    }
    assert_eq!(
        net.node("B").election_state().current_bridge_id,
        Some(NodeId::from("A"))
    );

    tokio::time::advance(Duration::from_millis(4500)).await;
    net.liveness_all();
    assert_eq!(net.node("B").election_state().current_bridge_id, None);
    assert_eq!(net.node("B").election_state().best_signal, SIGNAL_SENTINEL);
}

#[tokio::test(start_paused = true)]
async fn test_follower_takes_over_after_bridge_uplink_loss() {
    let mut net = converged(-40, -60).await;
    {
        let mut script = net.link("A").script();
        script.fail_posts = u32::MAX;
        script.reachable = false;
    }

    net.dispatch_until_demoted("A").await;
    assert_eq!(net.role("A"), Role::Idle);

    // A stopped heart-beating when it demoted
    tokio::time::advance(Duration::from_millis(4001)).await;
    net.heartbeat_all();
    net.deliver_all().await;
    net.liveness_all();
    assert_eq!(net.node("B").election_state().current_bridge_id, None);

    net.probe_all().await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("B")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("B")));
    assert!(net.node("B").election_state().server_reachable);
}

#[tokio::test(start_paused = true)]
async fn test_recovered_stronger_node_reclaims() {
    let mut net = converged(-40, -60).await;
    net.link("A").script().reachable = false;
    loop {
        tokio::time::advance(Duration::from_secs(1)).await;
        let outcome = net.node_mut("A").on_probe_tick().await;
        if outcome == (ProbeOutcome::Unreachable { exhausted: true }) {
            break;
        }
    }
    assert_eq!(net.role("A"), Role::Idle);
    assert!(!net.node("A").election_state().server_reachable);

    tokio::time::advance(Duration::from_millis(4001)).await;
    net.liveness_all();
    net.probe("B").await;
    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("B")]);

    net.link("A").script().reachable = true;
    tokio::time::advance(Duration::from_secs(10)).await;
    net.probe("A").await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("A")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("A")));
}

#[tokio::test(start_paused = true)]
async fn test_sink_rejecting_reports_hands_role_to_next_node() {
    // A's sink still answers liveness checks but refuses every report
    let mut net = converged(-40, -60).await;
    net.link("A").script().fail_posts = u32::MAX;

    for _ in 0..40 {
        tokio::time::advance(Duration::from_millis(500)).await;
        net.probe_all().await;
        net.heartbeat_all();
        net.deliver_all().await;
        net.liveness_all();
        net.dispatch_all().await;
        net.deliver_all().await;
    }

    assert_eq!(net.bridges(), vec![NodeId::from("B")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("B")));
    assert!(!net.link("B").posts().is_empty());
    assert!(net.link("A").posts().is_empty());
    assert_eq!(net.node("A").stats().demotions, 1);
    assert!(!net.node("A").gateway().is_bridge_eligible());
}

#[tokio::test(start_paused = true)]
async fn test_alert_burst_does_not_demote_bridge() {
    let mut net = converged(-40, -60).await;
    net.link("A").script().fail_posts = u32::MAX;

    for i in 0..8 {
        let accel_x = if i % 2 == 0 { 40.0 } else { 0.5 };
        net.node_mut("B").set_local_snapshot(SensorSnapshot::new(
            1_700_000_000_000,
            SensorReadings {
                accel: Some(Vector3::new(accel_x, 0.0, 9.5)),
                ..Default::default()
            },
        ));
        net.dispatch("B").await;
        net.deliver_all().await;
    }

    assert_eq!(net.role("A"), Role::Bridge);
    assert_eq!(net.node("A").stats().reports_failed, 1);
    assert_eq!(net.node("A").stats().demotions, 0);
}
