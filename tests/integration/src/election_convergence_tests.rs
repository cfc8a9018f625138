//! Bridge election convergence across several nodes.

use crate::test_utils::{sim_config, SimNetwork};
use worknet_core::NodeId;
use worknet_mesh::{Role, SIGNAL_SENTINEL};

#[tokio::test(start_paused = true)]
async fn test_stronger_signal_wins() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -40);
    net.add_node("B", -60);

    net.probe_all().await;
    assert_eq!(net.bridges().len(), 2);

    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("A")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("A")));
    assert_eq!(net.role("B"), Role::Idle);
    assert!(!net.node("B").election_state().server_reachable);
    assert_eq!(net.node("B").election_state().best_signal, -40);
}

#[tokio::test(start_paused = true)]
async fn test_equal_signal_goes_to_lowest_id() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("B", -50);
    net.add_node("A", -50);

    net.probe_all().await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("A")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("A")));
}

#[tokio::test(start_paused = true)]
async fn test_numeric_ids_tie_break_numerically() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("100", -55);
    net.add_node("20", -55);
    net.add_node("3000", -55);

    net.probe_all().await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("20")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("20")));
}

#[tokio::test(start_paused = true)]
async fn test_weaker_node_defers_to_known_bridge() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -40);
    net.add_node("B", -43);

    net.probe("A").await;
    net.deliver_all().await;
    assert_eq!(net.node("B").election_state().current_bridge_id, Some(NodeId::from("A")));

    // -43 is not 5 dB better than -40
    net.probe("B").await;
    assert_eq!(net.role("B"), Role::Idle);
    assert!(net.deliver_all().await == 0);
}

#[tokio::test(start_paused = true)]
async fn test_much_stronger_node_takes_over() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -60);
    net.add_node("B", -40);

    net.probe("A").await;
    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("A")]);

    net.probe("B").await;
    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("B")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("B")));
    assert_eq!(net.node("A").stats().demotions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_nodes_without_uplink_follow_the_bridge() {
    let mut net = SimNetwork::new(sim_config());
    net.add_offline_node("1");
    net.add_node("2", -65);
    net.add_offline_node("3");

    net.probe_all().await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("2")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("2")));
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_adopts_bridge_from_heartbeat() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -40);
    net.probe("A").await;
    net.deliver_all().await;

    net.add_offline_node("C");
    net.heartbeat_all();
    net.deliver_all().await;

    let state = net.node("C").election_state();
    assert_eq!(state.current_bridge_id, Some(NodeId::from("A")));
    assert_eq!(state.best_signal, SIGNAL_SENTINEL);
}

#[tokio::test(start_paused = true)]
async fn test_weak_late_joiner_converges_back_to_incumbent() {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -40);
    net.probe("A").await;
    net.deliver_all().await;

    // D only learned of A through a heartbeat, so it still contests
    net.add_node("D", -70);
    net.heartbeat_all();
    net.deliver_all().await;
    net.probe("D").await;
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("A")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("A")));
    assert_eq!(net.node("D").election_state().best_signal, -40);
}

#[tokio::test(start_paused = true)]
async fn test_many_simultaneous_claims_converge() {
    let mut net = SimNetwork::new(sim_config());
    let signals = [("7", -62), ("3", -48), ("9", -75), ("5", -48), ("1", -80)];
    for (id, signal) in signals {
        net.add_node(id, signal);
    }

    net.probe_all().await;
    assert_eq!(net.bridges().len(), signals.len());
    net.deliver_all().await;

    assert_eq!(net.bridges(), vec![NodeId::from("3")]);
    assert_eq!(net.agreed_bridge(), Some(NodeId::from("3")));
}
