//! Sensor aggregation and upstream reporting through the bridge.

use crate::test_utils::{sim_config, SimNetwork};
use serde_json::{json, Value};
use worknet_core::NodeId;
use worknet_mesh::{ChildStatus, DispatchOutcome, SensorReadings, SensorSnapshot, Vector3};

fn reading(temperature: f32, accel_x: f32) -> SensorSnapshot {
    SensorSnapshot::new(
        1_700_000_000_000,
        SensorReadings {
            temperature: Some(temperature),
            accel: Some(Vector3::new(accel_x, 0.0, 9.5)),
            ..Default::default()
        },
    )
}

async fn three_node_mesh() -> SimNetwork {
    let mut net = SimNetwork::new(sim_config());
    net.add_node("A", -40);
    net.add_offline_node("B");
    net.add_node("C", -70);
    net.probe_all().await;
    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("A")]);
    net
}

fn last_report(net: &SimNetwork, bridge: &str) -> Value {
    let posts = net.link(bridge).posts();
    let body = posts.last().expect("bridge has posted a report");
    serde_json::from_str(body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_bridge_reports_whole_network() {
    let mut net = three_node_mesh().await;
    net.node_mut("A").set_local_snapshot(reading(21.0, 0.0));
    net.node_mut("B").set_local_snapshot(reading(22.0, 0.5));
    net.node_mut("C").set_local_snapshot(reading(23.0, -0.5));

    assert_eq!(net.dispatch("B").await, DispatchOutcome::Relayed);
    assert_eq!(net.dispatch("C").await, DispatchOutcome::Relayed);
    net.deliver_all().await;
    assert_eq!(net.dispatch("A").await, DispatchOutcome::Sent);

    let report = last_report(&net, "A");
    assert_eq!(report["root-id"], "A");
    assert_eq!(report["root-status"], "Online");
    assert_eq!(report["root-mac"], "02:00:00:00:00:00");
    assert_eq!(report["children-ids"], json!(["B", "C"]));
    assert_eq!(report["children-status"], json!(["Online", "Online"]));
    assert_eq!(
        report["children-macs"],
        json!(["02:00:00:00:00:01", "02:00:00:00:00:02"])
    );
    assert_eq!(report["sensor-data"]["A"]["temperature"], 21.0);
    assert_eq!(report["sensor-data"]["B"]["temperature"], 22.0);
    assert_eq!(report["sensor-data"]["C"]["accelerometer"]["x"], -0.5);
}

#[tokio::test(start_paused = true)]
async fn test_alert_triggers_immediate_report() {
    let mut net = three_node_mesh().await;

    net.node_mut("B").set_local_snapshot(reading(22.0, 0.5));
    net.dispatch("B").await;
    net.deliver_all().await;
    assert!(net.link("A").posts().is_empty());

    net.node_mut("B").set_local_snapshot(reading(22.0, 31.0));
    net.dispatch("B").await;
    net.deliver_all().await;

    assert_eq!(net.link("A").posts().len(), 1);
    let report = last_report(&net, "A");
    assert_eq!(report["children-ids"], json!(["B"]));
    assert_eq!(report["children-status"], json!(["Alert"]));
    assert_eq!(
        net.node("A").cache().get(&NodeId::from("B")).unwrap().status,
        ChildStatus::Alert
    );
}

#[tokio::test(start_paused = true)]
async fn test_first_contact_in_warning_is_reported_at_once() {
    let mut net = three_node_mesh().await;
    net.node_mut("C").set_local_snapshot(reading(23.0, 18.0));
    net.dispatch("C").await;
    net.deliver_all().await;

    let report = last_report(&net, "A");
    assert_eq!(report["children-status"], json!(["Warning"]));
}

#[tokio::test(start_paused = true)]
async fn test_only_the_bridge_posts() {
    let mut net = three_node_mesh().await;
    for _ in 0..5 {
        net.dispatch_all().await;
        net.deliver_all().await;
    }

    assert_eq!(net.link("A").posts().len(), 5);
    assert!(net.link("B").posts().is_empty());
    assert!(net.link("C").posts().is_empty());
    assert_eq!(net.node("C").stats().relays_sent, 5);
}

#[tokio::test(start_paused = true)]
async fn test_followers_also_cache_readings() {
    let mut net = three_node_mesh().await;
    net.node_mut("B").set_local_snapshot(reading(22.0, 0.5));
    net.dispatch("B").await;
    net.deliver_all().await;

    let record = net.node("C").cache().get(&NodeId::from("B")).unwrap();
    assert_eq!(record.mac, "02:00:00:00:00:01");
    assert_eq!(record.snapshot, Some(reading(22.0, 0.5)));
    assert!(net.node("B").cache().get(&NodeId::from("B")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_report_after_failover_lists_new_root() {
    let mut net = three_node_mesh().await;
    {
        let mut script = net.link("A").script();
        script.fail_posts = u32::MAX;
        script.reachable = false;
    }
    net.dispatch_until_demoted("A").await;

    tokio::time::advance(tokio::time::Duration::from_millis(4001)).await;
    net.liveness_all();
    net.probe("C").await;
    net.deliver_all().await;
    assert_eq!(net.bridges(), vec![NodeId::from("C")]);

    net.dispatch("A").await;
    net.deliver_all().await;
    assert_eq!(net.dispatch("C").await, DispatchOutcome::Sent);

    let report = last_report(&net, "C");
    assert_eq!(report["root-id"], "C");
    assert_eq!(report["children-ids"], json!(["A"]));
}
