use std::path::PathBuf;

use anyhow::Context;
use rand::Rng;
use serde::Serialize;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{info, info_span, Instrument};
use worknet_core::{logging, Config, NodeIdentity};
use worknet_mesh::{snapshot_channel, NodeController, SensorPoller};

mod http_uplink;
mod synthetic;
mod udp_mesh;

use http_uplink::HttpUplink;
use udp_mesh::UdpMesh;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

/// How often the bridge liveness check runs, relative to the heartbeat.
const LIVENESS_CHECKS_PER_HEARTBEAT: u32 = 2;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if config.node.json_logs {
        logging::init_json();
    } else {
        logging::init_with_level(&config.node.log_level);
    }

    let identity = node_identity(&config)?;
    info!(
        node = %identity.name,
        node_id = %identity.node_id,
        mac = %identity.mac,
        mesh = %config.mesh.prefix,
        sink = %config.uplink.sink_url,
        "WorkNet node starting"
    );

    run(config, identity).await
}

async fn run(config: Config, identity: NodeIdentity) -> anyhow::Result<()> {
    let (mesh, mut inbound) = UdpMesh::bind(&config.mesh, config.election.bridge_timeout()).await?;
    let uplink = HttpUplink::new(&config.uplink)?;

    let (publisher, mut snapshots) = snapshot_channel();
    let mut poller = SensorPoller::new(publisher, config.retry.clone());
    let now = Instant::now();
    for entry in &config.sensors.entries {
        if let Some(driver) = synthetic::driver_for(entry) {
            poller.add(driver, entry, now);
        }
    }
    info!(sensors = poller.enabled_count(), "Sensor poller started");
    tokio::spawn(poller.run());

    let name = identity.name.clone();
    let mut node = NodeController::new(identity, &config, mesh, uplink);

    let mut probe = ticker(config.timers.probe_interval());
    let mut heartbeat = ticker(config.election.heartbeat_interval());
    let mut report = ticker(config.timers.report_interval());
    let mut topology = ticker(config.timers.topology_interval());
    let mut liveness = ticker(
        (config.election.heartbeat_interval() / LIVENESS_CHECKS_PER_HEARTBEAT)
            .max(Duration::from_millis(1)),
    );

    loop {
        let span = info_span!("node", name = %name, role = %node.role());
        tokio::select! {
            _ = probe.tick() => {
                node.on_probe_tick().instrument(span).await;
            }
            _ = heartbeat.tick() => {
                span.in_scope(|| node.on_heartbeat_tick());
            }
            _ = report.tick() => {
                node.on_report_tick().instrument(span).await;
            }
            _ = topology.tick() => {
                span.in_scope(|| node.on_topology_tick());
            }
            _ = liveness.tick() => {
                span.in_scope(|| node.on_liveness_tick());
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    anyhow::bail!("sensor poller stopped");
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    node.set_local_snapshot(snapshot);
                }
            }
            message = inbound.recv() => {
                let Some(message) = message else {
                    anyhow::bail!("mesh receive loop stopped");
                };
                let from = message.from.to_string();
                node.on_message(&from, &message.payload).instrument(span).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(node = %name, "Shutting down");
                return Ok(());
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Identity from the configured MAC, or a random locally administered one.
fn node_identity(config: &Config) -> anyhow::Result<NodeIdentity> {
    match &config.node.mac {
        Some(mac) => Ok(NodeIdentity::parse(mac, &config.node.name_prefix)?),
        None => {
            let mut mac: [u8; 6] = rand::thread_rng().gen();
            mac[0] = (mac[0] & 0xfc) | 0x02;
            Ok(NodeIdentity::from_mac(mac, &config.node.name_prefix))
        }
    }
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            anyhow::bail!("--config was provided without a path");
        }
    }

    Ok(None)
}
