//! UDP broadcast stand-in for the radio mesh.
//!
//! Every datagram is `<prefix>|<payload>`; datagrams from another mesh prefix
//! are ignored. Our own broadcasts loop back: the controller filters them by
//! node id, and the peer table counts them as this node.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use worknet_core::MeshConfig;
use worknet_mesh::{MeshError, MeshResult, MeshTransport};

const MAX_DATAGRAM: usize = 8192;
const INBOUND_QUEUE: usize = 256;

/// Payload received from the mesh.
#[derive(Debug)]
pub struct Inbound {
    pub from: SocketAddr,
    pub payload: String,
}

/// Senders heard recently, keyed by source address.
#[derive(Debug, Clone, Default)]
struct PeerTable {
    seen: Arc<Mutex<HashMap<SocketAddr, Instant>>>,
}

impl PeerTable {
    fn touch(&self, addr: SocketAddr) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(addr, Instant::now());
        }
    }

    fn active(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        match self.seen.lock() {
            Ok(mut seen) => {
                seen.retain(|_, last| now.saturating_duration_since(*last) <= ttl);
                seen.len()
            }
            Err(_) => 0,
        }
    }
}

pub struct UdpMesh {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    prefix: String,
    peers: PeerTable,
    peer_ttl: Duration,
}

impl UdpMesh {
    /// Bind the mesh socket and start the receive task.
    pub async fn bind(
        config: &MeshConfig,
        peer_ttl: Duration,
    ) -> anyhow::Result<(Self, mpsc::Receiver<Inbound>)> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let socket = UdpSocket::bind(&bind)
            .await
            .with_context(|| format!("failed to bind mesh socket on {}", bind))?;
        socket
            .set_broadcast(true)
            .context("failed to enable broadcast on mesh socket")?;

        let target: SocketAddr = format!("{}:{}", config.broadcast_addr, config.port)
            .parse()
            .with_context(|| format!("invalid broadcast address {}", config.broadcast_addr))?;

        let socket = Arc::new(socket);
        let peers = PeerTable::default();
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);

        tokio::spawn(receive_loop(
            socket.clone(),
            config.prefix.clone(),
            peers.clone(),
            tx,
        ));

        Ok((
            Self {
                socket,
                target,
                prefix: config.prefix.clone(),
                peers,
                peer_ttl,
            },
            rx,
        ))
    }
}

impl MeshTransport for UdpMesh {
    fn broadcast(&mut self, payload: &str) -> MeshResult<()> {
        let datagram = format!("{}|{}", self.prefix, payload);
        if datagram.len() > MAX_DATAGRAM {
            return Err(MeshError::Transport(format!(
                "payload of {} bytes exceeds datagram limit",
                datagram.len()
            )));
        }

        match self.socket.try_send_to(datagram.as_bytes(), self.target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(MeshError::Transport("mesh socket busy".to_string()))
            }
            Err(e) => Err(MeshError::Transport(e.to_string())),
        }
    }

    fn node_count(&self) -> usize {
        self.peers.active(self.peer_ttl).max(1)
    }
}

/// Payload of a datagram framed for `prefix`.
fn mesh_payload<'a>(datagram: &'a str, prefix: &str) -> Option<&'a str> {
    datagram
        .split_once('|')
        .filter(|(p, _)| *p == prefix)
        .map(|(_, payload)| payload)
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    prefix: String,
    peers: PeerTable,
    tx: mpsc::Sender<Inbound>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "Mesh receive failed");
                continue;
            }
        };

        let Ok(text) = std::str::from_utf8(&buf[..len]) else {
            debug!(%from, "Dropping non-UTF-8 datagram");
            continue;
        };
        let Some(payload) = mesh_payload(text, &prefix) else {
            debug!(%from, "Dropping datagram from another mesh");
            continue;
        };

        peers.touch(from);
        let inbound = Inbound {
            from,
            payload: payload.to_string(),
        };
        if tx.send(inbound).await.is_err() {
            debug!("Mesh consumer gone, stopping receive loop");
            return;
        }
    }
}
