//! In-memory transport doubles for tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for downstream integration tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{MeshError, MeshResult};
use crate::message::MeshMessage;
use crate::transport::{MeshTransport, UplinkLink};

/// Scripted behaviour and recorded traffic of a [`MockUplink`].
#[derive(Debug, Clone)]
pub struct UplinkScript {
    /// GET liveness succeeds
    pub reachable: bool,
    /// Association succeeds
    pub associable: bool,
    /// Association never completes
    pub hang_connect: bool,
    pub signal: i32,
    /// Number of upcoming POSTs to reject
    pub fail_posts: u32,
    /// A rejected POST also drops the association
    pub drop_on_failure: bool,
    pub connected: bool,
    /// Association attempts made
    pub connects: u32,
    /// Bodies of delivered POSTs
    pub posts: Vec<String>,
}

/// Shared-state uplink double; clones observe the same script.
#[derive(Debug, Clone)]
pub struct MockUplink {
    state: Arc<Mutex<UplinkScript>>,
}

impl MockUplink {
    pub fn new(signal: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(UplinkScript {
                reachable: true,
                associable: true,
                hang_connect: false,
                signal,
                fail_posts: 0,
                drop_on_failure: false,
                connected: false,
                connects: 0,
                posts: Vec::new(),
            })),
        }
    }

    /// Uplink whose sink never answers and whose association always fails.
    pub fn offline() -> Self {
        let link = Self::new(-100);
        {
            let mut script = link.script();
            script.reachable = false;
            script.associable = false;
        }
        link
    }

    pub fn script(&self) -> MutexGuard<'_, UplinkScript> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn posts(&self) -> Vec<String> {
        self.script().posts.clone()
    }

    pub fn is_connected_now(&self) -> bool {
        self.script().connected
    }
}

#[async_trait]
impl UplinkLink for MockUplink {
    async fn connect(&mut self) -> MeshResult<()> {
        let hang = {
            let mut script = self.script();
            script.connects += 1;
            if !script.hang_connect {
                if !script.associable {
                    return Err(MeshError::Uplink("access point not found".to_string()));
                }
                script.connected = true;
            }
            script.hang_connect
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.script().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.script().connected
    }

    fn signal_strength(&self) -> Option<i32> {
        let script = self.script();
        script.connected.then_some(script.signal)
    }

    async fn check_sink(&mut self) -> MeshResult<()> {
        let script = self.script();
        if script.connected && script.reachable {
            Ok(())
        } else {
            Err(MeshError::Uplink("sink did not answer".to_string()))
        }
    }

    async fn post_report(&mut self, body: &str) -> MeshResult<()> {
        let mut script = self.script();
        if !script.connected {
            return Err(MeshError::Uplink("not associated".to_string()));
        }
        if script.fail_posts > 0 {
            script.fail_posts -= 1;
            if script.drop_on_failure {
                script.connected = false;
            }
            return Err(MeshError::SinkStatus { status: 503 });
        }
        script.posts.push(body.to_string());
        Ok(())
    }
}

/// Mesh double that records every broadcast.
#[derive(Debug, Clone)]
pub struct MockMesh {
    sent: Arc<Mutex<Vec<String>>>,
    node_count: usize,
}

impl MockMesh {
    pub fn new(node_count: usize) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            node_count,
        }
    }

    fn sent_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw payloads broadcast so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent_guard().clone()
    }

    /// Decoded broadcasts, draining the record.
    pub fn take_messages(&self) -> Vec<MeshMessage> {
        self.sent_guard()
            .drain(..)
            .filter_map(|payload| MeshMessage::parse(&payload).ok())
            .collect()
    }
}

impl MeshTransport for MockMesh {
    fn broadcast(&mut self, payload: &str) -> MeshResult<()> {
        self.sent_guard().push(payload.to_string());
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.node_count
    }
}
