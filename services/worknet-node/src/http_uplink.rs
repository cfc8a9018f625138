//! HTTP uplink to the data sink.
//!
//! On a host there is no access point to join, so association means opening
//! a TCP connection to the sink's address. Signal strength is the configured
//! value since there is no radio to measure.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;
use worknet_core::UplinkConfig;
use worknet_mesh::{MeshError, MeshResult, UplinkLink};

pub struct HttpUplink {
    client: Client,
    sink: Url,
    connected: bool,
    signal_dbm: i32,
}

impl HttpUplink {
    pub fn new(config: &UplinkConfig) -> anyhow::Result<Self> {
        let sink = Url::parse(&config.sink_url)?;
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            sink,
            connected: false,
            signal_dbm: config.signal_dbm,
        })
    }

    fn sink_authority(&self) -> MeshResult<String> {
        let host = self
            .sink
            .host_str()
            .ok_or_else(|| MeshError::Uplink(format!("sink URL {} has no host", self.sink)))?;
        let port = self
            .sink
            .port_or_known_default()
            .ok_or_else(|| MeshError::Uplink(format!("sink URL {} has no port", self.sink)))?;
        Ok(format!("{}:{}", host, port))
    }

    fn check_status(&self, status: StatusCode) -> MeshResult<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(MeshError::SinkStatus {
                status: status.as_u16(),
            })
        }
    }

    fn request_failed(&mut self, error: reqwest::Error) -> MeshError {
        if error.is_connect() {
            self.connected = false;
        }
        MeshError::Uplink(error.to_string())
    }
}

#[async_trait]
impl UplinkLink for HttpUplink {
    async fn connect(&mut self) -> MeshResult<()> {
        let authority = self.sink_authority()?;
        let addr = lookup_host(&authority)
            .await
            .map_err(|e| MeshError::Uplink(format!("failed to resolve {}: {}", authority, e)))?
            .next()
            .ok_or_else(|| MeshError::Uplink(format!("no address for {}", authority)))?;

        TcpStream::connect(addr)
            .await
            .map_err(|e| MeshError::Uplink(format!("sink {} unreachable: {}", addr, e)))?;

        debug!(%addr, "Sink route is up");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn signal_strength(&self) -> Option<i32> {
        self.connected.then_some(self.signal_dbm)
    }

    async fn check_sink(&mut self) -> MeshResult<()> {
        match self.client.get(self.sink.clone()).send().await {
            Ok(response) => self.check_status(response.status()),
            Err(e) => Err(self.request_failed(e)),
        }
    }

    async fn post_report(&mut self, body: &str) -> MeshResult<()> {
        let response = self
            .client
            .post(self.sink.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await;

        match response {
            Ok(response) => self.check_status(response.status()),
            Err(e) => Err(self.request_failed(e)),
        }
    }
}
