//! Sensor snapshots and acquisition.
//!
//! Drivers are external collaborators behind [`SensorDriver`]. The
//! [`SensorPoller`] runs them on its own task at per-sensor intervals and
//! publishes the merged latest reading through a `watch` channel, which gives
//! the node loop a single-writer/single-reader handoff it never blocks on.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use worknet_core::{RetryConfig, SensorEntry};

use crate::error::MeshResult;
use crate::retry::{RetryCounter, RetryState};

/// Three-axis measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Largest absolute component.
    pub fn max_abs(&self) -> f32 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Sensor values; `None` means not measured or invalid.
///
/// Serializes to the mesh `data` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<f32>,
    #[serde(
        rename = "accelerometer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub accel: Option<Vector3>,
    #[serde(rename = "gyroscope", default, skip_serializing_if = "Option::is_none")]
    pub gyro: Option<Vector3>,
}

impl SensorReadings {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.light.is_none()
            && self.accel.is_none()
            && self.gyro.is_none()
    }

    /// Drop non-finite values (drivers report NaN on a failed conversion).
    pub fn sanitize(&mut self) {
        self.temperature = self.temperature.filter(|v| v.is_finite());
        self.humidity = self.humidity.filter(|v| v.is_finite());
        self.light = self.light.filter(|v| v.is_finite() && *v >= 0.0);
        self.accel = self.accel.filter(Vector3::is_finite);
        self.gyro = self.gyro.filter(Vector3::is_finite);
    }

    /// Overwrite fields that `newer` carries, keep the rest.
    pub fn merge(&mut self, newer: &SensorReadings) {
        if newer.temperature.is_some() {
            self.temperature = newer.temperature;
        }
        if newer.humidity.is_some() {
            self.humidity = newer.humidity;
        }
        if newer.light.is_some() {
            self.light = newer.light;
        }
        if newer.accel.is_some() {
            self.accel = newer.accel;
        }
        if newer.gyro.is_some() {
            self.gyro = newer.gyro;
        }
    }
}

/// Timestamped readings of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Unix milliseconds at acquisition
    pub timestamp: u64,
    #[serde(flatten)]
    pub readings: SensorReadings,
}

impl SensorSnapshot {
    pub fn new(timestamp: u64, readings: SensorReadings) -> Self {
        Self {
            timestamp,
            readings,
        }
    }
}

/// Uniform driver interface: initialize the device, then fill in readings.
pub trait SensorDriver: Send {
    /// Sensor name used in logs and configuration
    fn name(&self) -> &str;

    /// Bring the device up; called again after failures
    fn init(&mut self) -> MeshResult<()>;

    /// Write this sensor's fields into `readings`
    fn read(&mut self, readings: &mut SensorReadings) -> MeshResult<()>;
}

/// Sending half of the snapshot handoff.
pub type SnapshotPublisher = watch::Sender<Option<SensorSnapshot>>;

/// Receiving half of the snapshot handoff.
pub type SnapshotReceiver = watch::Receiver<Option<SensorSnapshot>>;

/// Create the latest-value snapshot handoff.
pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotReceiver) {
    watch::channel(None)
}

struct ManagedSensor {
    driver: Box<dyn SensorDriver>,
    enabled: bool,
    ready: bool,
    read_interval: Duration,
    next_read: Instant,
    next_init: Instant,
    retry: RetryCounter,
}

/// Polls sensor drivers and publishes merged snapshots.
pub struct SensorPoller {
    sensors: Vec<ManagedSensor>,
    readings: SensorReadings,
    publisher: SnapshotPublisher,
    retry_config: RetryConfig,
}

impl SensorPoller {
    /// Create a poller that publishes into `publisher`.
    pub fn new(publisher: SnapshotPublisher, retry_config: RetryConfig) -> Self {
        Self {
            sensors: Vec::new(),
            readings: SensorReadings::default(),
            publisher,
            retry_config,
        }
    }

    /// Register a driver with its configuration entry.
    pub fn add(&mut self, driver: Box<dyn SensorDriver>, entry: &SensorEntry, now: Instant) {
        if !entry.enabled {
            info!(sensor = %entry.name, "Sensor is disabled");
        }
        self.sensors.push(ManagedSensor {
            driver,
            enabled: entry.enabled,
            ready: false,
            read_interval: Duration::from_millis(entry.read_interval_ms),
            next_read: now,
            next_init: now,
            retry: RetryCounter::from_config(&self.retry_config),
        });
    }

    /// Number of sensors still enabled.
    pub fn enabled_count(&self) -> usize {
        self.sensors.iter().filter(|s| s.enabled).count()
    }

    /// Run due inits and reads; publishes a snapshot when any read succeeded.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut fresh = SensorReadings::default();
        let mut any_read = false;

        for sensor in self.sensors.iter_mut().filter(|s| s.enabled) {
            if !sensor.ready {
                if now < sensor.next_init {
                    continue;
                }
                Self::try_init(sensor, now);
                if !sensor.ready {
                    continue;
                }
            }

            if now < sensor.next_read {
                continue;
            }
            sensor.next_read = now + sensor.read_interval;

            match sensor.driver.read(&mut fresh) {
                Ok(()) => any_read = true,
                Err(e) => {
                    warn!(sensor = %sensor.driver.name(), error = %e, "Sensor read failed, scheduling re-init");
                    sensor.ready = false;
                    Self::schedule_reinit(sensor, now);
                }
            }
        }

        if !any_read {
            return false;
        }

        fresh.sanitize();
        self.readings.merge(&fresh);
        let snapshot = SensorSnapshot::new(current_timestamp(), self.readings.clone());
        self.publisher.send_replace(Some(snapshot));
        true
    }

    /// Earliest instant at which `poll` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sensors
            .iter()
            .filter(|s| s.enabled)
            .map(|s| if s.ready { s.next_read } else { s.next_init })
            .min()
    }

    /// Poll until the receiving side of the handoff goes away.
    pub async fn run(mut self) {
        loop {
            if self.publisher.is_closed() {
                debug!("Snapshot receiver dropped, stopping sensor poller");
                return;
            }
            let now = Instant::now();
            self.poll(now);
            let next = self
                .next_deadline()
                .unwrap_or(now + Duration::from_secs(1))
                .max(now + Duration::from_millis(10));
            tokio::time::sleep_until(next).await;
        }
    }

    fn try_init(sensor: &mut ManagedSensor, now: Instant) {
        match sensor.driver.init() {
            Ok(()) => {
                info!(sensor = %sensor.driver.name(), "Sensor initialized successfully");
                sensor.ready = true;
                sensor.retry.record_success();
                sensor.next_read = now;
            }
            Err(e) => {
                warn!(sensor = %sensor.driver.name(), error = %e, "Sensor initialization failed");
                Self::schedule_reinit(sensor, now);
            }
        }
    }

    fn schedule_reinit(sensor: &mut ManagedSensor, now: Instant) {
        match sensor.retry.record_failure() {
            RetryState::Retry { delay } => sensor.next_init = now + delay,
            RetryState::Exhausted => {
                warn!(
                    sensor = %sensor.driver.name(),
                    failures = sensor.retry.consecutive_failures(),
                    "Sensor disabled after repeated failures"
                );
                sensor.enabled = false;
            }
        }
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
