//! Synthetic sensor drivers for bench runs.
//!
//! Each driver stands in for one of the wearable's sensors and produces
//! plausible readings with noise. The IMU occasionally reports a motion spike
//! so the status classifier has something to react to.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;
use worknet_core::SensorEntry;
use worknet_mesh::{MeshResult, SensorDriver, SensorReadings, Vector3};

const GRAVITY: f32 = 9.81;

/// Chance per read that the IMU reports a fall-like spike.
const SPIKE_PROBABILITY: f64 = 0.01;

/// MPU6050 stand-in: accelerometer and gyroscope.
pub struct SyntheticImu {
    rng: StdRng,
}

/// DHT22 stand-in: temperature and humidity.
pub struct SyntheticClimate {
    rng: StdRng,
    temperature: f32,
    humidity: f32,
}

/// BH1750 stand-in: ambient light.
pub struct SyntheticLight {
    rng: StdRng,
}

impl SyntheticImu {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl SyntheticClimate {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            temperature: 24.0,
            humidity: 45.0,
        }
    }
}

impl SyntheticLight {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl SensorDriver for SyntheticImu {
    fn name(&self) -> &str {
        "MPU6050"
    }

    fn init(&mut self) -> MeshResult<()> {
        Ok(())
    }

    fn read(&mut self, readings: &mut SensorReadings) -> MeshResult<()> {
        let jitter = |rng: &mut StdRng| rng.gen_range(-0.3..0.3);
        let mut accel = Vector3::new(
            jitter(&mut self.rng),
            jitter(&mut self.rng),
            GRAVITY + jitter(&mut self.rng),
        );
        if self.rng.gen_bool(SPIKE_PROBABILITY) {
            accel.x = self.rng.gen_range(18.0..40.0);
        }

        readings.accel = Some(accel);
        readings.gyro = Some(Vector3::new(
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
        ));
        Ok(())
    }
}

impl SensorDriver for SyntheticClimate {
    fn name(&self) -> &str {
        "DHT22"
    }

    fn init(&mut self) -> MeshResult<()> {
        Ok(())
    }

    fn read(&mut self, readings: &mut SensorReadings) -> MeshResult<()> {
        self.temperature = (self.temperature + self.rng.gen_range(-0.2..0.2)).clamp(15.0, 40.0);
        self.humidity = (self.humidity + self.rng.gen_range(-0.5..0.5)).clamp(10.0, 95.0);
        readings.temperature = Some(self.temperature);
        readings.humidity = Some(self.humidity);
        Ok(())
    }
}

impl SensorDriver for SyntheticLight {
    fn name(&self) -> &str {
        "BH1750"
    }

    fn init(&mut self) -> MeshResult<()> {
        Ok(())
    }

    fn read(&mut self, readings: &mut SensorReadings) -> MeshResult<()> {
        readings.light = Some(self.rng.gen_range(200.0..800.0));
        Ok(())
    }
}

/// Driver for a configured sensor name, or `None` if there is no stand-in.
pub fn driver_for(entry: &SensorEntry) -> Option<Box<dyn SensorDriver>> {
    let rng = StdRng::from_entropy();
    let driver: Box<dyn SensorDriver> = match entry.name.as_str() {
        "MPU6050" => Box::new(SyntheticImu::new(rng)),
        "DHT22" => Box::new(SyntheticClimate::new(rng)),
        "BH1750" => Box::new(SyntheticLight::new(rng)),
        other => {
            warn!(sensor = other, "No synthetic driver for sensor, skipping");
            return None;
        }
    };
    Some(driver)
}
