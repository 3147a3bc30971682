use anyhow::{Context as _, Result};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{
    config::{Level, RetryPolicy, SensorConfig},
    reading::{GasConcentrations, SensorReading, TemperatureHumidity},
    sensors::{DigitalInput, DigitalOutput, Devices, GasSensor, Hygrometer, HygrometerSample},
};

/// The node's sensors. Every read is fault tolerant: failures are logged and
/// come back as absent values, never as errors.
pub struct SensorArray {
    hygrometer: Box<dyn Hygrometer>,
    hygrometer_retry: RetryPolicy,
    gas: GasSensor,
    light: Box<dyn DigitalInput>,
    light_present_when: Level,
    motion: Box<dyn DigitalInput>,
    indicator: Box<dyn DigitalOutput>,
}

impl SensorArray {
    /// Builds the array and calibrates the gas sensor.
    pub async fn new(devices: Devices, config: &SensorConfig) -> Result<Self> {
        let gas = GasSensor::calibrate(devices.gas_adc, config.gas_sampling())
            .await
            .context("failed to calibrate gas sensor")?;

        Ok(Self::with_gas_sensor(
            devices.hygrometer,
            gas,
            devices.light,
            devices.motion,
            devices.indicator,
            config.dht_retry(),
            config.light_present_when,
        ))
    }

    pub fn with_gas_sensor(
        hygrometer: Box<dyn Hygrometer>,
        gas: GasSensor,
        light: Box<dyn DigitalInput>,
        motion: Box<dyn DigitalInput>,
        indicator: Box<dyn DigitalOutput>,
        hygrometer_retry: RetryPolicy,
        light_present_when: Level,
    ) -> Self {
        Self {
            hygrometer,
            hygrometer_retry,
            gas,
            light,
            light_present_when,
            motion,
            indicator,
        }
    }

    pub async fn read_temperature_humidity(&mut self) -> TemperatureHumidity {
        let sample = match self.read_hygrometer_with_retry().await {
            Ok(sample) => sample,
            Err(err) => {
                error!("failed to read temperature/humidity: {err:#}");
                return TemperatureHumidity::default();
            }
        };

        if !valid_sample(&sample) {
            error!(
                temperature = sample.temperature_celsius,
                humidity = sample.humidity_percent,
                "temperature/humidity reading out of range"
            );
            return TemperatureHumidity::default();
        }

        TemperatureHumidity {
            temperature: Some(sample.temperature_celsius),
            humidity: Some(sample.humidity_percent),
        }
    }

    async fn read_hygrometer_with_retry(&mut self) -> Result<HygrometerSample> {
        let attempts = self.hygrometer_retry.attempts;
        let mut backoff = self.hygrometer_retry.backoff();
        let mut attempt = 1;
        loop {
            match self.hygrometer.read() {
                Ok(sample) => return Ok(sample),
                Err(err) if attempt < attempts => {
                    debug!(attempt, "temperature/humidity read failed, retrying: {err:#}");
                    attempt += 1;
                    sleep(backoff.next_delay()).await;
                }
                Err(err) => {
                    return Err(err.context(format!("gave up after {attempts} attempts")));
                }
            }
        }
    }

    pub async fn read_gas_concentrations(&mut self) -> GasConcentrations {
        match self.gas.read().await {
            Ok(gas) => gas,
            Err(err) => {
                error!("failed to read gas concentrations: {err:#}");
                GasConcentrations::default()
            }
        }
    }

    pub fn read_light_presence(&mut self) -> bool {
        match self.light.is_high() {
            Ok(high) => high == (self.light_present_when == Level::High),
            Err(err) => {
                error!("failed to read light sensor: {err:#}");
                false
            }
        }
    }

    /// Reads the PIR sensor and mirrors the result on the indicator.
    pub fn read_motion_and_signal(&mut self) -> bool {
        let motion = match self.motion.is_high() {
            Ok(high) => high,
            Err(err) => {
                error!("failed to read motion sensor: {err:#}");
                false
            }
        };
        self.set_indicator(motion);

        motion
    }

    pub fn set_indicator(&mut self, on: bool) {
        if let Err(err) = self.indicator.set(on) {
            warn!("failed to set indicator: {err:#}");
        }
    }

    /// One full reading set, starting from a known indicator state.
    pub async fn read_all(&mut self) -> SensorReading {
        self.set_indicator(false);

        let climate = self.read_temperature_humidity().await;
        let gas = self.read_gas_concentrations().await;
        let light = self.read_light_presence();
        let motion = self.read_motion_and_signal();

        SensorReading::new(climate, gas, light, motion)
    }
}

fn valid_sample(sample: &HygrometerSample) -> bool {
    sample.temperature_celsius.is_finite()
        && sample.humidity_percent.is_finite()
        && (0.0..=100.0).contains(&sample.humidity_percent)
}
