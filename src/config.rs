use std::{path::PathBuf, time::Duration};

use clap::{Args, ValueEnum};

use crate::bus::Backoff;

#[derive(Debug, Clone, Args)]
pub struct BrokerConfig {
    /// MQTT broker host.
    #[arg(id = "mqtt_host", long = "mqtt-host", env = "MQTT_HOST", default_value = "localhost")]
    pub host: String,

    /// MQTT broker port.
    #[arg(id = "mqtt_port", long = "mqtt-port", env = "MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    #[arg(id = "mqtt_username", long = "mqtt-username", env = "MQTT_USERNAME")]
    pub username: Option<String>,

    #[arg(
        id = "mqtt_password",
        long = "mqtt-password",
        env = "MQTT_PASSWORD",
        requires = "mqtt_username",
    )]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[arg(
        id = "mqtt_keep_alive",
        long = "mqtt-keep-alive",
        env = "MQTT_KEEP_ALIVE",
        default_value_t = 60,
    )]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct StorageConfig {
    #[arg(id = "ts_host", long = "ts-host", env = "TS_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(id = "ts_port", long = "ts-port", env = "TS_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(
        id = "ts_username",
        long = "ts-username",
        env = "TS_USERNAME",
        default_value = "postgres",
    )]
    pub username: String,

    #[arg(id = "ts_password", long = "ts-password", env = "TS_PASSWORD")]
    pub password: String,

    #[arg(
        id = "ts_database",
        long = "ts-database",
        env = "TS_DATABASE",
        default_value = "demo_iot",
    )]
    pub database: String,

    /// Seconds to wait for a pooled connection before giving up on an insert.
    #[arg(
        id = "ts_acquire_timeout",
        long = "ts-acquire-timeout",
        env = "TS_ACQUIRE_TIMEOUT",
        default_value_t = 3,
    )]
    pub acquire_timeout_secs: u64,

    #[arg(
        id = "ts_max_connections",
        long = "ts-max-connections",
        env = "TS_MAX_CONNECTIONS",
        default_value_t = 4,
    )]
    pub max_connections: u32,
}

impl StorageConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct IngestConfig {
    /// Topic to subscribe to.
    #[arg(long, env = "MQTT_TOPIC", default_value = "sensor/output")]
    pub topic: String,

    /// Payloads buffered between receipt and storage; newer payloads are
    /// dropped while the buffer is full.
    #[arg(long, env = "INGEST_QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Number of concurrent storage writers.
    #[arg(long, env = "INGEST_WORKERS", default_value_t = 2)]
    pub workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Args)]
pub struct SensorConfig {
    #[arg(long, env = "SYSFS_ROOT", default_value = "/sys")]
    pub sysfs_root: PathBuf,

    /// IIO device name of the DHT22 temperature/humidity sensor.
    #[arg(long, default_value = "iio:device0")]
    pub dht_device: String,

    #[arg(long, default_value_t = 15)]
    pub dht_retries: u32,

    /// Delay before the first DHT22 retry in milliseconds; doubles per attempt.
    #[arg(long, default_value_t = 250)]
    pub dht_retry_delay_ms: u64,

    /// Ceiling for the DHT22 retry delay in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub dht_retry_max_delay_ms: u64,

    /// IIO device name of the ADC the MQ-2 gas sensor is wired to.
    #[arg(long, default_value = "iio:device1")]
    pub adc_device: String,

    #[arg(long, default_value_t = 0)]
    pub gas_adc_channel: u8,

    #[arg(long, default_value_t = 10)]
    pub adc_resolution_bits: u8,

    #[arg(long, default_value_t = 50)]
    pub gas_calibration_samples: u32,

    #[arg(long, default_value_t = 500)]
    pub gas_calibration_interval_ms: u64,

    #[arg(long, default_value_t = 5)]
    pub gas_read_samples: u32,

    #[arg(long, default_value_t = 50)]
    pub gas_read_interval_ms: u64,

    #[arg(long, default_value_t = 24)]
    pub light_gpio: u32,

    /// Input level that means ambient light is present.
    #[arg(long, value_enum, default_value_t = Level::Low)]
    pub light_present_when: Level,

    #[arg(long, default_value_t = 23)]
    pub pir_gpio: u32,

    #[arg(long, default_value_t = 25)]
    pub led_gpio: u32,
}

impl SensorConfig {
    pub fn dht_retry(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.dht_retries.max(1),
            delay: Duration::from_millis(self.dht_retry_delay_ms),
            max_delay: Duration::from_millis(
                self.dht_retry_max_delay_ms.max(self.dht_retry_delay_ms),
            ),
        }
    }

    pub fn gas_sampling(&self) -> GasSampling {
        GasSampling {
            calibration_samples: self.gas_calibration_samples.max(1),
            calibration_interval: Duration::from_millis(self.gas_calibration_interval_ms),
            read_samples: self.gas_read_samples.max(1),
            read_interval: Duration::from_millis(self.gas_read_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.delay, self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSampling {
    pub calibration_samples: u32,
    pub calibration_interval: Duration,
    pub read_samples: u32,
    pub read_interval: Duration,
}

impl Default for GasSampling {
    fn default() -> Self {
        Self {
            calibration_samples: 50,
            calibration_interval: Duration::from_millis(500),
            read_samples: 5,
            read_interval: Duration::from_millis(50),
        }
    }
}
