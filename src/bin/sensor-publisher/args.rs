use clap::Parser;
use home_sensors::config::{BrokerConfig, SensorConfig};
use macaddr::MacAddr6;

#[derive(Debug, Parser)]
pub struct Args {
    /// Hardware address identifying this node.
    #[arg(long, env = "DEVICE_ID")]
    pub device_id: MacAddr6,

    #[arg(long, env = "MQTT_TOPIC", default_value = "sensor/output")]
    pub topic: String,

    /// Seconds between samples.
    #[arg(long, env = "SAMPLE_FREQUENCY", default_value_t = 5)]
    pub frequency: u64,

    #[command(flatten)]
    pub broker: BrokerConfig,

    #[command(flatten)]
    pub sensors: SensorConfig,
}
