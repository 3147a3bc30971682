use clap::Parser;
use home_sensors::config::BrokerConfig;
use macaddr::MacAddr6;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "MQTT_TOPIC", default_value = "sensor/test")]
    pub topic: String,

    #[arg(long, default_value = "00:00:00:00:00:00")]
    pub device_id: MacAddr6,

    /// Stamp the message with the current time instead of the fixed sample time.
    #[arg(long)]
    pub now: bool,

    /// Seconds to wait for the broker.
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    #[command(flatten)]
    pub broker: BrokerConfig,
}
