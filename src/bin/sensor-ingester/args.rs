use clap::Parser;
use home_sensors::config::{BrokerConfig, IngestConfig, StorageConfig};

#[derive(Debug, Parser)]
pub struct Args {
    #[command(flatten)]
    pub broker: BrokerConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub ingest: IngestConfig,
}
