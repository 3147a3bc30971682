mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use home_sensors::{
    bus::{MqttPublisher, client_id},
    logging,
    sampler::Sampler,
    sensors::{SensorArray, open_devices},
    shutdown,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    if let Err(e) = run().await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let device_id = args.device_id.to_string().to_lowercase();
    let shutdown = shutdown::on_signal();

    let devices = open_devices(&args.sensors).context("failed to open sensor devices")?;
    let sensors = tokio::select! {
        _ = shutdown.cancelled() => {
            info!("shutdown requested during calibration");
            return Ok(());
        }
        sensors = SensorArray::new(devices, &args.sensors) => {
            sensors.context("failed to initialize sensors")?
        }
    };

    // Outlives `shutdown` so the last tick can still publish.
    let link = CancellationToken::new();
    let (publisher, driver) = MqttPublisher::connect(
        &args.broker,
        &client_id("sensor-publisher"),
        link.clone(),
    );

    let sampler = Sampler::new(
        sensors,
        publisher,
        device_id,
        args.topic,
        Duration::from_secs(args.frequency.max(1)),
    );
    sampler.run(shutdown).await;

    link.cancel();
    driver.await.context("MQTT publisher task failed")?;

    Ok(())
}
