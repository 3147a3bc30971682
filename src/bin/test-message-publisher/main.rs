mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use args::Args;
use chrono::{TimeZone as _, Utc};
use clap::Parser as _;
use home_sensors::{
    bus::{client_id, publish_single},
    logging,
    reading::{Message, SensorReading},
};
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

    let time = if args.now {
        Utc::now()
    } else {
        Utc.with_ymd_and_hms(2021, 3, 27, 0, 0, 0)
            .single()
            .ok_or_else(|| anyhow!("invalid sample time"))?
    };

    let message = Message {
        data: SensorReading {
            co: Some(0.009),
            humidity: Some(59.9),
            light: false,
            lpg: Some(0.009),
            motion: false,
            smoke: Some(0.009),
            temperature: Some(19.9),
        },
        device_id: args.device_id.to_string().to_lowercase(),
        time,
    };
    let json = message.to_json().context("failed to serialize test message")?;
    info!(topic = %args.topic, "{json}");

    publish_single(
        &args.broker,
        &client_id("test-message-publisher"),
        &args.topic,
        json.into_bytes(),
        Duration::from_secs(args.timeout),
    )
    .await
    .context("failed to publish test message")?;

    info!("test message published");

    Ok(())
}
