mod args;

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use args::Args;
use clap::Parser as _;
use home_sensors::{
    bridge::{self, IngestionBridge},
    bus::{MqttSubscriber, client_id},
    db::{PgSink, new_pool},
    logging, shutdown,
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
    let shutdown = shutdown::on_signal();

    info!(
        host = %args.storage.host,
        port = args.storage.port,
        database = %args.storage.database,
        "using TimescaleDB"
    );
    let sink = PgSink::new(new_pool(&args.storage));
    let bridge = Arc::new(IngestionBridge::new(sink));
    let (queue, workers) = bridge::start(
        bridge.clone(),
        args.ingest.queue_capacity,
        args.ingest.workers,
        shutdown.clone(),
    );

    let mut subscriber = MqttSubscriber::connect(&args.broker, &client_id("sensor-ingester"));
    subscriber.subscribe(&args.ingest.topic);

    let mut state = subscriber.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(state = ?current, "MQTT connection state changed");
        }
    });

    let handler = move |_topic: &str, payload: &[u8]| {
        queue.offer(payload);
    };
    subscriber.run(handler, shutdown).await;

    workers.join().await;
    bridge.sink().close().await;

    Ok(())
}
