use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{bus::Publisher, reading::Message, sensors::SensorArray};

/// Samples the sensor array on a fixed cadence and publishes each reading.
pub struct Sampler<P> {
    sensors: SensorArray,
    publisher: P,
    device_id: String,
    topic: String,
    interval: Duration,
    last_time: Option<DateTime<Utc>>,
}

impl<P: Publisher> Sampler<P> {
    pub fn new(
        sensors: SensorArray,
        publisher: P,
        device_id: impl Into<String>,
        topic: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            sensors,
            publisher,
            device_id: device_id.into(),
            topic: topic.into(),
            interval,
            last_time: None,
        }
    }

    /// Reads every sensor and stamps the result.
    pub async fn sample(&mut self) -> Message {
        let data = self.sensors.read_all().await;
        let time = self.stamp(Utc::now());

        Message {
            data,
            device_id: self.device_id.clone(),
            time,
        }
    }

    // Never hand out a time earlier than the previous message's.
    fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let time = match self.last_time {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_time = Some(time);
        time
    }

    /// One sample-and-publish cycle. Failures are logged, never returned.
    pub async fn tick(&mut self) -> Message {
        let message = self.sample().await;

        let json = match message.to_json() {
            Ok(json) => json,
            Err(err) => {
                error!("failed to serialize message: {err}");
                return message;
            }
        };
        debug!("{json}");

        if let Err(err) = self.publisher.publish(&self.topic, json.into_bytes()).await {
            warn!(topic = %self.topic, "failed to publish message: {err}");
        }

        message
    }

    /// Runs until `shutdown` is cancelled; a tick in progress is completed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            device_id = %self.device_id,
            topic = %self.topic,
            interval = ?self.interval,
            "sampler started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        self.sensors.set_indicator(false);
        info!("sampler stopped");
    }
}
