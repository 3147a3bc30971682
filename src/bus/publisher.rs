use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bus::{Backoff, TransportError, mqtt_options},
    config::BrokerConfig,
};

/// Publish side of the message bus: at-most-once, no acknowledgement, no
/// local buffering.
pub trait Publisher {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Long-lived MQTT connection for publishing at QoS 0.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

/// How long the driver waits for pending publishes and DISCONNECT to go out
/// once it is told to close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

impl MqttPublisher {
    /// Starts the connection driver. The returned task runs until `close` is
    /// cancelled, then flushes what was already accepted and disconnects.
    /// Cancel `close` only after the last publish.
    pub fn connect(
        config: &BrokerConfig,
        client_id: &str,
        close: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        // One slot: a publish accepted just before the link drops is the most
        // that can be sent late, after a reconnect.
        let (client, eventloop) = AsyncClient::new(mqtt_options(config, client_id), 1);
        let connected = Arc::new(AtomicBool::new(false));

        let driver = tokio::spawn(drive(
            client.clone(),
            eventloop,
            connected.clone(),
            close,
        ));

        (Self { client, connected }, driver)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(TransportError::from)
    }
}

async fn drive(
    client: AsyncClient,
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    close: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        let event = tokio::select! {
            _ = close.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to MQTT broker");
                connected.store(true, Ordering::Release);
                backoff.reset();
            }
            Ok(_) => {}
            Err(err) => {
                connected.store(false, Ordering::Release);
                let delay = backoff.next_delay();
                warn!("MQTT connection error, reconnecting in {delay:?}: {err}");
                tokio::select! {
                    _ = close.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    if connected.swap(false, Ordering::AcqRel) {
        match timeout(CLOSE_TIMEOUT, disconnect(&client, &mut eventloop)).await {
            Ok(Ok(())) => debug!("sent MQTT disconnect"),
            Ok(Err(err)) => warn!("failed to disconnect from MQTT broker: {err}"),
            Err(_) => warn!("timed out disconnecting from MQTT broker"),
        }
    }
    info!("MQTT publisher stopped");
}

/// Polls until DISCONNECT is written. Requests queued ahead of it go out
/// first.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) -> Result<(), TransportError> {
    let mut requested = false;
    loop {
        if !requested {
            // The request channel may still hold a publish; retry once it drains.
            requested = client.try_disconnect().is_ok();
        }

        match eventloop.poll().await? {
            Event::Outgoing(Outgoing::Disconnect) => return Ok(()),
            event => debug!(?event, "MQTT event"),
        }
    }
}

/// Connects, publishes one message at QoS 0 and disconnects.
pub async fn publish_single(
    config: &BrokerConfig,
    client_id: &str,
    topic: &str,
    payload: Vec<u8>,
    limit: Duration,
) -> Result<(), TransportError> {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config, client_id), 10);
    client.publish(topic, QoS::AtMostOnce, false, payload).await?;
    client.disconnect().await?;

    let exchange = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(event) => debug!(?event, "MQTT event"),
                Err(err) => return Err(TransportError::from(err)),
            }
        }
    };

    timeout(limit, exchange)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}
