use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS, SubscribeReasonCode};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{Backoff, ConnectionState, Session, mqtt_options},
    config::BrokerConfig,
};

/// Subscribe side of the message bus. Subscriptions are replayed on every
/// reconnect, so callers never see a connection drop.
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    session: Session,
    backoff: Backoff,
    state: watch::Sender<ConnectionState>,
}

impl MqttSubscriber {
    /// Prepares a connection; nothing touches the network until [`run`].
    ///
    /// [`run`]: MqttSubscriber::run
    pub fn connect(config: &BrokerConfig, client_id: &str) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config, client_id), 10);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            client,
            eventloop,
            session: Session::new(),
            backoff: Backoff::default(),
            state,
        }
    }

    pub fn subscribe(&mut self, topic: impl Into<String>) {
        self.session.add_topic(topic);
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Delivers every inbound message to `handler`, one at a time and in
    /// receipt order, until `shutdown` is cancelled. `handler` must not block:
    /// keep-alives are only sent while this loop is polling.
    pub async fn run<H>(mut self, mut handler: H, shutdown: CancellationToken)
    where
        H: FnMut(&str, &[u8]),
    {
        self.session.on_connecting();
        self.publish_state();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(
                        session_present = ack.session_present,
                        "connected to MQTT broker"
                    );
                    self.backoff.reset();
                    self.resubscribe();
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        error!(pkid = ack.pkid, "broker rejected subscription");
                    }
                    self.session.on_subscribe_ack();
                    self.publish_state();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "message received");
                    handler(&publish.topic, &publish.payload[..]);
                }
                Ok(_) => {}
                Err(err) => {
                    self.session.on_connection_lost();
                    self.publish_state();
                    let delay = self.backoff.next_delay();
                    warn!("MQTT connection lost, reconnecting in {delay:?}: {err}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(err) = self.client.try_disconnect() {
            debug!("failed to send MQTT disconnect: {err}");
        }
        self.session.on_closed();
        self.publish_state();
        info!("MQTT subscriber stopped");
    }

    fn resubscribe(&mut self) {
        let topics = self.session.on_connected().to_vec();
        for topic in &topics {
            match self.client.try_subscribe(topic, QoS::AtMostOnce) {
                Ok(()) => info!(topic = %topic, "subscribing"),
                Err(err) => error!(topic = %topic, "failed to request subscription: {err}"),
            }
        }
        self.publish_state();
    }

    fn publish_state(&self) {
        self.state.send_replace(self.session.state());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::mpsc, time::timeout};

    use super::*;
    use crate::bus::fake_broker::FakeBroker;

    fn unreachable_broker() -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }

    #[tokio::test]
    async fn keeps_reconnecting_until_cancelled() {
        let mut subscriber = MqttSubscriber::connect(&unreachable_broker(), "test-subscriber");
        subscriber.subscribe("sensor/output");
        let mut state = subscriber.state();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(subscriber.run(|_, _| {}, shutdown.clone()));

        state
            .wait_for(|s| *s == ConnectionState::Connecting)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn resubscribes_after_connection_drop() {
        let broker = FakeBroker::bind().await;
        let mut subscriber = MqttSubscriber::connect(&broker.config(), "test-subscriber");
        subscriber.subscribe("sensor/output");
        let mut state = subscriber.state();
        let (received_tx, mut received) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(subscriber.run(
            move |topic, payload| {
                let _ = received_tx.send((topic.to_string(), payload.to_vec()));
            },
            shutdown.clone(),
        ));

        let mut first = timeout(Duration::from_secs(5), broker.accept()).await.unwrap();
        assert_eq!(first.accept_subscribe().await, "sensor/output");
        state
            .wait_for(|s| *s == ConnectionState::Subscribed)
            .await
            .unwrap();
        drop(first);

        let mut second = timeout(Duration::from_secs(5), broker.accept()).await.unwrap();
        assert_eq!(second.accept_subscribe().await, "sensor/output");
        state
            .wait_for(|s| *s == ConnectionState::Subscribed)
            .await
            .unwrap();

        second.publish("sensor/output", b"{}").await;
        let (topic, payload) = timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic, "sensor/output");
        assert_eq!(payload, b"{}");

        shutdown.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
