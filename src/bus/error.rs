use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to the broker")]
    NotConnected,

    #[error("MQTT client rejected the request: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("broker did not respond within {0:?}")]
    Timeout(Duration),
}
