use std::time::Duration;

use rumqttc::MqttOptions;
use uuid::Uuid;

use crate::config::BrokerConfig;

/// Clean-session options, so a reconnect never replays messages queued for
/// an earlier session.
pub fn mqtt_options(config: &BrokerConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }

    options
}

pub fn client_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
