/// Subscribe-side connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

/// Tracks the subscriptions a connection must hold and where it is in the
/// `Disconnected -> Connecting -> Connected -> Subscribed` cycle.
///
/// The broker forgets subscriptions with every clean session, so every
/// CONNACK hands back the full topic list to replay.
#[derive(Debug, Clone)]
pub struct Session {
    topics: Vec<String>,
    state: ConnectionState,
    pending_acks: usize,
}

impl Session {
    pub fn new() -> Self {
        Self {
            topics: Vec::new(),
            state: ConnectionState::Disconnected,
            pending_acks: 0,
        }
    }

    pub fn add_topic(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.pending_acks = 0;
    }

    /// Returns the topics to (re)subscribe.
    pub fn on_connected(&mut self) -> &[String] {
        self.pending_acks = self.topics.len();
        self.state = if self.topics.is_empty() {
            ConnectionState::Subscribed
        } else {
            ConnectionState::Connected
        };

        &self.topics
    }

    pub fn on_subscribe_ack(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.pending_acks = self.pending_acks.saturating_sub(1);
        if self.pending_acks == 0 {
            self.state = ConnectionState::Subscribed;
        }
    }

    pub fn on_connection_lost(&mut self) {
        self.on_connecting();
    }

    pub fn on_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.pending_acks = 0;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
