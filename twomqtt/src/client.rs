use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::types::{Message, QoS, TopicName};

/// Called for every message matching a subscription
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Called by the client when an established connection is lost
pub type OnConnectionLost = Arc<dyn Fn(Error) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Clone)]
pub struct ClientOptions {
    pub broker: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive: Duration,
    pub connect_timeout: Duration,
    pub last_will: Option<LastWill>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("broker", &self.broker)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_deref().map(twomqtt_utils::redact))
            .field("keepalive", &self.keepalive)
            .field("connect_timeout", &self.connect_timeout)
            .field("last_will", &self.last_will)
            .finish()
    }
}

/// Broker connection capability used by the connection manager.
///
/// `connect` resolves once the broker acknowledged the session. The other calls resolve once the
/// client accepted the request for sending; whether the broker acknowledged it depends on the
/// implementation, and an error only means the request could not be handed over.
#[async_trait]
pub trait BrokerClient: Sync + Send {
    /// Connects and waits for the broker's acknowledgment.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> Result<()>;

    async fn subscribe(&self, filter: &str, qos: QoS, handler: MessageHandler) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Creates broker clients; construction errors are retried like connect errors.
pub trait BrokerClientBuilder: Sync + Send {
    fn build(&self, opts: ClientOptions, on_lost: OnConnectionLost) -> Result<Arc<dyn BrokerClient>>;
}

/// MQTT topic filter matching with `+` and `#` wildcards.
///
/// Topics starting with `$` are not matched by filters starting with a wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        let cases = [
            ("a/b/c", "a/b/c", true),
            ("a/+/c", "a/b/c", true),
            ("a/+", "a/b/c", false),
            ("a/#", "a/b/c", true),
            ("a/#", "a", true),
            ("#", "a/b", true),
            ("+/+", "a/b", true),
            ("a/b", "a/b/c", false),
            ("a/b/c", "a/b", false),
            ("+/b", "/b", true),
            ("#", "$SYS/uptime", false),
            ("$SYS/#", "$SYS/uptime", true),
            ("home/+/command", "home/kitchen/command", true),
        ];
        for (filter, topic, expected) in cases {
            assert_eq!(topic_matches(filter, topic), expected, "{} vs {}", filter, topic);
        }
    }

    #[test]
    fn test_options_debug_redacts_password() {
        let opts = ClientOptions {
            broker: "tcp://localhost:1883".into(),
            client_id: "c".into(),
            username: Some("user".into()),
            password: Some("secret".into()),
            keepalive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            last_will: None,
        };
        let out = format!("{:?}", opts);
        assert!(!out.contains("secret"));
        assert!(out.contains("<REDACTED>"));
    }
}
