use std::time::Duration;

use crate::types::TopicName;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connect attempt refused or failed
    #[error("Connection error: {0}")]
    Connection(String),
    /// The established connection went away
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// Request rejected by the broker client
    #[error("Client error: {0}")]
    Client(String),
    #[error("Client not connected")]
    NotConnected,
    #[error("Client not initialized")]
    NotInitialized,
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Unsupported broker url, {0}")]
    UnsupportedBroker(String),
    #[error("Invalid discovery for {topic}, {reason}")]
    InvalidDiscovery { topic: TopicName, reason: &'static str },
    #[error("Invalid qos, {0}")]
    InvalidQoS(u8),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
