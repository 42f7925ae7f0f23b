#![deny(unsafe_code)]
//! Bridge layer between polled devices and an MQTT broker.
//!
//! A [`ConnectionManager`] owns the broker connection: it keeps the availability topic current,
//! announces sensors through Home Assistant discovery, suppresses duplicate state publishes and
//! reconnects with backoff. Device pollers and drivers talk to it through the state and command
//! buses in [`bus`].

pub mod bus;
pub mod cache;
pub mod client;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod naming;
pub mod reconnect;
#[cfg(feature = "rumqtt")]
pub mod rumqtt;
pub mod schema;
pub mod stats;
pub mod types;

pub use twomqtt_conf as conf;
pub use twomqtt_utils as utils;

pub use crate::bus::{Command, CommandObserver, CommandPublisher, Event, StateObserver, StatePublisher};
pub use crate::cache::PublishCache;
pub use crate::client::{BrokerClient, BrokerClientBuilder, ClientOptions, LastWill, MessageHandler};
pub use crate::discovery::{Discovery, DiscoveryDevice};
pub use crate::error::{Error, Result};
pub use crate::manager::{ConnectionHooks, ConnectionManager, ConnectionState};
pub use crate::reconnect::ReconnectBackoff;
pub use crate::schema::{SensorField, SensorSchema};
pub use crate::types::{
    Message, Payload, PublishOptions, QoS, TopicFilter, TopicName, BINARY_SENSOR, DEVICE_TRACKER, HOME,
    NOT_HOME, OFF, OFFLINE, ON, ONLINE, SENSOR, SWITCH,
};
