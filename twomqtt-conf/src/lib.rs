#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use twomqtt_utils::{deserialize_duration, format_duration, redact, serialize_duration};

pub use self::kv::{deserialize_kv_map, KvMapParser};
pub use self::logging::{Level, Log, To};
pub use self::options::Options;

pub mod kv;
pub mod logger;
pub mod logging;
pub mod options;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone)]
pub struct Inner {
    pub mqtt: Mqtt,
    pub log: Log,
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Loads the broker settings from the optional config files and the `MQTT_*` environment,
    /// and the log settings from the `LOG_*` environment.
    pub fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/twomqtt/twomqtt").required(false))
            .add_source(File::with_name("twomqtt").required(false));

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        let mqtt: Mqtt = builder.add_source(Environment::with_prefix("mqtt")).build()?.try_deserialize()?;

        let mut log: Log =
            Config::builder().add_source(Environment::with_prefix("log")).build()?.try_deserialize()?;

        //Command line configuration overriding environment configuration
        if let Some(level) = opts.log_level {
            log.level = level;
        }

        Ok(Self(Arc::new(Inner { mqtt, log, opts })))
    }

    #[inline]
    pub fn instance() -> Result<&'static Self> {
        SETTINGS.get().ok_or_else(|| anyhow!("Settings not initialized"))
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance()?;
        log::debug!("Config info is {:?}", cfg.0);
        cfg.mqtt.logs();
        log::info!("log is {:?}, level: {}", cfg.log.to, cfg.log.level.as_str());
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

/// Broker connection settings of one adapter process.
///
/// Serializing leaves the password out.
#[derive(Clone, Deserialize, Serialize)]
pub struct Mqtt {
    #[serde(default, alias = "clientid")]
    pub client_id: String,
    #[serde(default = "Mqtt::broker_default")]
    pub broker: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, alias = "topicprefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub discovery: bool,
    #[serde(default = "Mqtt::discovery_prefix_default", alias = "discoveryprefix")]
    pub discovery_prefix: String,
    #[serde(default, alias = "discoveryname")]
    pub discovery_name: String,

    #[serde(
        default = "Mqtt::keepalive_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub keepalive: Duration,
    #[serde(
        default = "Mqtt::connect_timeout_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub connect_timeout: Duration,

    #[serde(
        default = "Mqtt::reconnect_min_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub reconnect_min: Duration,
    #[serde(
        default = "Mqtt::reconnect_max_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub reconnect_max: Duration,
    #[serde(default = "Mqtt::reconnect_multiplier_default")]
    pub reconnect_multiplier: f64,
    #[serde(default = "Mqtt::reconnect_jitter_default")]
    pub reconnect_jitter: f64,
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            client_id: String::default(),
            broker: Self::broker_default(),
            username: String::default(),
            password: String::default(),
            topic_prefix: String::default(),
            discovery: false,
            discovery_prefix: Self::discovery_prefix_default(),
            discovery_name: String::default(),
            keepalive: Self::keepalive_default(),
            connect_timeout: Self::connect_timeout_default(),
            reconnect_min: Self::reconnect_min_default(),
            reconnect_max: Self::reconnect_max_default(),
            reconnect_multiplier: Self::reconnect_multiplier_default(),
            reconnect_jitter: Self::reconnect_jitter_default(),
        }
    }
}

impl Mqtt {
    fn broker_default() -> String {
        "tcp://test.mosquitto.org:1883".into()
    }
    fn discovery_prefix_default() -> String {
        "homeassistant".into()
    }
    fn keepalive_default() -> Duration {
        Duration::from_secs(60)
    }
    fn connect_timeout_default() -> Duration {
        Duration::from_secs(20)
    }
    fn reconnect_min_default() -> Duration {
        Duration::from_millis(100)
    }
    fn reconnect_max_default() -> Duration {
        Duration::from_secs(5 * 60)
    }
    fn reconnect_multiplier_default() -> f64 {
        2.0
    }
    fn reconnect_jitter_default() -> f64 {
        0.5
    }

    /// Logs the effective settings, with the password masked.
    pub fn logs(&self) {
        log::info!("MQTT.ClientID is {:?}", self.client_id);
        log::info!("MQTT.Broker is {:?}", self.broker);
        log::info!("MQTT.Username is {:?}", self.username);
        log::info!("MQTT.Password is {:?}", redact(&self.password));
        log::info!("MQTT.TopicPrefix is {:?}", self.topic_prefix);
        log::info!("MQTT.Discovery is {}", self.discovery);
        log::info!("MQTT.DiscoveryPrefix is {:?}", self.discovery_prefix);
        log::info!("MQTT.DiscoveryName is {:?}", self.discovery_name);
        log::info!(
            "MQTT.KeepAlive is {}, connect timeout: {}",
            format_duration(self.keepalive),
            format_duration(self.connect_timeout)
        );
        log::info!(
            "MQTT.Reconnect is {}..{}, multiplier: {}, jitter: {}",
            format_duration(self.reconnect_min),
            format_duration(self.reconnect_max),
            self.reconnect_multiplier,
            self.reconnect_jitter
        );
    }
}

impl fmt::Debug for Mqtt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mqtt")
            .field("client_id", &self.client_id)
            .field("broker", &self.broker)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("topic_prefix", &self.topic_prefix)
            .field("discovery", &self.discovery)
            .field("discovery_prefix", &self.discovery_prefix)
            .field("discovery_name", &self.discovery_name)
            .field("keepalive", &self.keepalive)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_min", &self.reconnect_min)
            .field("reconnect_max", &self.reconnect_max)
            .field("reconnect_multiplier", &self.reconnect_multiplier)
            .field("reconnect_jitter", &self.reconnect_jitter)
            .finish()
    }
}
