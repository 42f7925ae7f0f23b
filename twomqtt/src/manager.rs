use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use twomqtt_conf::Mqtt;

use crate::cache::PublishCache;
use crate::client::{BrokerClient, BrokerClientBuilder, ClientOptions, LastWill, MessageHandler, OnConnectionLost};
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::naming;
use crate::reconnect::ReconnectBackoff;
use crate::schema::SensorSchema;
use crate::stats::Stats;
use crate::types::{Message, Payload, PublishOptions, QoS, TopicName, OFFLINE, ONLINE, SWITCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Adapter callbacks run by the manager around each connection.
///
/// After every successful connect the manager publishes `online`, then calls, in order,
/// [`discovery`](ConnectionHooks::discovery) (only when discovery is enabled),
/// [`subscribe`](ConnectionHooks::subscribe) and [`connected`](ConnectionHooks::connected).
#[async_trait]
pub trait ConnectionHooks: Sync + Send {
    /// Descriptors to announce, published in the returned order
    async fn discovery(&self, _mgr: &ConnectionManager) -> Vec<Discovery> {
        Vec::new()
    }

    /// (Re)establishes subscriptions
    async fn subscribe(&self, _mgr: &ConnectionManager) {}

    async fn connected(&self, _mgr: &ConnectionManager) {}

    async fn disconnected(&self, _mgr: &ConnectionManager, _reason: &Error) {}
}

/// Owner of the single broker connection of an adapter process.
///
/// All publishes and subscriptions go through the manager, which keeps the availability topic and
/// the publish cache consistent. Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: Mqtt,
    availability_topic: TopicName,
    builder: Box<dyn BrokerClientBuilder>,
    client: RwLock<Option<Arc<dyn BrokerClient>>>,
    hooks: RwLock<Option<Arc<dyn ConnectionHooks>>>,
    initialized: AtomicBool,
    closed: AtomicBool,
    /// Loss reported by the client while a connect attempt was in flight
    pending_loss: AtomicBool,
    state: RwLock<ConnectionState>,
    cache: PublishCache,
    backoff: Mutex<ReconnectBackoff>,
    stats: Stats,
}

impl ConnectionManager {
    pub fn new<B>(cfg: Mqtt, builder: B) -> Self
    where
        B: BrokerClientBuilder + 'static,
    {
        let availability_topic = naming::availability_topic(&cfg.topic_prefix).into();
        let backoff = ReconnectBackoff::from_config(&cfg);
        Self {
            inner: Arc::new(Inner {
                cfg,
                availability_topic,
                builder: Box::new(builder),
                client: RwLock::new(None),
                hooks: RwLock::new(None),
                initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                pending_loss: AtomicBool::new(false),
                state: RwLock::new(ConnectionState::Disconnected),
                cache: PublishCache::new(),
                backoff: Mutex::new(backoff),
                stats: Stats::default(),
            }),
        }
    }

    /// Manager backed by the bundled rumqttc client
    #[cfg(feature = "rumqtt")]
    pub fn with_rumqtt(cfg: Mqtt) -> Self {
        Self::new(cfg, crate::rumqtt::RumqttBuilder::default())
    }

    /// Stores the hooks and builds the broker client, last will included.
    ///
    /// A client that cannot be built yet is built again by [`run`](Self::run) on every attempt.
    pub fn initialize(&self, hooks: Option<Arc<dyn ConnectionHooks>>) {
        *self.inner.hooks.write() = hooks;
        self.inner.initialized.store(true, Ordering::SeqCst);
        match self.build_client() {
            Ok(client) => *self.inner.client.write() = Some(client),
            Err(e) => log::warn!("Error creating MQTT client, {}, retrying on connect", e),
        }
    }

    /// Connects, retrying with backoff until it succeeds, then runs the on-connect sequence.
    ///
    /// Returns early only if [`disconnect`](Self::disconnect) is called while retrying.
    pub async fn run(&self) {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            log::warn!("MQTT connection manager not initialized, initializing without hooks");
            self.initialize(None);
        }
        self.inner.closed.store(false, Ordering::SeqCst);
        self.connect_loop().await;
    }

    async fn connect_loop(&self) {
        log::info!("Connecting to MQTT, broker: {}", self.inner.cfg.broker);
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.is_closed() {
                log::info!("Stopped (re)connecting to MQTT, connection closed");
                return;
            }
            self.inner.pending_loss.store(false, Ordering::SeqCst);
            let res = match self.connect_once().await {
                Ok(()) => self.mark_connected(),
                Err(e) => Err(e),
            };
            match res {
                Ok(true) => break,
                Ok(false) => return,
                Err(e) => {
                    log::error!("Error connecting to MQTT, {}", e);
                    let delay = self.inner.backoff.lock().next_delay();
                    log::debug!("Delayed (re)connecting to MQTT, delay: {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.inner.backoff.lock().reset();
        self.inner.stats.connects.inc();
        self.on_connected().await;
    }

    /// Moves `Connecting` to `Connected` under the state lock, unless the connection was lost or
    /// closed while the attempt was in flight. `Ok(false)` means closed.
    fn mark_connected(&self) -> Result<bool> {
        let mut state = self.inner.state.write();
        if *state != ConnectionState::Connecting || self.is_closed() {
            return Ok(false);
        }
        if self.inner.pending_loss.swap(false, Ordering::SeqCst) {
            return Err(Error::ConnectionLost("lost while connecting".into()));
        }
        *state = ConnectionState::Connected;
        Ok(true)
    }

    async fn connect_once(&self) -> Result<()> {
        let client = match self.client() {
            Some(client) => client,
            None => {
                let client = self.build_client()?;
                *self.inner.client.write() = Some(client.clone());
                client
            }
        };
        client.connect().await
    }

    async fn on_connected(&self) {
        log::info!("Connected to MQTT");
        self.publish_with_options(
            self.inner.availability_topic.clone(),
            ONLINE,
            PublishOptions { retained: true, duplicate_check: false },
        )
        .await;

        let Some(hooks) = self.hooks() else {
            return;
        };
        if self.inner.cfg.discovery {
            for d in hooks.discovery(self).await {
                if let Err(e) = self.publish_discovery(&d).await {
                    log::error!("Error publishing discovery, {}", e);
                }
            }
        }
        hooks.subscribe(self).await;
        hooks.connected(self).await;
    }

    fn connection_lost(&self, err: Error) {
        {
            let mut state = self.inner.state.write();
            match *state {
                ConnectionState::Connected => {}
                ConnectionState::Connecting => {
                    log::warn!("MQTT connection lost while connecting, {}", err);
                    self.inner.pending_loss.store(true, Ordering::SeqCst);
                    return;
                }
                ConnectionState::Disconnected => {
                    log::debug!("Ignored MQTT connection loss after disconnect, {}", err);
                    return;
                }
            }
            *state = ConnectionState::Connecting;
        }
        self.inner.stats.connection_losses.inc();

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Disconnected from MQTT, {}, no runtime to reconnect on, {}", err, e);
                return;
            }
        };
        let mgr = self.clone();
        handle.spawn(async move {
            if let Some(hooks) = mgr.hooks() {
                hooks.disconnected(&mgr, &err).await;
            }
            log::error!("Disconnected from MQTT, {}", err);
            mgr.connect_loop().await;
        });
    }

    fn build_client(&self) -> Result<Arc<dyn BrokerClient>> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_lost: OnConnectionLost = Arc::new(move |err| {
            if let Some(inner) = weak.upgrade() {
                ConnectionManager { inner }.connection_lost(err);
            }
        });
        self.inner.builder.build(self.client_options(), on_lost)
    }

    fn client_options(&self) -> ClientOptions {
        let cfg = &self.inner.cfg;
        let non_empty = |s: &String| if s.is_empty() { None } else { Some(s.clone()) };
        ClientOptions {
            broker: cfg.broker.clone(),
            client_id: cfg.client_id.clone(),
            username: non_empty(&cfg.username),
            password: non_empty(&cfg.password),
            keepalive: cfg.keepalive,
            connect_timeout: cfg.connect_timeout,
            last_will: Some(LastWill {
                topic: self.inner.availability_topic.clone(),
                payload: Bytes::from_static(OFFLINE.as_bytes()),
                qos: QoS::AtMostOnce,
                retain: true,
            }),
        }
    }

    /// Publishes `offline`, closes the client and stops reconnecting.
    pub async fn disconnect(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let prev = std::mem::replace(&mut *self.inner.state.write(), ConnectionState::Disconnected);
        if prev == ConnectionState::Connected {
            self.publish_with_options(
                self.inner.availability_topic.clone(),
                OFFLINE,
                PublishOptions { retained: true, duplicate_check: false },
            )
            .await;
        }
        if let Some(client) = self.client() {
            if let Err(e) = client.disconnect().await {
                log::warn!("Error disconnecting from MQTT, {}", e);
            }
        }
        log::info!("Disconnected from MQTT");
    }

    /// Publishes `payload` on `topic` unless it repeats the last payload attempted on that topic.
    ///
    /// The availability topic is always published. Broker errors are logged, and the payload is
    /// recorded as the last attempt either way. Returns whether a publish was attempted.
    pub async fn publish_with_options<T, P>(&self, topic: T, payload: P, opts: PublishOptions) -> bool
    where
        T: Into<TopicName>,
        P: Into<Payload>,
    {
        let topic = topic.into();
        let payload = payload.into();

        let guard = self.inner.cache.lock(&topic).await;
        if opts.duplicate_check && topic != self.inner.availability_topic && guard.is_duplicate(&payload) {
            log::debug!("Duplicate avoided while publishing to MQTT, topic: {}, payload: {}", topic, payload);
            self.inner.stats.duplicates.inc();
            return false;
        }

        log::info!("Publishing to MQTT, topic: {}, payload: {}", topic, payload);
        self.inner.stats.publishes.inc();
        let res = match self.client() {
            Some(client) => client.publish(&topic, QoS::AtMostOnce, opts.retained, payload.as_bytes().clone()).await,
            None => Err(Error::NotInitialized),
        };
        if let Err(e) = res {
            self.inner.stats.publish_failures.inc();
            log::error!("Error publishing to MQTT, topic: {}, {}", topic, e);
        }
        log::info!("Finished publishing to MQTT, topic: {}", topic);

        guard.record(payload);
        true
    }

    /// Retained publish with duplicate suppression
    #[inline]
    pub async fn publish<T, P>(&self, topic: T, payload: P) -> bool
    where
        T: Into<TopicName>,
        P: Into<Payload>,
    {
        self.publish_with_options(topic, payload, PublishOptions::default()).await
    }

    /// Publishes the descriptor to its config topic. Invalid descriptors are rejected unpublished.
    pub async fn publish_discovery(&self, discovery: &Discovery) -> Result<()> {
        let payload = discovery.to_payload()?;
        self.publish(discovery.topic(), payload).await;
        Ok(())
    }

    pub async fn subscribe<F>(&self, filter: &str, qos: QoS, handler: F) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        log::info!("Subscribing to MQTT topic, topic: {}, qos: {}", filter, qos);
        let client = self.client().ok_or(Error::NotInitialized)?;
        let handler: MessageHandler = Arc::new(handler);
        let res = client.subscribe(filter, qos, handler).await;
        match &res {
            Ok(()) => log::info!("Finished subscribing to MQTT topic, topic: {}", filter),
            Err(e) => log::error!("Error subscribing to MQTT topic, topic: {}, {}", filter, e),
        }
        res
    }

    /// Last payload attempted on `topic`, empty when nothing was published there yet
    #[inline]
    pub fn last_published_on_topic(&self, topic: &str) -> Payload {
        self.inner.cache.get(topic).unwrap_or_default()
    }

    /// Discovery descriptor of `sensor` on `device` for this connection's prefixes and names
    #[inline]
    pub fn new_discovery(&self, device: &str, sensor: &str, component: &str) -> Discovery {
        Discovery::new(&self.inner.cfg, device, sensor, component)
    }

    /// Descriptors for every announced field of `T`; switches also get their command topic.
    pub fn schema_discovery<T: SensorSchema>(&self, device: &str) -> Vec<Discovery> {
        T::announced()
            .map(|f| {
                let d = self.new_discovery(device, f.name, f.component);
                if f.component == SWITCH {
                    d.with_command_topic(self.command_topic(device, f.name).to_string())
                } else {
                    d
                }
            })
            .collect()
    }

    /// Publishes the state of every announced field of `value` that currently has one.
    pub async fn publish_sensors<T: SensorSchema + Sync>(&self, device: &str, value: &T) {
        for f in T::announced() {
            if let Some(v) = value.sensor_value(f.name) {
                self.publish(self.state_topic(device, f.name), v).await;
            }
        }
    }

    #[inline]
    pub fn availability_topic(&self) -> TopicName {
        self.inner.availability_topic.clone()
    }

    #[inline]
    pub fn state_topic(&self, device: &str, sensor: &str) -> TopicName {
        naming::state_topic(&self.inner.cfg.topic_prefix, device, sensor).into()
    }

    #[inline]
    pub fn command_topic(&self, device: &str, sensor: &str) -> TopicName {
        naming::command_topic(&self.inner.cfg.topic_prefix, device, sensor).into()
    }

    #[inline]
    pub fn config(&self) -> &Mqtt {
        &self.inner.cfg
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    #[inline]
    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    #[inline]
    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.write() = state;
    }

    #[inline]
    fn client(&self) -> Option<Arc<dyn BrokerClient>> {
        self.inner.client.read().clone()
    }

    #[inline]
    fn hooks(&self) -> Option<Arc<dyn ConnectionHooks>> {
        self.inner.hooks.read().clone()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("broker", &self.inner.cfg.broker)
            .field("state", &self.state())
            .field("topics", &self.inner.cache.len())
            .finish()
    }
}
