use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use rumqttc::{AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use url::Url;

use crate::client::{topic_matches, BrokerClient, BrokerClientBuilder, ClientOptions, MessageHandler, OnConnectionLost};
use crate::error::{Error, Result};
use crate::types::{Message, QoS, TopicFilter};

const DEFAULT_PORT: u16 = 1883;
const MIN_KEEPALIVE: Duration = Duration::from_secs(5);

/// Builds [`RumqttClient`]s; `cap` bounds the request channel of each client.
#[derive(Debug, Clone)]
pub struct RumqttBuilder {
    cap: usize,
}

impl Default for RumqttBuilder {
    fn default() -> Self {
        Self { cap: 64 }
    }
}

impl RumqttBuilder {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }
}

impl BrokerClientBuilder for RumqttBuilder {
    fn build(&self, opts: ClientOptions, on_lost: OnConnectionLost) -> Result<Arc<dyn BrokerClient>> {
        Ok(Arc::new(RumqttClient::new(opts, self.cap, on_lost)?))
    }
}

/// [`BrokerClient`] over a rumqttc client and event loop, recreated on every connect.
///
/// `publish` and `subscribe` only queue the request for the event loop; they fail when no
/// connection was established or the event loop has already stopped.
pub struct RumqttClient {
    client_id: String,
    opts: MqttOptions,
    connect_timeout: Duration,
    cap: usize,
    client: RwLock<Option<AsyncClient>>,
    subscriptions: Arc<DashMap<TopicFilter, MessageHandler>>,
    connected: Arc<AtomicBool>,
    on_lost: OnConnectionLost,
}

impl RumqttClient {
    pub fn new(opts: ClientOptions, cap: usize, on_lost: OnConnectionLost) -> Result<Self> {
        let mqtt_opts = mqtt_options(&opts)?;
        Ok(Self {
            client_id: mqtt_opts.client_id(),
            opts: mqtt_opts,
            connect_timeout: opts.connect_timeout,
            cap,
            client: RwLock::new(None),
            subscriptions: Arc::new(DashMap::default()),
            connected: Arc::new(AtomicBool::new(false)),
            on_lost,
        })
    }

    #[inline]
    fn client(&self) -> Result<AsyncClient> {
        self.client.read().clone().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl BrokerClient for RumqttClient {
    async fn connect(&self) -> Result<()> {
        if let Some(prev) = self.client.write().take() {
            let _ = prev.try_disconnect();
        }

        let (client, event_loop) = AsyncClient::new(self.opts.clone(), self.cap);
        let event_loop = tokio::time::timeout(self.connect_timeout, establish_connection(event_loop))
            .await
            .map_err(|_| Error::ConnectTimeout(self.connect_timeout))??;

        log::info!("{} Successfully connected to {:?}", self.client_id, self.opts.broker_address());
        self.connected.store(true, Ordering::SeqCst);
        *self.client.write() = Some(client);

        tokio::spawn(ev_loop(
            self.client_id.clone(),
            event_loop,
            self.subscriptions.clone(),
            self.connected.clone(),
            self.on_lost.clone(),
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let client = self.client.write().take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(client) = client {
            client.disconnect().await.map_err(|e| Error::Client(e.to_string()))?;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> Result<()> {
        self.client()?
            .publish(topic, to_rumqtt_qos(qos), retain, payload.to_vec())
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS, handler: MessageHandler) -> Result<()> {
        let client = self.client()?;
        self.subscriptions.insert(TopicFilter::from(filter), handler);
        client.subscribe(filter, to_rumqtt_qos(qos)).await.map_err(|e| Error::Client(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn establish_connection(mut event_loop: EventLoop) -> Result<EventLoop> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
                return if code == ConnectReturnCode::Success {
                    Ok(event_loop)
                } else {
                    Err(Error::Connection(format!("rejected by broker, {:?}", code)))
                };
            }
            Ok(notification) => {
                log::trace!("Bootstrap phase notification, {:?}", notification);
            }
            Err(e) => return Err(Error::Connection(e.to_string())),
        }
    }
}

async fn ev_loop(
    client_id: String,
    mut event_loop: EventLoop,
    subscriptions: Arc<DashMap<TopicFilter, MessageHandler>>,
    connected: Arc<AtomicBool>,
    on_lost: OnConnectionLost,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let msg = Message {
                    topic: p.topic.into(),
                    payload: p.payload,
                    qos: from_rumqtt_qos(p.qos),
                    retain: p.retain,
                };
                dispatch(&subscriptions, msg);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                log::warn!("{} Disconnected by broker", client_id);
                on_lost(Error::ConnectionLost("disconnected by broker".into()));
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                log::debug!("{} Disconnect sent", client_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                log::warn!("{} Connection to broker lost, {}", client_id, e);
                on_lost(Error::ConnectionLost(e.to_string()));
                break;
            }
        }
    }
    log::debug!("{} Exit event loop", client_id);
}

/// Handlers are collected first so they may subscribe again while running.
fn dispatch(subscriptions: &DashMap<TopicFilter, MessageHandler>, msg: Message) {
    let handlers: Vec<MessageHandler> = subscriptions
        .iter()
        .filter(|entry| topic_matches(entry.key(), &msg.topic))
        .map(|entry| entry.value().clone())
        .collect();
    if handlers.is_empty() {
        log::debug!("No subscription for message on {}", msg.topic);
    }
    for h in handlers {
        h(msg.clone());
    }
}

fn mqtt_options(opts: &ClientOptions) -> Result<MqttOptions> {
    let (host, port) = parse_broker(&opts.broker)?;
    let client_id = if opts.client_id.trim().is_empty() {
        format!("twomqtt-{:08x}", rand::random::<u32>())
    } else {
        opts.client_id.trim().to_owned()
    };

    let mut mqtt_opts = MqttOptions::new(client_id, host, port);
    mqtt_opts.set_keep_alive(opts.keepalive.max(MIN_KEEPALIVE));
    mqtt_opts.set_clean_session(true);
    if let Some(username) = opts.username.as_ref() {
        mqtt_opts.set_credentials(username, opts.password.as_deref().unwrap_or_default());
    }
    if let Some(will) = opts.last_will.as_ref() {
        mqtt_opts.set_last_will(rumqttc::LastWill::new(
            will.topic.to_string(),
            will.payload.to_vec(),
            to_rumqtt_qos(will.qos),
            will.retain,
        ));
    }
    Ok(mqtt_opts)
}

/// Accepts `tcp://`, `mqtt://` or a bare `host[:port]`.
fn parse_broker(broker: &str) -> Result<(String, u16)> {
    let broker = broker.trim();
    let with_scheme = if broker.contains("://") { broker.to_owned() } else { format!("tcp://{}", broker) };
    let url = Url::parse(&with_scheme).map_err(|e| Error::UnsupportedBroker(format!("{}, {}", broker, e)))?;
    match url.scheme() {
        "tcp" | "mqtt" => {}
        scheme => return Err(Error::UnsupportedBroker(format!("scheme {:?} in {}", scheme, broker))),
    }
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::UnsupportedBroker(format!("missing host in {}", broker)))?;
    Ok((host.to_owned(), url.port().unwrap_or(DEFAULT_PORT)))
}

#[inline]
fn to_rumqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[inline]
fn from_rumqtt_qos(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}
