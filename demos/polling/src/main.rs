#![deny(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use structopt::StructOpt;

use twomqtt::conf::logger::{config_logger, logger_init};
use twomqtt::conf::{Options, Settings};
use twomqtt::{
    Command, CommandObserver, CommandPublisher, ConnectionHooks, ConnectionManager, Discovery, Error, Event,
    Message, QoS, SensorField, SensorSchema, StateObserver, StatePublisher, BINARY_SENSOR, OFF, ON, SWITCH,
};
use twomqtt_utils::to_duration;

const DEVICE: &str = "Thermostat";
const CMD_HEATER: Command = 1;

#[derive(StructOpt, Debug)]
struct DemoOptions {
    #[structopt(flatten)]
    conf: Options,

    /// Poll interval, e.g. 30s or 1m
    #[structopt(long, default_value = "30s", parse(from_str = to_duration))]
    interval: Duration,
}

#[derive(Debug, Clone)]
struct Reading {
    temperature: f64,
    humidity: f64,
    heating: bool,
    window_open: bool,
    serial: String,
}

impl SensorSchema for Reading {
    const FIELDS: &'static [SensorField] = &[
        SensorField::sensor("temperature"),
        SensorField::sensor("humidity"),
        SensorField::new("heating", SWITCH),
        SensorField::new("window", BINARY_SENSOR),
        SensorField::ignored("serial"),
    ];

    fn sensor_value(&self, name: &str) -> Option<String> {
        match name {
            "temperature" => Some(format!("{:.1}", self.temperature)),
            "humidity" => Some(format!("{:.0}", self.humidity)),
            "heating" => Some(on_off(self.heating).into()),
            "window" => Some(on_off(self.window_open).into()),
            _ => None,
        }
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        ON
    } else {
        OFF
    }
}

/// Simulated device: heater relay plus noisy sensors.
#[derive(Default)]
struct Heater {
    on: AtomicBool,
}

impl Heater {
    fn poll(&self) -> Reading {
        let heating = self.on.load(Ordering::SeqCst);
        let base = if heating { 21.0 } else { 18.0 };
        Reading {
            temperature: base + rand::random::<f64>(),
            humidity: 40.0 + rand::random::<f64>() * 10.0,
            heating,
            window_open: rand::random::<f64>() < 0.1,
            serial: "TH-0001".into(),
        }
    }
}

impl CommandObserver for Heater {
    fn receive_command(&self, cmd: Command, event: &Event) {
        match (cmd, event.downcast_ref::<bool>()) {
            (CMD_HEATER, Some(on)) => {
                log::info!("Switching heater, on: {}", on);
                self.on.store(*on, Ordering::SeqCst);
            }
            _ => log::debug!("Ignored command {}, {:?}", cmd, event),
        }
    }
}

/// Publishes every reading seen on the state bus.
struct MqttPublisher {
    mgr: ConnectionManager,
}

impl StateObserver for MqttPublisher {
    fn receive_state(&self, event: &Event) {
        let Some(reading) = event.downcast_ref::<Reading>().cloned() else {
            return;
        };
        log::debug!("Publishing reading of {}", reading.serial);
        let mgr = self.mgr.clone();
        tokio::spawn(async move {
            mgr.publish_sensors(DEVICE, &reading).await;
        });
    }
}

struct Hooks {
    commands: Arc<CommandPublisher>,
}

#[async_trait]
impl ConnectionHooks for Hooks {
    async fn discovery(&self, mgr: &ConnectionManager) -> Vec<Discovery> {
        mgr.schema_discovery::<Reading>(DEVICE)
            .into_iter()
            .map(|d| match d.object_id.as_str() {
                "thermostat_temperature" => d.with_device_class("temperature").with_unit_of_measurement("°C"),
                "thermostat_humidity" => d.with_device_class("humidity").with_unit_of_measurement("%"),
                "thermostat_window" => d.with_device_class("window"),
                _ => d.with_icon("mdi:radiator"),
            })
            .map(|d| d.with_sw_version(env!("CARGO_PKG_VERSION")))
            .collect()
    }

    async fn subscribe(&self, mgr: &ConnectionManager) {
        let commands = self.commands.clone();
        let topic = mgr.command_topic(DEVICE, "heating");
        let res = mgr
            .subscribe(&topic, QoS::AtMostOnce, move |m: Message| match &*m.payload_str() {
                ON => commands.send_command(CMD_HEATER, Event::new(true)),
                OFF => commands.send_command(CMD_HEATER, Event::new(false)),
                other => log::warn!("Unknown heater command, topic: {}, payload: {}", m.topic, other),
            })
            .await;
        if let Err(e) = res {
            log::error!("Subscribe to {} failed, {}", topic, e);
        }
    }

    async fn disconnected(&self, _mgr: &ConnectionManager, reason: &Error) {
        log::warn!("Lost MQTT connection, {}", reason);
    }
}

#[tokio::main]
async fn main() {
    let opts = DemoOptions::from_args();

    //init config
    let settings = Settings::init(opts.conf).expect("settings init failed");

    //init log
    let logger = config_logger(&settings.log).expect("logger config failed");
    logger_init(logger, settings.log.level).expect("logger init failed");
    let _ = Settings::logs();

    let heater = Arc::new(Heater::default());
    let states = Arc::new(StatePublisher::default());
    let commands = Arc::new(CommandPublisher::default());
    commands.register(heater.clone());

    let mgr = ConnectionManager::with_rumqtt(settings.mqtt.clone());
    states.register(Arc::new(MqttPublisher { mgr: mgr.clone() }));
    let hooks: Arc<dyn ConnectionHooks> = Arc::new(Hooks { commands: commands.clone() });
    mgr.initialize(Some(hooks));

    let runner = mgr.clone();
    tokio::spawn(async move { runner.run().await });

    let interval = opts.interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            states.send_state(Event::new(heater.poll()));
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Waiting for shutdown signal failed, {}", e);
    }
    log::info!("Shutting down, stats: {}", mgr.stats().to_json());
    mgr.disconnect().await;
}
