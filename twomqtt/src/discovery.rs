use serde::Serialize;

use twomqtt_conf::Mqtt;

use crate::error::{Error, Result};
use crate::naming;
use crate::types::{Payload, TopicName};

pub const MANUFACTURER: &str = "twomqtt";

/// Discovery announcement of one sensor or actuator.
///
/// The routing fields (`discovery_prefix`, `component`, `node_id`, `object_id`) only shape the
/// config topic and are never part of the payload. Every other field is written in snake_case and
/// left out when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Discovery {
    #[serde(skip)]
    pub discovery_prefix: String,
    #[serde(skip)]
    pub component: String,
    #[serde(skip)]
    pub node_id: String,
    #[serde(skip)]
    pub object_id: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub availability_topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payload_available: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payload_not_available: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state_topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub json_attributes_topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unique_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_class: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_of_measurement: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value_template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payload_on: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payload_off: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DiscoveryDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryDevice {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manufacturer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sw_version: String,
}

impl Discovery {
    /// Fills the descriptor of `sensor` on `device` from the connection settings.
    pub fn new(cfg: &Mqtt, device: &str, sensor: &str, component: &str) -> Self {
        let availability_topic = naming::availability_topic(&cfg.topic_prefix);
        Discovery {
            discovery_prefix: cfg.discovery_prefix.clone(),
            component: component.into(),
            node_id: cfg.discovery_name.clone(),
            object_id: naming::object_id(device, sensor),
            name: naming::display_name(&cfg.discovery_name, device, sensor),
            state_topic: naming::state_topic(&cfg.topic_prefix, device, sensor),
            unique_id: naming::unique_id(&cfg.discovery_name, device, sensor),
            device: Some(DiscoveryDevice {
                identifiers: vec![availability_topic.clone()],
                manufacturer: MANUFACTURER.into(),
                name: cfg.discovery_name.clone(),
                ..Default::default()
            }),
            availability_topic,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_command_topic<T: Into<String>>(mut self, topic: T) -> Self {
        self.command_topic = topic.into();
        self
    }

    #[inline]
    pub fn with_device_class<T: Into<String>>(mut self, device_class: T) -> Self {
        self.device_class = device_class.into();
        self
    }

    #[inline]
    pub fn with_icon<T: Into<String>>(mut self, icon: T) -> Self {
        self.icon = icon.into();
        self
    }

    #[inline]
    pub fn with_unit_of_measurement<T: Into<String>>(mut self, unit: T) -> Self {
        self.unit_of_measurement = unit.into();
        self
    }

    #[inline]
    pub fn with_value_template<T: Into<String>>(mut self, template: T) -> Self {
        self.value_template = template.into();
        self
    }

    #[inline]
    pub fn with_payloads<T: Into<String>>(mut self, on: T, off: T) -> Self {
        self.payload_on = on.into();
        self.payload_off = off.into();
        self
    }

    #[inline]
    pub fn with_sw_version<T: Into<String>>(mut self, version: T) -> Self {
        if let Some(device) = self.device.as_mut() {
            device.sw_version = version.into();
        }
        self
    }

    /// `{discovery_prefix}/{component}/{node_id}/{object_id}/config`
    #[inline]
    pub fn topic(&self) -> TopicName {
        naming::discovery_topic(&self.discovery_prefix, &self.component, &self.node_id, &self.object_id).into()
    }

    /// Rejects descriptors whose config topic would be ambiguous or invalid.
    pub fn validate(&self) -> Result<()> {
        let parts = [
            (&self.component, "empty component"),
            (&self.node_id, "empty node id"),
            (&self.object_id, "empty object id"),
        ];
        for (part, reason) in parts {
            if part.is_empty() {
                return Err(self.invalid(reason));
            }
        }
        let routing = [&self.discovery_prefix, &self.component, &self.node_id, &self.object_id];
        if routing.iter().any(|p| p.contains(['+', '#'])) {
            return Err(self.invalid("wildcard in topic"));
        }
        if [&self.component, &self.node_id, &self.object_id].iter().any(|p| p.contains('/')) {
            return Err(self.invalid("separator in topic level"));
        }
        Ok(())
    }

    #[inline]
    fn invalid(&self, reason: &'static str) -> Error {
        Error::InvalidDiscovery { topic: self.topic(), reason }
    }

    /// Validated JSON payload
    pub fn to_payload(&self) -> Result<Payload> {
        self.validate()?;
        Ok(serde_json::to_string(self)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Mqtt {
        Mqtt {
            topic_prefix: "home/poller".into(),
            discovery_prefix: "homeassistant".into(),
            discovery_name: "poller".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new() {
        let d = Discovery::new(&cfg(), "Kitchen", "Temp", crate::types::SENSOR);
        assert_eq!(d.topic(), "homeassistant/sensor/poller/kitchen_temp/config");
        assert_eq!(d.availability_topic, "home/poller/status");
        assert_eq!(d.name, "poller kitchen temp");
        assert_eq!(d.state_topic, "home/poller/kitchen/temp/state");
        assert_eq!(d.unique_id, "poller.kitchen.temp");
        let device = d.device.as_ref().unwrap();
        assert_eq!(device.identifiers, vec!["home/poller/status".to_string()]);
        assert_eq!(device.manufacturer, "twomqtt");
        assert_eq!(device.name, "poller");
        assert!(d.command_topic.is_empty());
    }

    #[test]
    fn test_payload_omits_empty_and_routing_fields() {
        let d = Discovery::new(&cfg(), "", "Temp", crate::types::SENSOR).with_unit_of_measurement("°C");
        let v: serde_json::Value = serde_json::from_str(&d.to_payload().unwrap()).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj["name"], "poller temp");
        assert_eq!(obj["unit_of_measurement"], "°C");
        assert_eq!(obj["device"]["manufacturer"], "twomqtt");
        for key in ["discovery_prefix", "component", "node_id", "object_id", "command_topic", "icon", "force_update"] {
            assert!(!obj.contains_key(key), "{} should be omitted", key);
        }
        assert!(!obj["device"].as_object().unwrap().contains_key("model"));
    }

    #[test]
    fn test_validate() {
        let d = Discovery::new(&cfg(), "a", "b", "");
        assert!(matches!(d.to_payload(), Err(Error::InvalidDiscovery { reason: "empty component", .. })));

        let d = Discovery::new(&Mqtt { discovery_name: "".into(), ..cfg() }, "a", "b", "switch");
        assert!(matches!(d.validate(), Err(Error::InvalidDiscovery { reason: "empty node id", .. })));

        let d = Discovery::new(&cfg(), "a/b", "c", "switch");
        assert!(matches!(d.validate(), Err(Error::InvalidDiscovery { .. })));

        let d = Discovery::new(&cfg(), "a", "#", "switch");
        assert!(matches!(d.validate(), Err(Error::InvalidDiscovery { reason: "wildcard in topic", .. })));

        let d = Discovery::new(&cfg(), "a", "b", "switch").with_command_topic("home/poller/a/b/command");
        assert!(d.validate().is_ok());
    }
}
