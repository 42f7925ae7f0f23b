use std::convert::TryFrom;
use std::fmt;

use bytes::Bytes;
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub type TopicName = ByteString;
pub type TopicFilter = ByteString;
pub type Payload = ByteString;

pub const ON: &str = "ON";
pub const OFF: &str = "OFF";
pub const HOME: &str = "home";
pub const NOT_HOME: &str = "not_home";
pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Discovery component kinds
pub const SENSOR: &str = "sensor";
pub const SWITCH: &str = "switch";
pub const BINARY_SENSOR: &str = "binary_sensor";
pub const DEVICE_TRACKER: &str = "device_tracker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    #[inline]
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = Error;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidQoS(v)),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Message delivered to a subscription handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    /// Payload as text, lossy for non UTF-8 bodies
    #[inline]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Options of a single publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub retained: bool,
    pub duplicate_check: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { retained: true, duplicate_check: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos() {
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert!(QoS::try_from(3).is_err());
        assert_eq!(QoS::default().value(), 0);
        assert_eq!(QoS::ExactlyOnce.to_string(), "2");
    }

    #[test]
    fn test_message_payload_str() {
        let m = Message {
            topic: "a/b".into(),
            payload: Bytes::from_static(b"42"),
            qos: QoS::AtMostOnce,
            retain: false,
        };
        assert_eq!(m.payload_str(), "42");
    }
}
