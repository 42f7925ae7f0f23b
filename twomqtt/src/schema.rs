//! Static per-type field lists describing which values of a device reading become sensors.
//!
//! ```
//! use twomqtt::schema::{SensorField, SensorSchema};
//! use twomqtt::{BINARY_SENSOR, ON, OFF};
//!
//! struct Garage {
//!     door_open: bool,
//!     temperature: f64,
//!     serial: String,
//! }
//!
//! impl SensorSchema for Garage {
//!     const FIELDS: &'static [SensorField] = &[
//!         SensorField::new("door", BINARY_SENSOR),
//!         SensorField::sensor("temperature"),
//!         SensorField::ignored("serial"),
//!     ];
//!
//!     fn sensor_value(&self, name: &str) -> Option<String> {
//!         match name {
//!             "door" => Some(if self.door_open { ON } else { OFF }.to_string()),
//!             "temperature" => Some(format!("{:.1}", self.temperature)),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let announced: Vec<&str> = Garage::announced().map(|f| f.name).collect();
//! assert_eq!(announced, ["door", "temperature"]);
//! ```

use crate::types::SENSOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorField {
    /// Sensor name, also the last topic level and object id part
    pub name: &'static str,
    /// Discovery component kind
    pub component: &'static str,
    /// Neither announced nor published
    pub ignore: bool,
}

impl SensorField {
    #[inline]
    pub const fn new(name: &'static str, component: &'static str) -> Self {
        Self { name, component, ignore: false }
    }

    #[inline]
    pub const fn sensor(name: &'static str) -> Self {
        Self::new(name, SENSOR)
    }

    #[inline]
    pub const fn ignored(name: &'static str) -> Self {
        Self { name, component: SENSOR, ignore: true }
    }
}

pub trait SensorSchema {
    const FIELDS: &'static [SensorField];

    /// Current state payload of the field `name`, `None` when it has no value to publish
    fn sensor_value(&self, name: &str) -> Option<String>;

    #[inline]
    fn announced() -> impl Iterator<Item = &'static SensorField> {
        Self::FIELDS.iter().filter(|f| !f.ignore)
    }
}
