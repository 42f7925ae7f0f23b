//! Topic and identifier naming
//!
//! Every name derived from a (device, sensor) pair goes through [`slug`]; the builders below only
//! differ by separator and by the leading discovery name:
//!
//! | builder | separator | example (`dname`, `Name`, `Sensor`) |
//! |---|---|---|
//! | [`topic_fragment`] | `/` | `name/sensor` |
//! | [`object_id`] | `_` | `name_sensor` |
//! | [`display_name`] | ` ` | `dname name sensor` |
//! | [`unique_id`] | `.` | `dname.name.sensor` |
//!
//! An empty device name never produces a stray separator: `slug("", "Sensor", "/")` is `sensor`.

/// Joins `device` and `sensor` with `sep` and lower-cases the result.
#[inline]
pub fn slug(device: &str, sensor: &str, sep: &str) -> String {
    if device.is_empty() {
        sensor.to_lowercase()
    } else {
        format!("{}{}{}", device, sep, sensor).to_lowercase()
    }
}

#[inline]
pub fn topic_fragment(device: &str, sensor: &str) -> String {
    slug(device, sensor, "/")
}

#[inline]
pub fn object_id(device: &str, sensor: &str) -> String {
    slug(device, sensor, "_")
}

#[inline]
pub fn display_name(discovery_name: &str, device: &str, sensor: &str) -> String {
    format!("{} {}", discovery_name, slug(device, sensor, " "))
}

#[inline]
pub fn unique_id(discovery_name: &str, device: &str, sensor: &str) -> String {
    format!("{}.{}", discovery_name, slug(device, sensor, "."))
}

#[inline]
pub fn availability_topic(prefix: &str) -> String {
    format!("{}/status", prefix)
}

#[inline]
pub fn state_topic(prefix: &str, device: &str, sensor: &str) -> String {
    format!("{}/{}/state", prefix, topic_fragment(device, sensor))
}

#[inline]
pub fn command_topic(prefix: &str, device: &str, sensor: &str) -> String {
    format!("{}/{}/command", prefix, topic_fragment(device, sensor))
}

#[inline]
pub fn discovery_topic(discovery_prefix: &str, component: &str, node_id: &str, object_id: &str) -> String {
    format!("{}/{}/{}/{}/config", discovery_prefix, component, node_id, object_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        let cases = [
            ("name", "sensor", "/", "name/sensor"),
            ("", "sensor", "/", "sensor"),
            ("", "Sensor", "_", "sensor"),
            ("Living Room", "Temp", "_", "living room_temp"),
            ("NAME", "SENSOR", ".", "name.sensor"),
        ];
        for (device, sensor, sep, expected) in cases {
            assert_eq!(slug(device, sensor, sep), expected);
        }
    }

    #[test]
    fn test_topic_fragment() {
        assert_eq!(topic_fragment("name", "sensor"), "name/sensor");
        assert_eq!(topic_fragment("", "sensor"), "sensor");
    }

    #[test]
    fn test_object_id() {
        assert_eq!(object_id("name", "sensor"), "name_sensor");
        assert_eq!(object_id("", "sensor"), "sensor");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("dname", "name", "sensor"), "dname name sensor");
        assert_eq!(display_name("dname", "", "sensor"), "dname sensor");
    }

    #[test]
    fn test_unique_id() {
        assert_eq!(unique_id("dname", "name", "sensor"), "dname.name.sensor");
        assert_eq!(unique_id("dname", "", "sensor"), "dname.sensor");
    }

    #[test]
    fn test_topics() {
        assert_eq!(availability_topic("prefix"), "prefix/status");
        assert_eq!(state_topic("prefix", "name", "sensor"), "prefix/name/sensor/state");
        assert_eq!(state_topic("prefix", "", "sensor"), "prefix/sensor/state");
        assert_eq!(command_topic("prefix", "name", "sensor"), "prefix/name/sensor/command");
        assert_eq!(command_topic("prefix", "", "sensor"), "prefix/sensor/command");
        assert_eq!(
            discovery_topic("homeassistant", "sensor", "home", "kitchen_temp"),
            "homeassistant/sensor/home/kitchen_temp/config"
        );
    }
}
