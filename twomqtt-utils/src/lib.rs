//! Small helpers shared by the twomqtt crates
//!
//! ## Core Features:
//! - **Duration Conversion**: `1h30m15s` style strings to [`Duration`], plus serde helpers
//! - **Timestamp Utilities**: millisecond timestamps and formatting
//! - **Counter Implementation**: thread-safe counter tracking a current and a peak value ([`Counter`])
//! - **Redaction**: masking secrets before they reach the logs
//!
//! ## Usage Examples:
//! ```rust
//! use twomqtt_utils::{redact, to_duration};
//!
//! let duration = to_duration("1h30m15s");
//! assert_eq!(duration.as_secs(), 5415);
//!
//! assert_eq!(redact("hunter2"), "<REDACTED>");
//! assert_eq!(redact(""), "");
//! ```

#![deny(unsafe_code)]

use std::time::Duration;

use serde::{
    de::{self, Deserializer},
    ser::Serializer,
    Deserialize,
};

mod counter;

pub use counter::Counter;

/// Timestamp representation in milliseconds since Unix epoch
pub type TimestampMillis = i64;

/// Marker written in place of a secret value
pub const REDACTED: &str = "<REDACTED>";

/// Deserialize Duration from human-readable string format
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    let d = to_duration(&v);
    if d.is_zero() && !is_zero_text(&v) {
        return Err(de::Error::custom(format!("invalid duration, {:?}", v)));
    }
    Ok(d)
}

/// Serialize Duration back into the human-readable string format
#[inline]
pub fn serialize_duration<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&format_duration(*d))
}

/// Convert human-readable duration string to Duration
///
/// # Supported units:
/// - ms: milliseconds
/// - s: seconds
/// - m: minutes
/// - h: hours
/// - d: days
/// - w: weeks
///
/// A bare number is read as seconds.
///
/// # Example:
/// ```
/// let duration = twomqtt_utils::to_duration("1h30m15s");
/// assert_eq!(duration.as_secs(), 5415);
///
/// let backoff = twomqtt_utils::to_duration("100ms");
/// assert_eq!(backoff.as_millis(), 100);
///
/// assert_eq!(twomqtt_utils::to_duration("20").as_secs(), 20);
/// ```
#[inline]
pub fn to_duration(text: &str) -> Duration {
    let text = text.trim().to_lowercase();
    if let Ok(secs) = text.parse::<u64>() {
        return Duration::from_secs(secs);
    }
    let text = text.replace("ms", "Y");
    let ms: u64 = text
        .split_inclusive(['s', 'm', 'h', 'd', 'w', 'Y'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().trim().parse::<u64>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'Y' => v,
                's' => v * 1000,
                'm' => v * 60000,
                'h' => v * 3600000,
                'd' => v * 86400000,
                'w' => v * 604800000,
                _ => 0,
            }
        })
        .sum();
    Duration::from_millis(ms)
}

/// Format a Duration using the largest units that divide it exactly
///
/// # Example:
/// ```
/// use std::time::Duration;
///
/// assert_eq!(twomqtt_utils::format_duration(Duration::from_secs(5415)), "1h30m15s");
/// assert_eq!(twomqtt_utils::format_duration(Duration::from_millis(100)), "100ms");
/// assert_eq!(twomqtt_utils::format_duration(Duration::ZERO), "0s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".into();
    }
    let mut res = String::new();
    for (unit, size) in [("h", 3600000), ("m", 60000), ("s", 1000)] {
        let n = ms / size;
        if n > 0 {
            res.push_str(&format!("{}{}", n, unit));
            ms %= size;
        }
    }
    if ms > 0 {
        res.push_str(&format!("{}ms", ms));
    }
    res
}

#[inline]
fn is_zero_text(text: &str) -> bool {
    let mut digits = text.chars().filter(|c| c.is_ascii_digit()).peekable();
    digits.peek().is_some() && digits.all(|c| c == '0')
}

/// Mask a secret, keeping empty values empty so that "not set" stays visible
#[inline]
pub fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        REDACTED
    }
}

/// Get current timestamp in milliseconds
///
/// # Example:
/// ```
/// let ts = twomqtt_utils::timestamp_millis();
/// assert!(ts > 0);
/// ```
#[inline]
pub fn timestamp_millis() -> TimestampMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_millis() as i64)
        .unwrap_or_else(|_| chrono::Local::now().timestamp_millis())
}

/// Format millisecond timestamp to string
#[inline]
pub fn format_timestamp_millis(t: TimestampMillis) -> String {
    if t <= 0 {
        "".into()
    } else {
        use chrono::TimeZone;
        if let chrono::LocalResult::Single(t) = chrono::Local.timestamp_millis_opt(t) {
            t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        } else {
            "".into()
        }
    }
}
