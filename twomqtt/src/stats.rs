use serde::Serialize;

use twomqtt_utils::{format_timestamp_millis, timestamp_millis, Counter, TimestampMillis};

/// Publish and connection counters of one connection manager
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub started_at: TimestampMillis,
    /// Publishes handed to the broker client, failed ones included
    pub publishes: Counter,
    /// Publishes skipped because the payload was already the last one sent
    pub duplicates: Counter,
    pub publish_failures: Counter,
    pub connects: Counter,
    pub connection_losses: Counter,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            started_at: timestamp_millis(),
            publishes: Counter::new(),
            duplicates: Counter::new(),
            publish_failures: Counter::new(),
            connects: Counter::new(),
            connection_losses: Counter::new(),
        }
    }
}

impl Stats {
    #[inline]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "started_at": format_timestamp_millis(self.started_at),
            "publishes": self.publishes.count(),
            "duplicates": self.duplicates.count(),
            "publish_failures": self.publish_failures.count(),
            "connects": self.connects.count(),
            "connection_losses": self.connection_losses.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json() {
        let stats = Stats::default();
        stats.publishes.incs(3);
        stats.duplicates.inc();
        let v = stats.to_json();
        assert_eq!(v["publishes"], 3);
        assert_eq!(v["duplicates"], 1);
        assert_eq!(v["connects"], 0);
        assert!(!v["started_at"].as_str().unwrap().is_empty());
    }
}
