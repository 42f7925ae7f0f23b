use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use twomqtt_conf::Mqtt;

/// Delay schedule between connect attempts.
///
/// Starts at `initial`, grows by `multiplier` per consecutive failure up to `max`, and adds an
/// upward random jitter of at most `jitter * delay`. Delays never decrease and never exceed `max`
/// until [`ReconnectBackoff::reset`] is called after a successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    exp: ExponentialBackoff,
    initial: Duration,
    max: Duration,
    jitter: f64,
    last: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        let initial = if initial.is_zero() { Duration::from_millis(100) } else { initial };
        let max = max.max(initial);
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { 2.0 };
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        let exp = ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_multiplier(multiplier)
            .with_randomization_factor(0.0)
            .with_max_interval(max)
            .with_max_elapsed_time(None)
            .build();
        Self { exp, initial, max, jitter, last: Duration::ZERO }
    }

    pub fn from_config(cfg: &Mqtt) -> Self {
        Self::new(cfg.reconnect_min, cfg.reconnect_max, cfg.reconnect_multiplier, cfg.reconnect_jitter)
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.exp.next_backoff().unwrap_or(self.max);
        let jittered = base.mul_f64(1.0 + rand::random::<f64>() * self.jitter);
        self.last = jittered.max(self.last).min(self.max);
        self.last
    }

    /// Restarts the schedule at the initial delay.
    pub fn reset(&mut self) {
        self.exp.reset();
        self.last = Duration::ZERO;
    }

    #[inline]
    pub fn initial(&self) -> Duration {
        self.initial
    }

    #[inline]
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::from_config(&Mqtt::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let max = Duration::from_secs(5);
        let mut b = ReconnectBackoff::new(Duration::from_millis(100), max, 2.0, 0.5);
        let mut prev = Duration::ZERO;
        for _ in 0..30 {
            let d = b.next_delay();
            assert!(d >= prev, "{:?} < {:?}", d, prev);
            assert!(d <= max);
            prev = d;
        }
        assert_eq!(prev, max);
    }

    #[test]
    fn test_doubles_without_jitter() {
        let mut b = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0, 0.0);
        let delays: Vec<u128> = (0..6).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_reset_restarts_at_initial() {
        let initial = Duration::from_millis(100);
        let mut b = ReconnectBackoff::new(initial, Duration::from_secs(60), 2.0, 0.5);
        for _ in 0..10 {
            b.next_delay();
        }
        b.reset();
        let d = b.next_delay();
        assert!(d >= initial && d <= initial.mul_f64(1.5), "{:?}", d);
    }

    #[test]
    fn test_sanitized_settings() {
        let mut b = ReconnectBackoff::new(Duration::ZERO, Duration::ZERO, 0.5, 7.0);
        assert_eq!(b.initial(), Duration::from_millis(100));
        assert_eq!(b.max(), Duration::from_millis(100));
        assert_eq!(b.next_delay(), Duration::from_millis(100));

        let b = ReconnectBackoff::default();
        assert_eq!(b.max(), Duration::from_secs(300));
    }
}
