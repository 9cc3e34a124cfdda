//! Round-trip timing and retransmit timeouts
//!
//! One estimator lives in each session. The smoothed RTT and mean deviation
//! follow Jacobson's SIGCOMM '88 algorithm in floating point:
//!
//! ```text
//! err     = rtt - srtt
//! srtt   += err / 8
//! rttdev += (|err| - rttdev) / 4
//! rto     = clamp(srtt + 2 * rttdev, min, max)
//! ```
//!
//! Only round trips of packets that were sent exactly once update the
//! estimators. A response to a retransmitted packet cannot be matched to a
//! particular transmission, so its final timeout is carried forward as the
//! starting timeout of the next packet instead.

use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer};

/// Multiplier applied to a packet's initial timeout, indexed by retransmission count.
const BACKOFF: [u32; 5] = [1, 2, 4, 8, 16];

/// Upper bound for [`RttConfig::max_retransmits`].
pub const MAX_RETRANSMITS: u8 = 16;

/// Tunables for the retransmit timer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RttConfig {
    /// Lower bound for a computed timeout
    #[serde(with = "humantime_serde")]
    pub min_timeout: Duration,
    /// Upper bound for a computed timeout
    #[serde(with = "humantime_serde")]
    pub max_timeout: Duration,
    /// Deviation before the first sample; the first timeout is twice this
    #[serde(with = "humantime_serde")]
    pub initial_deviation: Duration,
    /// Retransmissions of one packet before giving up, at most [`MAX_RETRANSMITS`]
    #[serde(deserialize_with = "bounded_retransmits")]
    pub max_retransmits: u8,
}

fn bounded_retransmits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = u8::deserialize(deserializer)?;
    if value > MAX_RETRANSMITS {
        return Err(serde::de::Error::custom(format!(
            "max_retransmits must be at most {MAX_RETRANSMITS}, got {value}"
        )));
    }
    Ok(value)
}

impl Default for RttConfig {
    fn default() -> Self {
        Self {
            min_timeout: Duration::from_secs(2),
            max_timeout: Duration::from_secs(120),
            initial_deviation: Duration::from_millis(1500),
            max_retransmits: 4,
        }
    }
}

/// What to do after a receive timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry,
    GiveUp,
}

#[derive(Debug)]
pub struct RttEstimator {
    config: RttConfig,
    /// Last measured round trip, seconds
    rtt: f64,
    /// Smoothed round trip, seconds
    srtt: f64,
    /// Smoothed mean deviation, seconds
    rttdev: f64,
    /// Timeout of the first transmission of the in-flight packet
    initial_timeout: Duration,
    current_timeout: Duration,
    next_initial_timeout: Option<Duration>,
    retransmits: u8,
    total_retransmits: u32,
    sent_at: Option<Instant>,
}

impl RttEstimator {
    pub fn new(mut config: RttConfig) -> Self {
        if config.max_retransmits > MAX_RETRANSMITS {
            log::warn!(
                "max_retransmits {} lowered to {}",
                config.max_retransmits,
                MAX_RETRANSMITS
            );
            config.max_retransmits = MAX_RETRANSMITS;
        }

        Self {
            config,
            rtt: 0.0,
            srtt: 0.0,
            rttdev: config.initial_deviation.as_secs_f64(),
            initial_timeout: Duration::ZERO,
            current_timeout: Duration::ZERO,
            next_initial_timeout: None,
            retransmits: 0,
            total_retransmits: 0,
            sent_at: None,
        }
    }

    /// Resets the retransmission counter before a new packet goes out.
    pub fn new_packet(&mut self) {
        self.retransmits = 0;
    }

    /// Arms the timer for the packet just sent and returns its timeout.
    pub fn start(&mut self) -> Duration {
        self.start_at(Instant::now())
    }

    pub fn start_at(&mut self, now: Instant) -> Duration {
        if self.retransmits > 0 {
            // The sample would be ambiguous, so no send time is kept.
            let idx = usize::from(self.retransmits).min(BACKOFF.len() - 1);
            self.current_timeout = self.initial_timeout * BACKOFF[idx];
            self.sent_at = None;
            return self.current_timeout;
        }

        self.sent_at = Some(now);
        self.initial_timeout = match self.next_initial_timeout.take() {
            Some(carried) => carried,
            None => {
                let rto = self.srtt + 2.0 * self.rttdev;
                let rto = rto.clamp(
                    self.config.min_timeout.as_secs_f64(),
                    self.config.max_timeout.as_secs_f64(),
                );
                Duration::from_secs_f64(rto)
            }
        };
        self.current_timeout = self.initial_timeout;
        self.current_timeout
    }

    /// A response arrived: updates the estimators if the sample is usable.
    pub fn stop(&mut self) {
        self.stop_at(Instant::now())
    }

    pub fn stop_at(&mut self, now: Instant) {
        if self.retransmits > 0 {
            self.next_initial_timeout = Some(self.current_timeout);
            return;
        }

        self.next_initial_timeout = None;
        let Some(sent_at) = self.sent_at.take() else {
            return;
        };

        self.rtt = now.saturating_duration_since(sent_at).as_secs_f64();
        let err = self.rtt - self.srtt;
        self.srtt += err / 8.0;
        self.rttdev += (err.abs() - self.rttdev) / 4.0;

        log::trace!(
            "rtt = {:.5}, srtt = {:.3}, rttdev = {:.3}, rto = {:?}",
            self.rtt,
            self.srtt,
            self.rttdev,
            self.current_timeout
        );
    }

    /// The armed timeout expired without a response.
    pub fn on_timeout(&mut self) -> Verdict {
        self.next_initial_timeout = Some(self.current_timeout);
        self.sent_at = None;
        self.retransmits = self.retransmits.saturating_add(1);

        if self.retransmits > self.config.max_retransmits {
            Verdict::GiveUp
        } else {
            self.total_retransmits += 1;
            Verdict::Retry
        }
    }

    pub fn srtt(&self) -> f64 {
        self.srtt
    }

    pub fn deviation(&self) -> f64 {
        self.rttdev
    }

    pub fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    pub fn retransmits(&self) -> u8 {
        self.retransmits
    }

    /// Retransmissions over the whole session.
    pub fn total_retransmits(&self) -> u32 {
        self.total_retransmits
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(RttConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_timeout_is_three_seconds() {
        let mut rtt = RttEstimator::default();
        assert_eq!(rtt.start(), Duration::from_secs(3));
    }

    #[test]
    fn backoff_sequence_then_give_up() {
        let mut rtt = RttEstimator::default();
        rtt.new_packet();

        let mut seen = vec![rtt.start()];
        for _ in 0..4 {
            assert_eq!(rtt.on_timeout(), Verdict::Retry);
            seen.push(rtt.start());
        }
        assert_eq!(rtt.on_timeout(), Verdict::GiveUp);

        let expected: Vec<Duration> = [3, 6, 12, 24, 48].into_iter().map(Duration::from_secs).collect();
        assert_eq!(seen, expected);
        assert_eq!(rtt.total_retransmits(), 4);
    }

    #[test]
    fn jacobson_update() {
        let mut rtt = RttEstimator::default();
        let t0 = Instant::now();
        rtt.new_packet();
        rtt.start_at(t0);
        rtt.stop_at(t0 + Duration::from_secs(1));

        assert_eq!(rtt.srtt(), 0.125);
        assert_eq!(rtt.deviation(), 1.375);

        rtt.new_packet();
        assert_eq!(rtt.start_at(t0), Duration::from_secs_f64(2.875));
    }

    #[test]
    fn fast_peer_is_clamped_to_minimum() {
        let mut rtt = RttEstimator::default();
        let t0 = Instant::now();
        for _ in 0..20 {
            rtt.new_packet();
            rtt.start_at(t0);
            rtt.stop_at(t0);
        }
        rtt.new_packet();
        assert_eq!(rtt.start_at(t0), Duration::from_secs(2));
    }

    #[test]
    fn slow_peer_is_clamped_to_maximum() {
        let mut rtt = RttEstimator::new(RttConfig {
            initial_deviation: Duration::from_secs(100),
            ..RttConfig::default()
        });
        assert_eq!(rtt.start(), Duration::from_secs(120));
    }

    #[test]
    fn retransmitted_exchange_carries_timeout_forward() {
        let mut rtt = RttEstimator::default();
        let t0 = Instant::now();

        rtt.new_packet();
        assert_eq!(rtt.start_at(t0), Duration::from_secs(3));
        assert_eq!(rtt.on_timeout(), Verdict::Retry);
        assert_eq!(rtt.start_at(t0), Duration::from_secs(6));
        rtt.stop_at(t0 + Duration::from_secs(7));

        // Estimators untouched.
        assert_eq!(rtt.srtt(), 0.0);
        assert_eq!(rtt.deviation(), 1.5);

        // The next packet starts from the last timeout, then goes back to
        // the estimators once it is answered without a retransmission.
        rtt.new_packet();
        assert_eq!(rtt.start_at(t0), Duration::from_secs(6));
        rtt.stop_at(t0 + Duration::from_secs(1));
        assert_eq!(rtt.srtt(), 0.125);

        rtt.new_packet();
        assert_eq!(rtt.start_at(t0), Duration::from_secs_f64(2.875));
    }

    #[test]
    fn config_from_toml() {
        let config: RttConfig = toml::from_str(
            r#"
            min_timeout = "500ms"
            max_retransmits = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.min_timeout, Duration::from_millis(500));
        assert_eq!(config.max_timeout, Duration::from_secs(120));
        assert_eq!(config.max_retransmits, 2);

        let err = toml::from_str::<RttConfig>("max_retransmits = 255").unwrap_err();
        assert!(err.to_string().contains("at most 16"));
    }

    #[test]
    fn oversized_retransmit_limit_still_gives_up() {
        let mut rtt = RttEstimator::new(RttConfig {
            max_retransmits: u8::MAX,
            ..RttConfig::default()
        });
        rtt.new_packet();

        let mut retries = 0;
        loop {
            rtt.start_at(Instant::now());
            match rtt.on_timeout() {
                Verdict::Retry => retries += 1,
                Verdict::GiveUp => break,
            }
            assert!(retries <= usize::from(MAX_RETRANSMITS), "never gave up");
        }
        assert_eq!(retries, usize::from(MAX_RETRANSMITS));
    }
}
