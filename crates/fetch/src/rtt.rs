//! RTT estimation (RFC 6298).
//!
//! Keeps a smoothed RTT and RTT variance and derives the retransmission
//! timeout from them. At most one sample is taken per estimated round trip;
//! Karn's algorithm is the caller's job, it must only feed samples from
//! segments that were never retransmitted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::clock::ClockRate;
use crate::error::ConfigError;

/// Gain for SRTT smoothing (1/8).
pub(crate) const SRTT_ALPHA: f64 = 0.125;

/// Gain for RTTVAR smoothing (1/4).
pub(crate) const RTTVAR_BETA: f64 = 0.25;

/// RTO = SRTT + K * RTTVAR.
pub(crate) const RTO_K: f64 = 4.0;

/// RTO bounds and initial value.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RttConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub min_rto: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_rto: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_rto: Duration,
}

impl Default for RttConfig {
    fn default() -> Self {
        Self {
            min_rto: Duration::from_millis(200),
            initial_rto: Duration::from_millis(1_000),
            max_rto: Duration::from_millis(60_000),
        }
    }
}

impl RttConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_rto.is_zero()
            || self.min_rto > self.initial_rto
            || self.initial_rto > self.max_rto
        {
            return Err(ConfigError::RtoBounds {
                min: self.min_rto,
                initial: self.initial_rto,
                max: self.max_rto,
            });
        }
        Ok(())
    }
}

/// RFC 6298 estimator working in clock ticks.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT, zero until the first sample.
    srtt: f64,
    rttvar: f64,
    rto: u64,
    /// Samples taken before this time are dropped.
    next_sample_at: u64,
    has_sample: bool,
    min_rto: u64,
    max_rto: u64,
    rate: ClockRate,
}

impl RttEstimator {
    pub fn new(config: &RttConfig, rate: ClockRate) -> Self {
        let min_rto = rate.ticks(config.min_rto);
        let max_rto = rate.ticks(config.max_rto);
        Self {
            srtt: 0.0,
            rttvar: 0.0,
            rto: rate.ticks(config.initial_rto).clamp(min_rto, max_rto),
            next_sample_at: 0,
            has_sample: false,
            min_rto,
            max_rto,
            rate,
        }
    }

    /// Offers an RTT sample of `rtt` ticks measured at `now`.
    ///
    /// Returns `false` when the sample was dropped because the previous one
    /// is less than one SRTT old.
    pub fn push(&mut self, now: u64, rtt: u64) -> bool {
        if now < self.next_sample_at {
            return false;
        }

        let sample = rtt as f64;
        if self.has_sample {
            self.rttvar =
                (1.0 - RTTVAR_BETA) * self.rttvar + RTTVAR_BETA * (self.srtt - sample).abs();
            self.srtt = (1.0 - SRTT_ALPHA) * self.srtt + SRTT_ALPHA * sample;
        } else {
            self.srtt = sample;
            self.rttvar = sample / 2.0;
            self.has_sample = true;
        }

        self.rto = self.clamp_rto(self.srtt + RTO_K * self.rttvar);
        self.next_sample_at = now.saturating_add(self.srtt as u64);

        tracing::trace!(
            rtt = ?self.rate.duration(rtt),
            srtt = ?self.srtt(),
            rto = ?self.rto(),
            "RTT sample"
        );
        true
    }

    /// Doubles the RTO after a retransmission timeout.
    pub fn backoff(&mut self) {
        self.rto = self.clamp_rto(self.rto as f64 * 2.0);
    }

    fn clamp_rto(&self, rto: f64) -> u64 {
        // Float-to-int casts saturate, so very large values still clamp to max.
        (rto as u64).clamp(self.min_rto, self.max_rto)
    }

    /// Current RTO in ticks.
    pub fn rto_ticks(&self) -> u64 {
        self.rto
    }

    /// Smoothed RTT in ticks, zero before the first sample.
    pub fn srtt_ticks(&self) -> f64 {
        self.srtt
    }

    pub fn rttvar_ticks(&self) -> f64 {
        self.rttvar
    }

    pub fn rto(&self) -> Duration {
        self.rate.duration(self.rto)
    }

    pub fn srtt(&self) -> Duration {
        self.rate.duration(self.srtt as u64)
    }

    pub fn has_sample(&self) -> bool {
        self.has_sample
    }

    /// Earliest time at which the next sample is accepted.
    pub fn next_sample_at(&self) -> u64 {
        self.next_sample_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn estimator() -> RttEstimator {
        RttEstimator::new(&RttConfig::default(), ClockRate::NANOS)
    }

    #[test]
    fn test_initial_rto() {
        let rtte = estimator();
        assert!(!rtte.has_sample());
        assert_eq!(rtte.rto(), Duration::from_millis(1_000));
        assert_eq!(rtte.srtt_ticks(), 0.0);
    }

    #[test]
    fn test_first_sample() {
        let mut rtte = estimator();
        assert!(rtte.push(0, 100 * MS));

        assert!(rtte.has_sample());
        assert_eq!(rtte.srtt_ticks(), (100 * MS) as f64);
        assert_eq!(rtte.rttvar_ticks(), (50 * MS) as f64);
        // 100ms + 4 * 50ms
        assert_eq!(rtte.rto(), Duration::from_millis(300));
        assert_eq!(rtte.next_sample_at(), 100 * MS);
    }

    #[test]
    fn test_sample_within_one_srtt_is_ignored() {
        let mut rtte = estimator();
        rtte.push(0, 100 * MS);
        let before = (rtte.srtt_ticks(), rtte.rttvar_ticks(), rtte.rto_ticks());

        assert!(!rtte.push(50 * MS, 400 * MS));
        assert_eq!(
            (rtte.srtt_ticks(), rtte.rttvar_ticks(), rtte.rto_ticks()),
            before
        );
    }

    #[test]
    fn test_steady_state_update() {
        let mut rtte = estimator();
        rtte.push(0, 100 * MS);
        assert!(rtte.push(100 * MS, 200 * MS));

        // rttvar = 0.75 * 50 + 0.25 * |100 - 200| = 62.5
        // srtt = 0.875 * 100 + 0.125 * 200 = 112.5
        let rttvar_ms = rtte.rttvar_ticks() / MS as f64;
        let srtt_ms = rtte.srtt_ticks() / MS as f64;
        assert!((rttvar_ms - 62.5).abs() < 1e-9);
        assert!((srtt_ms - 112.5).abs() < 1e-9);
        assert_eq!(rtte.rto(), Duration::from_millis(362) + Duration::from_micros(500));
        assert_eq!(rtte.next_sample_at(), 100 * MS + 112_500_000);
    }

    #[test]
    fn test_rto_clamped_to_min() {
        let mut rtte = estimator();
        rtte.push(0, MS);
        assert_eq!(rtte.rto(), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut rtte = estimator();
        rtte.push(0, 100 * MS);
        rtte.backoff();
        assert_eq!(rtte.rto(), Duration::from_millis(600));

        for _ in 0..20 {
            rtte.backoff();
        }
        assert_eq!(rtte.rto(), Duration::from_millis(60_000));
    }

    #[test]
    fn test_validate() {
        assert!(RttConfig::default().validate().is_ok());
        let inverted = RttConfig {
            min_rto: Duration::from_secs(2),
            ..RttConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::RtoBounds { .. })
        ));
    }
}
