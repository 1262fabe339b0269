//! Congestion control for the fetch engine.
//!
//! The engine counts its window in segments (Interests in flight), not bytes.
//! Two algorithms are available and selected through
//! [`CongestionControlConfig`]:
//!
//! - **CUBIC** (default): slow start followed by cubic window growth, with a
//!   multiplicative decrease on loss or congestion marks.
//! - **FixedWindow**: a constant window, useful for measurements and for
//!   deterministic tests.
//!
//! Dispatch goes through the [`CongestionController`] enum rather than a trait
//! object since every algorithm is known at compile time.

mod cubic;
mod fixed_window;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::ClockRate;
use crate::error::ConfigError;

pub use cubic::CubicController;
pub use fixed_window::FixedWindowController;

/// Identifies the congestion control algorithm in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CongestionControlAlgorithm {
    #[default]
    Cubic,
    FixedWindow,
}

impl fmt::Display for CongestionControlAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionControlAlgorithm::Cubic => write!(f, "CUBIC"),
            CongestionControlAlgorithm::FixedWindow => write!(f, "FixedWindow"),
        }
    }
}

impl FromStr for CongestionControlAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cubic" => Ok(Self::Cubic),
            "fixed" | "fixed-window" | "fixedwindow" => Ok(Self::FixedWindow),
            other => Err(format!("unknown congestion control algorithm: {other}")),
        }
    }
}

/// Interface shared by the window-based controllers.
///
/// Times are clock ticks at the rate the controller was built with.
pub trait CongestionControl {
    /// Grows the window after a Data arrival without congestion mark.
    ///
    /// `srtt` is the current smoothed RTT in ticks and must be positive.
    fn increase(&mut self, now: u64, srtt: f64);

    /// Shrinks the window after loss or a congestion mark.
    fn decrease(&mut self, now: u64);

    /// Usable window in segments, never below 1.
    fn cwnd(&self) -> usize;

    /// Raw, possibly fractional, window.
    fn raw_cwnd(&self) -> f64;

    /// Slow start threshold, `f64::INFINITY` before the first decrease.
    fn ssthresh(&self) -> f64;

    fn algorithm(&self) -> CongestionControlAlgorithm;
}

/// Congestion control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionControlConfig {
    pub algorithm: CongestionControlAlgorithm,
    /// Initial window in segments. For [`CongestionControlAlgorithm::FixedWindow`]
    /// this is the window for the whole session.
    pub initial_cwnd: f64,
}

impl Default for CongestionControlConfig {
    fn default() -> Self {
        Self {
            algorithm: CongestionControlAlgorithm::Cubic,
            initial_cwnd: cubic::INITIAL_CWND,
        }
    }
}

impl CongestionControlConfig {
    pub fn new(algorithm: CongestionControlAlgorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// A constant window of `cwnd` segments.
    pub fn fixed_window(cwnd: usize) -> Self {
        Self {
            algorithm: CongestionControlAlgorithm::FixedWindow,
            initial_cwnd: cwnd as f64,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_cwnd.is_finite() || self.initial_cwnd < 1.0 {
            return Err(ConfigError::Cwnd(self.initial_cwnd));
        }
        Ok(())
    }

    pub fn build(&self, rate: ClockRate) -> CongestionController {
        match self.algorithm {
            CongestionControlAlgorithm::Cubic => {
                CongestionController::Cubic(CubicController::new(self.initial_cwnd, rate))
            }
            CongestionControlAlgorithm::FixedWindow => CongestionController::FixedWindow(
                FixedWindowController::new(self.initial_cwnd as usize),
            ),
        }
    }
}

/// Congestion controller that dispatches to the configured algorithm.
#[derive(Debug, Clone)]
pub enum CongestionController {
    Cubic(CubicController),
    FixedWindow(FixedWindowController),
}

impl CongestionControl for CongestionController {
    fn increase(&mut self, now: u64, srtt: f64) {
        match self {
            Self::Cubic(c) => c.increase(now, srtt),
            Self::FixedWindow(c) => c.increase(now, srtt),
        }
    }

    fn decrease(&mut self, now: u64) {
        match self {
            Self::Cubic(c) => c.decrease(now),
            Self::FixedWindow(c) => c.decrease(now),
        }
    }

    fn cwnd(&self) -> usize {
        match self {
            Self::Cubic(c) => c.cwnd(),
            Self::FixedWindow(c) => c.cwnd(),
        }
    }

    fn raw_cwnd(&self) -> f64 {
        match self {
            Self::Cubic(c) => c.raw_cwnd(),
            Self::FixedWindow(c) => c.raw_cwnd(),
        }
    }

    fn ssthresh(&self) -> f64 {
        match self {
            Self::Cubic(c) => c.ssthresh(),
            Self::FixedWindow(c) => c.ssthresh(),
        }
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        match self {
            Self::Cubic(_) => CongestionControlAlgorithm::Cubic,
            Self::FixedWindow(_) => CongestionControlAlgorithm::FixedWindow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cubic() {
        let controller = CongestionControlConfig::default().build(ClockRate::NANOS);
        assert_eq!(controller.algorithm(), CongestionControlAlgorithm::Cubic);
        assert_eq!(controller.cwnd(), 2);
        assert_eq!(controller.ssthresh(), f64::INFINITY);
    }

    #[test]
    fn test_build_fixed_window() {
        let mut controller = CongestionControlConfig::fixed_window(8).build(ClockRate::NANOS);
        assert_eq!(controller.algorithm(), CongestionControlAlgorithm::FixedWindow);
        controller.decrease(0);
        controller.increase(1, 1.0);
        assert_eq!(controller.cwnd(), 8);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(
            "CUBIC".parse::<CongestionControlAlgorithm>(),
            Ok(CongestionControlAlgorithm::Cubic)
        );
        assert_eq!(
            "fixed-window".parse::<CongestionControlAlgorithm>(),
            Ok(CongestionControlAlgorithm::FixedWindow)
        );
        assert!("bbr".parse::<CongestionControlAlgorithm>().is_err());
    }

    #[test]
    fn test_validate_rejects_small_window() {
        let config = CongestionControlConfig {
            initial_cwnd: 0.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Cwnd(0.5)));
        assert!(CongestionControlConfig {
            initial_cwnd: f64::NAN,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
