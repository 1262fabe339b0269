//! Engine configuration.
//!
//! A [`FetchConfig`] can be built in code or read from TOML. Every field has a
//! default, so a config file only needs the values it changes:
//!
//! ```toml
//! window_capacity = 4096
//! timer_interval = 2
//!
//! [rtt]
//! min_rto = 100
//!
//! [congestion]
//! algorithm = "fixed-window"
//! initial_cwnd = 16
//! ```
//!
//! Durations are written in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::congestion::CongestionControlConfig;
use crate::error::{ConfigError, FetchError};
use crate::rtt::RttConfig;
use crate::timer_wheel::{MAX_SLOT_BITS, MIN_SLOT_BITS};

/// Default segment window: 64Ki segments.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1 << 16;

/// Default timer wheel size exponent (65536 slots).
pub const DEFAULT_TIMER_SLOTS_LOG2: u32 = 16;

/// Default timer wheel slot width.
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_millis(1);

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum span of segments tracked at once. Must be a power of two.
    pub window_capacity: usize,

    /// The timer wheel has `2^timer_slots_log2` slots.
    pub timer_slots_log2: u32,

    /// Width of one timer wheel slot; RTO expiry is detected with this
    /// granularity.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timer_interval: Duration,

    pub rtt: RttConfig,

    pub congestion: CongestionControlConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            timer_slots_log2: DEFAULT_TIMER_SLOTS_LOG2,
            timer_interval: DEFAULT_TIMER_INTERVAL,
            rtt: RttConfig::default(),
            congestion: CongestionControlConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Longest delay the configured timer wheel can represent.
    pub fn timer_range(&self) -> Duration {
        let n_slots = 1u32.checked_shl(self.timer_slots_log2).unwrap_or(0);
        self.timer_interval
            .saturating_mul(n_slots.saturating_sub(2))
    }

    /// Checks the configuration for internal consistency.
    ///
    /// A config that passes guarantees the engine never fails to arm an RTO
    /// timer: the largest RTO fits in the wheel.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.window_capacity.is_power_of_two() {
            return Err(ConfigError::WindowCapacity(self.window_capacity));
        }
        if !(MIN_SLOT_BITS..=MAX_SLOT_BITS).contains(&self.timer_slots_log2) {
            return Err(ConfigError::TimerSlots(self.timer_slots_log2));
        }
        if self.timer_interval.is_zero() {
            return Err(ConfigError::TimerInterval);
        }
        self.rtt.validate()?;
        if self.rtt.max_rto > self.timer_range() {
            return Err(ConfigError::RtoExceedsWheel {
                max_rto: self.rtt.max_rto,
                wheel_range: self.timer_range(),
            });
        }
        self.congestion.validate()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, FetchError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let path = path.as_ref();
        tracing::debug!(path = ?path, "Reading fetch configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
