use std::time::Duration;

use thiserror::Error;

/// Errors raised when arming a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("delay of {delay} ticks exceeds the wheel range of {max_delay} ticks")]
    DelayOutOfRange { delay: u64, max_delay: u64 },

    #[error("unknown timer handle {0}")]
    UnknownTimer(usize),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window capacity must be a non-zero power of two, got {0}")]
    WindowCapacity(usize),

    #[error("timer wheel needs between 2 and 24 slot bits, got {0}")]
    TimerSlots(u32),

    #[error("timer interval must be non-zero")]
    TimerInterval,

    #[error("RTO bounds out of order: min {min:?}, initial {initial:?}, max {max:?}")]
    RtoBounds {
        min: Duration,
        initial: Duration,
        max: Duration,
    },

    #[error("max RTO {max_rto:?} exceeds the timer wheel range {wheel_range:?}")]
    RtoExceedsWheel {
        max_rto: Duration,
        wheel_range: Duration,
    },

    #[error("congestion window must be at least 1, got {0}")]
    Cwnd(f64),
}

/// Top-level error type of the crate.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
