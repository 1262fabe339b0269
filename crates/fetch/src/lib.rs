//! Congestion-controlled segment retrieval for named-data networking.
//!
//! A consumer fetching a large named object requests it one numbered
//! segment at a time. [`FetchEngine`] decides which segment numbers to
//! request and when, adapting the number of outstanding Interests to the
//! path with a CUBIC congestion window and recovering losses through
//! per-segment retransmission timers. It performs no I/O itself; callers
//! drive it with [`FetchEngine::tick`], [`FetchEngine::tx_interest_burst`]
//! and [`FetchEngine::rx_data_burst`].
//!
//! Building blocks, usable on their own:
//!
//! - [`TimerWheel`]: O(1) arm/cancel/expire for many short timers
//! - [`RttEstimator`]: RFC 6298 SRTT/RTTVAR/RTO
//! - [`CongestionController`]: CUBIC or a fixed window
//! - [`SegmentWindow`]: ring buffer of per-segment state
//!
//! [`FetchWorker`] polls several engines round-robin over a [`SessionIo`]
//! implementation, and [`sim::SimulatedLink`] is a deterministic lossy link
//! for tests and the `fetch-sim` binary.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod congestion;
pub mod engine;
pub mod error;
pub mod retx;
pub mod rtt;
pub mod sim;
pub mod stats;
pub mod timer_wheel;
#[cfg(feature = "trace")]
pub mod tracer;
pub mod window;
pub mod worker;

pub use clock::{ClockRate, RealTime, TimeSource, VirtualTime};
pub use config::FetchConfig;
pub use congestion::{
    CongestionControl, CongestionControlAlgorithm, CongestionControlConfig, CongestionController,
};
pub use engine::{DataArrival, FetchEngine, SegmentRange};
pub use error::{ConfigError, FetchError, TimerError};
pub use rtt::{RttConfig, RttEstimator};
pub use stats::FetchStats;
pub use timer_wheel::{TimerId, TimerWheel};
pub use window::{Segment, SegmentWindow};
pub use worker::{FetchWorker, SessionId, SessionIo};
