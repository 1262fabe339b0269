//! Fixed-window controller.
//!
//! Keeps a constant number of segments in flight regardless of feedback.
//! Decreases are still counted so the engine's once-per-RTT gating can be
//! observed with a predictable window.

use super::{CongestionControl, CongestionControlAlgorithm};

#[derive(Debug, Clone)]
pub struct FixedWindowController {
    cwnd: usize,
    n_increases: u64,
    n_decreases: u64,
}

impl FixedWindowController {
    pub fn new(cwnd: usize) -> Self {
        Self {
            cwnd: cwnd.max(1),
            n_increases: 0,
            n_decreases: 0,
        }
    }

    pub fn n_increases(&self) -> u64 {
        self.n_increases
    }

    pub fn n_decreases(&self) -> u64 {
        self.n_decreases
    }
}

impl CongestionControl for FixedWindowController {
    fn increase(&mut self, _now: u64, _srtt: f64) {
        self.n_increases += 1;
    }

    fn decrease(&mut self, _now: u64) {
        self.n_decreases += 1;
    }

    fn cwnd(&self) -> usize {
        self.cwnd
    }

    fn raw_cwnd(&self) -> f64 {
        self.cwnd as f64
    }

    fn ssthresh(&self) -> f64 {
        f64::INFINITY
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::FixedWindow
    }
}
