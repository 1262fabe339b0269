//! Fetch session statistics for logging and debugging.

use std::time::Duration;

use crate::congestion::CongestionControlAlgorithm;

/// Snapshot of a [`FetchEngine`](crate::FetchEngine)'s counters and state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    pub algorithm: CongestionControlAlgorithm,

    /// Interests sent, retransmissions included.
    pub interests_sent: u64,

    /// Interests that were retransmissions.
    pub retransmissions: u64,

    /// Data accepted (matched a segment in the window).
    pub data_received: u64,

    /// Accepted Data carrying a congestion mark.
    pub congestion_marks: u64,

    /// Arrivals dropped because their segment was unknown or already done.
    pub ignored_arrivals: u64,

    /// RTO timer expiries.
    pub rto_expiries: u64,

    /// Congestion window decreases actually applied.
    pub cwnd_decreases: u64,

    /// Usable congestion window in segments.
    pub cwnd: usize,

    /// Interests currently awaiting Data or timeout.
    pub in_flight: usize,

    /// Segments waiting for retransmission.
    pub retx_queued: usize,

    /// Smoothed RTT, `None` before the first sample.
    pub srtt: Option<Duration>,

    pub rto: Duration,
}

impl FetchStats {
    /// Fraction of sent Interests that were retransmissions.
    pub fn retx_ratio(&self) -> f64 {
        if self.interests_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.interests_sent as f64
        }
    }
}

impl std::fmt::Display for FetchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cwnd={} flight={} sent={} retx={} ({:.1}%) data={} marks={} decreases={} rto={:?}",
            self.algorithm,
            self.cwnd,
            self.in_flight,
            self.interests_sent,
            self.retransmissions,
            self.retx_ratio() * 100.0,
            self.data_received,
            self.congestion_marks,
            self.cwnd_decreases,
            self.rto,
        )?;
        if let Some(srtt) = self.srtt {
            write!(f, " srtt={srtt:?}")?;
        }
        Ok(())
    }
}
