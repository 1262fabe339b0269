//! Congestion-controlled segment fetcher.
//!
//! [`FetchEngine`] decides which segments of a named object to request and
//! when. It owns the segment window, the RTO timers, the RTT estimator and
//! the congestion controller of one fetch session. It does no I/O: the
//! caller transmits the segment numbers returned by
//! [`FetchEngine::tx_interest_burst`] and reports Data through
//! [`FetchEngine::rx_data_burst`].
//!
//! Each poll cycle must run, in order:
//!
//! 1. [`FetchEngine::tick`], so expired RTOs become retransmission candidates;
//! 2. [`FetchEngine::tx_interest_burst`];
//! 3. [`FetchEngine::rx_data_burst`] with whatever arrived.
//!
//! # Congestion window decreases
//!
//! Losses and congestion marks tend to come in clusters. A decrease is only
//! applied when some Data sent after the previous decrease has come back,
//! which limits the window to one cut per round trip.

use crate::clock::{RealTime, TimeSource};
use crate::config::FetchConfig;
use crate::congestion::{CongestionControl, CongestionController};
use crate::error::{ConfigError, FetchError};
use crate::retx::RetxQueue;
use crate::rtt::RttEstimator;
use crate::stats::FetchStats;
use crate::timer_wheel::{TimerId, TimerWheel};
use crate::window::{Segment, SegmentWindow};


/// Sentinel for "last segment not known yet".
const UNKNOWN_END: u64 = u64::MAX;

/// Segments a session should retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    /// First segment number.
    pub begin: u64,
    /// One past the last segment number, if known up front.
    pub end: Option<u64>,
}

impl Default for SegmentRange {
    fn default() -> Self {
        Self::unbounded(0)
    }
}

impl SegmentRange {
    /// Segments `begin..end`.
    pub fn new(begin: u64, end: u64) -> Self {
        Self {
            begin,
            end: Some(end.max(begin)),
        }
    }

    /// Segments from `begin` until a Data packet says it is the final block.
    pub fn unbounded(begin: u64) -> Self {
        Self { begin, end: None }
    }
}

/// A Data packet as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataArrival {
    pub seg_num: u64,
    /// The packet carried a congestion mark.
    pub congestion_marked: bool,
    /// The packet's FinalBlockId equals its own segment number.
    pub final_block: bool,
}

impl DataArrival {
    pub fn new(seg_num: u64) -> Self {
        Self {
            seg_num,
            congestion_marked: false,
            final_block: false,
        }
    }

    pub fn marked(seg_num: u64) -> Self {
        Self {
            congestion_marked: true,
            ..Self::new(seg_num)
        }
    }

    pub fn final_block(seg_num: u64) -> Self {
        Self {
            final_block: true,
            ..Self::new(seg_num)
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    interests_sent: u64,
    retransmissions: u64,
    data_received: u64,
    congestion_marks: u64,
    ignored_arrivals: u64,
    rto_expiries: u64,
    cwnd_decreases: u64,
}

/// Per-session fetch state machine.
pub struct FetchEngine<T: TimeSource = RealTime> {
    time_source: T,
    window: SegmentWindow,
    retx_queue: RetxQueue,
    timers: TimerWheel<usize>,
    /// RTO timer of each window slot.
    slot_timers: Vec<TimerId>,
    /// Reused buffer for slots whose timer fired during a tick.
    expired: Vec<usize>,
    rtte: RttEstimator,
    cc: CongestionController,
    /// One past the final segment number.
    end: u64,
    n_in_flight: usize,
    /// Highest segment number whose Data was accepted.
    hi_data_seg_num: Option<u64>,
    /// `hi` of the window at the last applied decrease.
    cwnd_decrease_mark: Option<u64>,
    counters: Counters,
    completion_logged: bool,
}

impl FetchEngine<RealTime> {
    /// Creates an engine driven by the wall clock.
    pub fn new(config: &FetchConfig, range: SegmentRange) -> Result<Self, FetchError> {
        Self::new_with_time_source(config, range, RealTime::new())
    }
}

impl<T: TimeSource> FetchEngine<T> {
    /// Creates an engine reading time from `time_source`.
    pub fn new_with_time_source(
        config: &FetchConfig,
        range: SegmentRange,
        time_source: T,
    ) -> Result<Self, FetchError> {
        config.validate()?;

        let rate = time_source.rate();
        let window = SegmentWindow::starting_at(config.window_capacity, range.begin)?;
        let mut timers = TimerWheel::new(
            config.timer_slots_log2,
            rate.ticks(config.timer_interval).max(1),
            time_source.now(),
        )?;
        // Tick rounding may shrink the wheel below what `validate` saw.
        if rate.ticks(config.rtt.max_rto) > timers.max_delay() {
            return Err(ConfigError::RtoExceedsWheel {
                max_rto: config.rtt.max_rto,
                wheel_range: rate.duration(timers.max_delay()),
            }
            .into());
        }
        let slot_timers = (0..window.capacity())
            .map(|slot| timers.insert(slot))
            .collect();

        Ok(Self {
            window,
            retx_queue: RetxQueue::new(),
            timers,
            slot_timers,
            expired: Vec::new(),
            rtte: RttEstimator::new(&config.rtt, rate),
            cc: config.congestion.build(rate),
            end: range.end.unwrap_or(UNKNOWN_END),
            n_in_flight: 0,
            hi_data_seg_num: None,
            cwnd_decrease_mark: None,
            counters: Counters::default(),
            completion_logged: false,
            time_source,
        })
    }

    /// Records that `seg_num` is the last segment of the object.
    pub fn set_final_seg_num(&mut self, seg_num: u64) {
        self.end = seg_num.saturating_add(1);
    }

    /// Last segment number, once known.
    pub fn final_seg_num(&self) -> Option<u64> {
        (self.end != UNKNOWN_END).then(|| self.end.saturating_sub(1))
    }

    /// Whether every segment up to the final one has been retrieved.
    pub fn finished(&self) -> bool {
        self.window.lo() >= self.end
    }

    /// Fires due RTO timers. Returns how many expired.
    pub fn tick(&mut self) -> usize {
        let now = self.time_source.now();
        let mut expired = std::mem::take(&mut self.expired);
        let fired = self.timers.advance(now, |_, slot| expired.push(slot));
        for slot in expired.drain(..) {
            self.on_rto(slot, now);
        }
        self.expired = expired;
        fired
    }

    fn on_rto(&mut self, slot: usize, now: u64) {
        let Some(seg_num) = self.window.at_slot(slot).map(Segment::seg_num) else {
            return;
        };
        self.n_in_flight -= 1;
        self.counters.rto_expiries += 1;
        tracing::trace!(seg_num, rto = ?self.rtte.rto(), "RTO expired");

        if seg_num >= self.end {
            // Past the final segment, learned after this Interest was sent.
            self.window.delete(seg_num);
            return;
        }

        if self.decrease_cwnd(now, "rto") {
            self.rtte.backoff();
        }
        self.retx_queue.push_back(&mut self.window, seg_num);
    }

    /// Picks up to `limit` segments to request now, retransmissions first.
    ///
    /// Fewer are returned when the congestion window or the segment window
    /// is full, or when every segment has been requested.
    pub fn tx_interest_burst(&mut self, limit: usize) -> Vec<u64> {
        let now = self.time_source.now();
        let rto = self.rtte.rto_ticks();
        let cwnd = self.cc.cwnd();

        let mut seg_nums = Vec::new();
        while self.n_in_flight < cwnd && seg_nums.len() < limit {
            let seg = if let Some(seg_num) = self.retx_queue.pop_front(&mut self.window) {
                if seg_num >= self.end {
                    self.window.delete(seg_num);
                    continue;
                }
                let Some(seg) = self.window.get_mut(seg_num) else {
                    continue;
                };
                seg.n_retx += 1;
                self.counters.retransmissions += 1;
                seg
            } else if self.window.hi() >= self.end {
                break;
            } else {
                match self.window.append() {
                    Some(seg) => seg,
                    None => break,
                }
            };
            seg.tx_time = now;
            let seg_num = seg.seg_num;

            let timer = self.slot_timers[self.window.slot_of(seg_num)];
            self.timers.arm(timer, rto).unwrap_or_else(|err| {
                panic!("RTO timer for segment {seg_num} cannot be armed: {err}")
            });

            self.n_in_flight += 1;
            self.counters.interests_sent += 1;
            seg_nums.push(seg_num);
        }
        seg_nums
    }

    /// Processes a batch of Data arrivals.
    ///
    /// Arrivals for segments that are not outstanding are ignored.
    pub fn rx_data_burst(&mut self, arrivals: &[DataArrival]) {
        let now = self.time_source.now();
        for arrival in arrivals {
            self.rx_data(arrival, now);
        }

        if self.finished() && !self.completion_logged {
            self.completion_logged = true;
            tracing::debug!(
                final_seg_num = self.final_seg_num(),
                interests = self.counters.interests_sent,
                retransmissions = self.counters.retransmissions,
                "Fetch finished"
            );
        }
    }

    fn rx_data(&mut self, arrival: &DataArrival, now: u64) {
        let seg_num = arrival.seg_num;
        if arrival.final_block {
            self.set_final_seg_num(seg_num);
        }

        let Some(seg) = self.window.get(seg_num) else {
            self.counters.ignored_arrivals += 1;
            return;
        };
        let (n_retx, tx_time) = (seg.n_retx, seg.tx_time);

        if !self.retx_queue.remove(&mut self.window, seg_num) {
            self.n_in_flight -= 1;
            self.timers
                .cancel(self.slot_timers[self.window.slot_of(seg_num)]);
        }

        if n_retx == 0 {
            self.rtte.push(now, now.saturating_sub(tx_time));
        }

        if arrival.congestion_marked {
            self.counters.congestion_marks += 1;
            self.decrease_cwnd(now, "congestion mark");
        } else {
            let srtt = if self.rtte.has_sample() {
                self.rtte.srtt_ticks()
            } else {
                self.rtte.rto_ticks() as f64
            };
            self.cc.increase(now, srtt);
        }

        self.hi_data_seg_num = Some(self.hi_data_seg_num.map_or(seg_num, |hi| hi.max(seg_num)));
        self.counters.data_received += 1;
        self.window.delete(seg_num);
    }

    /// Applies a congestion window decrease unless one already happened
    /// within the current round trip. Returns whether it was applied.
    fn decrease_cwnd(&mut self, now: u64, cause: &'static str) -> bool {
        if let Some(mark) = self.cwnd_decrease_mark {
            if !self.hi_data_seg_num.is_some_and(|hi| hi > mark) {
                return false;
            }
        }
        self.cwnd_decrease_mark = Some(self.window.hi());

        let old_cwnd = self.cc.raw_cwnd();
        self.cc.decrease(now);
        self.counters.cwnd_decreases += 1;
        tracing::debug!(
            cause,
            old_cwnd,
            new_cwnd = self.cc.raw_cwnd(),
            ssthresh = self.cc.ssthresh(),
            n_in_flight = self.n_in_flight,
            "Congestion window decreased"
        );
        true
    }

    /// State of segment `seg_num`, if it is outstanding.
    pub fn segment(&self, seg_num: u64) -> Option<&Segment> {
        self.window.get(seg_num)
    }

    /// Interests awaiting Data or timeout.
    pub fn n_in_flight(&self) -> usize {
        self.n_in_flight
    }

    /// Segments waiting to be retransmitted.
    pub fn n_retx_queued(&self) -> usize {
        self.retx_queue.len()
    }

    /// Usable congestion window in segments.
    pub fn cwnd(&self) -> usize {
        self.cc.cwnd()
    }

    pub fn congestion_controller(&self) -> &CongestionController {
        &self.cc
    }

    pub fn rtt_estimator(&self) -> &RttEstimator {
        &self.rtte
    }

    /// Lowest segment number not yet retrieved.
    pub fn lo_seg_num(&self) -> u64 {
        self.window.lo()
    }

    /// Next segment number that has never been requested.
    pub fn hi_seg_num(&self) -> u64 {
        self.window.hi()
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            algorithm: self.cc.algorithm(),
            interests_sent: self.counters.interests_sent,
            retransmissions: self.counters.retransmissions,
            data_received: self.counters.data_received,
            congestion_marks: self.counters.congestion_marks,
            ignored_arrivals: self.counters.ignored_arrivals,
            rto_expiries: self.counters.rto_expiries,
            cwnd_decreases: self.counters.cwnd_decreases,
            cwnd: self.cc.cwnd(),
            in_flight: self.n_in_flight,
            retx_queued: self.retx_queue.len(),
            srtt: self.rtte.has_sample().then(|| self.rtte.srtt()),
            rto: self.rtte.rto(),
        }
    }
}

impl<T: TimeSource> std::fmt::Debug for FetchEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEngine")
            .field("lo", &self.window.lo())
            .field("hi", &self.window.hi())
            .field("final_seg_num", &self.final_seg_num())
            .field("n_in_flight", &self.n_in_flight)
            .field("cwnd", &self.cc.cwnd())
            .finish_non_exhaustive()
    }
}
