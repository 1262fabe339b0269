//! Round-robin driver for several independent fetch sessions.
//!
//! A [`FetchWorker`] owns a set of [`FetchEngine`]s and polls each of them
//! once per [`FetchWorker::run_once`] call. Sessions share no state, so the
//! only thing the worker adds is scheduling: every session gets one
//! tick → transmit → receive pass per iteration, in insertion order.
//!
//! Packet I/O stays outside the crate behind the [`SessionIo`] trait.

use std::fmt;

use crate::clock::{RealTime, TimeSource};
use crate::engine::{DataArrival, FetchEngine};
use crate::stats::FetchStats;

/// Default number of Interests a session may emit per iteration.
pub const DEFAULT_BURST_LIMIT: usize = 64;

/// Identifies a session within one [`FetchWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Packet I/O for fetch sessions.
///
/// Implementations own Interest/Data encoding, name construction and
/// demultiplexing Data to the session it belongs to.
pub trait SessionIo {
    /// Transmits one Interest per segment number for session `id`.
    fn transmit(&mut self, id: SessionId, seg_nums: &[u64]);

    /// Appends Data received for session `id` since the last call to `out`.
    fn receive(&mut self, id: SessionId, out: &mut Vec<DataArrival>);
}

/// Counters of one [`FetchWorker::run_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub timers_fired: usize,
    pub interests_sent: usize,
    pub data_received: usize,
}

pub struct FetchWorker<T: TimeSource = RealTime> {
    sessions: Vec<(SessionId, FetchEngine<T>)>,
    next_id: u32,
    burst_limit: usize,
    rx_buf: Vec<DataArrival>,
}

impl<T: TimeSource> Default for FetchWorker<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BURST_LIMIT)
    }
}

impl<T: TimeSource> FetchWorker<T> {
    /// Creates a worker letting each session emit at most `burst_limit`
    /// Interests per iteration.
    pub fn new(burst_limit: usize) -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 0,
            burst_limit: burst_limit.max(1),
            rx_buf: Vec::new(),
        }
    }

    /// Starts polling `engine` and returns its session id.
    pub fn add_session(&mut self, engine: FetchEngine<T>) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        tracing::debug!(session = %id, final_seg_num = ?engine.final_seg_num(), "Session added");
        self.sessions.push((id, engine));
        id
    }

    /// Stops polling a session and hands its engine back. In-flight
    /// Interests are abandoned.
    pub fn remove_session(&mut self, id: SessionId) -> Option<FetchEngine<T>> {
        let idx = self.sessions.iter().position(|(sid, _)| *sid == id)?;
        Some(self.sessions.remove(idx).1)
    }

    pub fn session(&self, id: SessionId) -> Option<&FetchEngine<T>> {
        self.sessions
            .iter()
            .find_map(|(sid, engine)| (*sid == id).then_some(engine))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Polls every session once.
    pub fn run_once(&mut self, io: &mut impl SessionIo) -> PollSummary {
        let mut summary = PollSummary::default();
        for (id, engine) in &mut self.sessions {
            if engine.finished() {
                continue;
            }
            summary.timers_fired += engine.tick();

            let seg_nums = engine.tx_interest_burst(self.burst_limit);
            if !seg_nums.is_empty() {
                summary.interests_sent += seg_nums.len();
                io.transmit(*id, &seg_nums);
            }

            self.rx_buf.clear();
            io.receive(*id, &mut self.rx_buf);
            if !self.rx_buf.is_empty() {
                summary.data_received += self.rx_buf.len();
                engine.rx_data_burst(&self.rx_buf);
            }
        }
        summary
    }

    /// Removes finished sessions and returns their final statistics.
    pub fn take_finished(&mut self) -> Vec<(SessionId, FetchStats)> {
        let mut finished = Vec::new();
        self.sessions.retain(|(id, engine)| {
            if !engine.finished() {
                return true;
            }
            let stats = engine.stats();
            tracing::info!(session = %id, %stats, "Session finished");
            finished.push((*id, stats));
            false
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::clock::VirtualTime;
    use crate::config::FetchConfig;
    use crate::congestion::CongestionControlConfig;
    use crate::engine::SegmentRange;

    /// Answers every Interest on the next receive, no loss.
    #[derive(Default)]
    struct EchoIo {
        pending: HashMap<SessionId, Vec<u64>>,
        transmitted: Vec<(SessionId, u64)>,
    }

    impl SessionIo for EchoIo {
        fn transmit(&mut self, id: SessionId, seg_nums: &[u64]) {
            self.pending.entry(id).or_default().extend_from_slice(seg_nums);
            self.transmitted
                .extend(seg_nums.iter().map(|&seg_num| (id, seg_num)));
        }

        fn receive(&mut self, id: SessionId, out: &mut Vec<DataArrival>) {
            if let Some(seg_nums) = self.pending.remove(&id) {
                out.extend(seg_nums.into_iter().map(DataArrival::new));
            }
        }
    }

    fn engine(time: &VirtualTime, n_segments: u64) -> FetchEngine<VirtualTime> {
        let config = FetchConfig {
            window_capacity: 256,
            congestion: CongestionControlConfig::fixed_window(4),
            ..Default::default()
        };
        FetchEngine::new_with_time_source(&config, SegmentRange::new(0, n_segments), time.clone())
            .unwrap()
    }

    #[test_log::test]
    fn test_round_robin_completes_all_sessions() {
        let time = VirtualTime::new();
        let mut worker = FetchWorker::new(2);
        let a = worker.add_session(engine(&time, 6));
        let b = worker.add_session(engine(&time, 3));
        assert_ne!(a, b);

        let mut io = EchoIo::default();
        let first = worker.run_once(&mut io);
        assert_eq!(first.interests_sent, 4, "burst limit applies per session");
        assert_eq!(first.data_received, 4);
        assert_eq!(&io.transmitted[..4], &[(a, 0), (a, 1), (b, 0), (b, 1)]);

        let mut finished = Vec::new();
        for _ in 0..10 {
            time.advance(Duration::from_millis(1));
            worker.run_once(&mut io);
            finished.extend(worker.take_finished());
        }

        assert!(worker.is_empty());
        let ids: Vec<_> = finished.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![b, a], "shorter session finishes first");
        assert_eq!(finished[1].1.data_received, 6);
        assert_eq!(finished[1].1.retransmissions, 0);
    }

    #[test]
    fn test_remove_session() {
        let time = VirtualTime::new();
        let mut worker = FetchWorker::default();
        let id = worker.add_session(engine(&time, 10));
        assert!(worker.session(id).is_some());

        let engine = worker.remove_session(id).unwrap();
        assert_eq!(engine.lo_seg_num(), 0);
        assert!(worker.remove_session(id).is_none());
        assert!(worker.is_empty());
    }
}
