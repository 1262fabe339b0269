//! Deterministic lossy link for driving fetch sessions in virtual time.
//!
//! [`SimulatedLink`] implements [`SessionIo`]: every transmitted Interest is
//! either dropped or answered with a Data packet that becomes receivable
//! one (jittered) RTT later. Loss, congestion marks and jitter come from a
//! seeded [`SmallRng`], so a run is fully reproducible from its seed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::clock::{TimeSource, VirtualTime};
use crate::engine::DataArrival;
use crate::stats::FetchStats;
use crate::worker::{FetchWorker, SessionId, SessionIo};

/// Largest jitter fraction accepted by [`NetworkCondition::custom`].
pub const MAX_JITTER: f64 = 0.99;

/// Path characteristics of a simulated link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkCondition {
    /// Base round-trip time.
    pub rtt: Duration,
    /// Jitter as `(min_multiplier, max_multiplier)` applied to the RTT.
    pub jitter: Option<(f64, f64)>,
    /// Probability that an Interest or its Data is lost.
    pub loss_rate: f64,
    /// Probability that a delivered Data carries a congestion mark.
    pub mark_rate: f64,
    /// Data is also marked while more than this many packets are in
    /// transit, a crude stand-in for a bottleneck queue.
    pub mark_threshold: Option<usize>,
}

impl NetworkCondition {
    /// LAN: 1ms RTT, no jitter, no loss.
    pub const LAN: Self = Self {
        rtt: Duration::from_millis(1),
        jitter: None,
        loss_rate: 0.0,
        mark_rate: 0.0,
        mark_threshold: None,
    };

    /// Datacenter: 10ms RTT, ±5% jitter, no loss.
    pub const DATACENTER: Self = Self {
        rtt: Duration::from_millis(10),
        jitter: Some((0.95, 1.05)),
        loss_rate: 0.0,
        mark_rate: 0.0,
        mark_threshold: None,
    };

    /// Continental: 50ms RTT, ±10% jitter, 0.1% loss.
    pub const CONTINENTAL: Self = Self {
        rtt: Duration::from_millis(50),
        jitter: Some((0.9, 1.1)),
        loss_rate: 0.001,
        mark_rate: 0.0,
        mark_threshold: None,
    };

    /// Intercontinental: 135ms RTT, ±20% jitter, 0.5% loss.
    pub const INTERCONTINENTAL: Self = Self {
        rtt: Duration::from_millis(135),
        jitter: Some((0.8, 1.2)),
        loss_rate: 0.005,
        mark_rate: 0.0,
        mark_threshold: None,
    };

    /// High latency: 250ms RTT, ±10% jitter, 1% loss.
    pub const HIGH_LATENCY: Self = Self {
        rtt: Duration::from_millis(250),
        jitter: Some((0.9, 1.1)),
        loss_rate: 0.01,
        mark_rate: 0.0,
        mark_threshold: None,
    };

    /// Link with `rtt_ms` base RTT and `±jitter_pct` jitter.
    ///
    /// A jitter fraction that is not positive means no jitter; larger ones
    /// are capped at [`MAX_JITTER`] so the RTT never goes negative.
    pub fn custom(rtt_ms: u64, jitter_pct: Option<f64>, loss_rate: f64) -> Self {
        Self {
            rtt: Duration::from_millis(rtt_ms),
            jitter: jitter_pct.filter(|pct| *pct > 0.0).map(|pct| {
                let pct = pct.min(MAX_JITTER);
                (1.0 - pct, 1.0 + pct)
            }),
            loss_rate,
            mark_rate: 0.0,
            mark_threshold: None,
        }
    }

    pub fn with_mark_rate(mut self, mark_rate: f64) -> Self {
        self.mark_rate = mark_rate;
        self
    }

    pub fn with_mark_threshold(mut self, packets: usize) -> Self {
        self.mark_threshold = Some(packets);
        self
    }
}

/// Counters of a [`SimulatedLink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub interests: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub marked: u64,
    /// Interests for segments past the end of the object; never answered.
    pub out_of_range: u64,
}

pub struct SimulatedLink {
    time: VirtualTime,
    condition: NetworkCondition,
    rng: SmallRng,
    /// Number of segments of each session's object.
    object_len: HashMap<SessionId, u64>,
    /// Data in transit per session, keyed by `(delivery_time, seq)`.
    in_transit: HashMap<SessionId, BTreeMap<(u64, u64), DataArrival>>,
    n_in_transit: usize,
    seq: u64,
    stats: LinkStats,
}

impl SimulatedLink {
    pub fn new(time: VirtualTime, condition: NetworkCondition, seed: u64) -> Self {
        Self {
            time,
            condition,
            rng: SmallRng::seed_from_u64(seed),
            object_len: HashMap::new(),
            in_transit: HashMap::new(),
            n_in_transit: 0,
            seq: 0,
            stats: LinkStats::default(),
        }
    }

    /// Declares that session `id` fetches an object of `n_segments`
    /// segments. The Data of the last one carries the final-block flag.
    pub fn set_object_len(&mut self, id: SessionId, n_segments: u64) {
        self.object_len.insert(id, n_segments);
    }

    pub fn time(&self) -> &VirtualTime {
        &self.time
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Earliest pending delivery time, in ticks.
    pub fn next_delivery_at(&self) -> Option<u64> {
        self.in_transit
            .values()
            .filter_map(|queue| queue.keys().next().map(|(at, _)| *at))
            .min()
    }

    fn jittered_rtt(&mut self) -> Duration {
        match self.condition.jitter {
            Some((min_mult, max_mult))
                if min_mult.is_finite() && max_mult.is_finite() && min_mult <= max_mult =>
            {
                let mult = self.rng.random_range(min_mult..=max_mult).max(0.0);
                self.condition.rtt.mul_f64(mult)
            }
            _ => self.condition.rtt,
        }
    }

    fn should_drop(&mut self) -> bool {
        self.condition.loss_rate > 0.0 && self.rng.random::<f64>() < self.condition.loss_rate
    }

    fn should_mark(&mut self) -> bool {
        let congested = self
            .condition
            .mark_threshold
            .is_some_and(|threshold| self.n_in_transit > threshold);
        congested
            || (self.condition.mark_rate > 0.0
                && self.rng.random::<f64>() < self.condition.mark_rate)
    }
}

impl SessionIo for SimulatedLink {
    fn transmit(&mut self, id: SessionId, seg_nums: &[u64]) {
        let now = self.time.now();
        let rate = self.time.rate();
        let object_len = self.object_len.get(&id).copied();

        for &seg_num in seg_nums {
            self.stats.interests += 1;
            if object_len.is_some_and(|len| seg_num >= len) {
                self.stats.out_of_range += 1;
                continue;
            }
            if self.should_drop() {
                self.stats.dropped += 1;
                continue;
            }

            let deliver_at = now + rate.ticks(self.jittered_rtt());
            let arrival = DataArrival {
                seg_num,
                congestion_marked: self.should_mark(),
                final_block: object_len.is_some_and(|len| seg_num + 1 == len),
            };
            if arrival.congestion_marked {
                self.stats.marked += 1;
            }

            self.seq += 1;
            self.in_transit
                .entry(id)
                .or_default()
                .insert((deliver_at, self.seq), arrival);
            self.n_in_transit += 1;
        }
    }

    fn receive(&mut self, id: SessionId, out: &mut Vec<DataArrival>) {
        let now = self.time.now();
        let Some(queue) = self.in_transit.get_mut(&id) else {
            return;
        };
        while let Some(entry) = queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            out.push(entry.remove());
            self.n_in_transit -= 1;
            self.stats.delivered += 1;
        }
    }
}

/// Outcome of [`run_simulation`].
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Virtual time the run took.
    pub elapsed: Duration,
    /// Sessions that finished, in completion order.
    pub finished: Vec<(SessionId, FetchStats)>,
    /// Sessions still running when the deadline passed.
    pub unfinished: usize,
    pub link: LinkStats,
}

impl SimulationReport {
    pub fn completed(&self) -> bool {
        self.unfinished == 0
    }
}

/// Polls `worker` over `link`, stepping virtual time by `step` between
/// iterations, until every session finished or `deadline` of virtual time
/// has passed.
pub fn run_simulation(
    worker: &mut FetchWorker<VirtualTime>,
    link: &mut SimulatedLink,
    step: Duration,
    deadline: Duration,
) -> SimulationReport {
    let time = link.time().clone();
    let rate = time.rate();
    let start = time.now();
    let end = start.saturating_add(rate.ticks(deadline));

    let mut finished = Vec::new();
    loop {
        worker.run_once(link);
        finished.extend(worker.take_finished());
        if worker.is_empty() || time.now() >= end {
            break;
        }
        time.advance(step);
    }

    let report = SimulationReport {
        elapsed: rate.duration(time.now() - start),
        finished,
        unfinished: worker.len(),
        link: link.stats().clone(),
    };
    tracing::debug!(
        elapsed = ?report.elapsed,
        finished = report.finished.len(),
        unfinished = report.unfinished,
        dropped = report.link.dropped,
        "Simulation done"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(condition: NetworkCondition, seed: u64) -> SimulatedLink {
        SimulatedLink::new(VirtualTime::new(), condition, seed)
    }

    #[test]
    fn test_data_arrives_after_one_rtt() {
        let mut link = link(NetworkCondition::DATACENTER, 1);
        let id = SessionId::new(0);
        link.transmit(id, &[0, 1, 2]);

        let mut out = Vec::new();
        link.time().advance(Duration::from_millis(9));
        link.receive(id, &mut out);
        assert!(out.is_empty(), "±5% jitter keeps every RTT above 9ms");

        link.time().advance(Duration::from_millis(2));
        link.receive(id, &mut out);
        let mut seg_nums: Vec<_> = out.iter().map(|data| data.seg_num).collect();
        seg_nums.sort_unstable();
        assert_eq!(seg_nums, vec![0, 1, 2]);
        assert_eq!(link.stats().delivered, 3);
        assert_eq!(link.next_delivery_at(), None);
    }

    #[test]
    fn test_out_of_range_jitter_is_tamed() {
        let wide = NetworkCondition::custom(20, Some(1.5), 0.0);
        assert_eq!(wide.jitter, Some((1.0 - MAX_JITTER, 1.0 + MAX_JITTER)));
        assert_eq!(NetworkCondition::custom(20, Some(-0.2), 0.0).jitter, None);
        assert_eq!(NetworkCondition::custom(20, Some(f64::NAN), 0.0).jitter, None);

        let inverted = NetworkCondition {
            jitter: Some((1.2, 0.8)),
            ..NetworkCondition::LAN
        };
        for condition in [wide, inverted] {
            let mut link = link(condition, 7);
            let id = SessionId::new(0);
            link.transmit(id, &(0..100).collect::<Vec<_>>());
            link.time().advance(Duration::from_millis(40));

            let mut out = Vec::new();
            link.receive(id, &mut out);
            assert_eq!(out.len(), 100);
        }
    }

    #[test]
    fn test_final_block_and_out_of_range() {
        let mut link = link(NetworkCondition::LAN, 1);
        let id = SessionId::new(3);
        link.set_object_len(id, 2);
        link.transmit(id, &[0, 1, 2]);
        link.time().advance(Duration::from_millis(1));

        let mut out = Vec::new();
        link.receive(id, &mut out);
        assert_eq!(out, vec![DataArrival::new(0), DataArrival::final_block(1)]);
        assert_eq!(link.stats().out_of_range, 1);
    }

    #[test]
    fn test_sessions_are_demultiplexed() {
        let mut link = link(NetworkCondition::LAN, 1);
        let (a, b) = (SessionId::new(0), SessionId::new(1));
        link.transmit(a, &[5]);
        link.transmit(b, &[6]);
        link.time().advance(Duration::from_millis(1));

        let mut out = Vec::new();
        link.receive(b, &mut out);
        assert_eq!(out, vec![DataArrival::new(6)]);
        assert_eq!(link.next_delivery_at(), Some(1_000_000));
    }

    #[test]
    fn test_loss_is_deterministic_per_seed() {
        let lossy = NetworkCondition::custom(20, Some(0.1), 0.3).with_mark_rate(0.1);
        let run = |seed| {
            let mut link = link(lossy, seed);
            let id = SessionId::new(0);
            link.transmit(id, &(0..1_000).collect::<Vec<_>>());
            link.time().advance(Duration::from_secs(1));
            let mut out = Vec::new();
            link.receive(id, &mut out);
            (out, link.stats().clone())
        };

        let (first, stats) = run(7);
        assert_eq!(run(7).0, first);
        assert_ne!(run(8).0, first);
        assert!(stats.dropped > 200 && stats.dropped < 400, "{stats:?}");
        assert!(stats.marked > 0);
    }

    #[test]
    fn test_mark_threshold() {
        let mut link = link(NetworkCondition::LAN.with_mark_threshold(2), 1);
        let id = SessionId::new(0);
        link.transmit(id, &[0, 1, 2, 3]);
        link.time().advance(Duration::from_millis(1));

        let mut out = Vec::new();
        link.receive(id, &mut out);
        let marked: Vec<_> = out.iter().map(|data| data.congestion_marked).collect();
        assert_eq!(marked, vec![false, false, false, true]);
    }
}
