//! End-to-end fetches over the simulated link in virtual time.

use std::time::Duration;

use rstest::rstest;
use testresult::TestResult;

use ndn_fetch::sim::{run_simulation, NetworkCondition, SimulatedLink, SimulationReport};
use ndn_fetch::{
    CongestionControlConfig, FetchConfig, FetchEngine, FetchWorker, SegmentRange, VirtualTime,
};

const STEP: Duration = Duration::from_millis(1);
const DEADLINE: Duration = Duration::from_secs(600);

struct Setup {
    config: FetchConfig,
    condition: NetworkCondition,
    seed: u64,
    sessions: u32,
    segments: u64,
    /// Announce the object length up front instead of learning it from Data.
    bounded: bool,
}

impl Setup {
    fn new(condition: NetworkCondition, segments: u64) -> Self {
        Self {
            config: FetchConfig {
                window_capacity: 4096,
                ..Default::default()
            },
            condition,
            seed: 0xfe7c,
            sessions: 1,
            segments,
            bounded: false,
        }
    }

    fn run(&self) -> Result<SimulationReport, ndn_fetch::FetchError> {
        let time = VirtualTime::new();
        let mut link = SimulatedLink::new(time.clone(), self.condition, self.seed);
        let mut worker = FetchWorker::default();
        for _ in 0..self.sessions {
            let range = if self.bounded {
                SegmentRange::new(0, self.segments)
            } else {
                SegmentRange::unbounded(0)
            };
            let engine = FetchEngine::new_with_time_source(&self.config, range, time.clone())?;
            let id = worker.add_session(engine);
            link.set_object_len(id, self.segments);
        }
        Ok(run_simulation(&mut worker, &mut link, STEP, DEADLINE))
    }
}

#[rstest]
#[case::lan(NetworkCondition::LAN)]
#[case::datacenter(NetworkCondition::DATACENTER)]
#[case::continental(NetworkCondition::CONTINENTAL)]
#[case::intercontinental(NetworkCondition::INTERCONTINENTAL)]
#[case::high_latency(NetworkCondition::HIGH_LATENCY)]
fn test_cubic_fetch_completes(#[case] condition: NetworkCondition) -> TestResult {
    let report = Setup::new(condition, 2_000).run()?;

    assert!(report.completed(), "{report:?}");
    let (_, stats) = &report.finished[0];
    assert_eq!(stats.data_received, 2_000);
    if condition.loss_rate == 0.0 {
        assert_eq!(stats.retransmissions, 0, "{stats}");
    }
    Ok(())
}

#[rstest]
#[case::bounded(true)]
#[case::unbounded(false)]
fn test_many_sessions_share_a_lossy_link(#[case] bounded: bool) -> TestResult {
    let setup = Setup {
        sessions: 4,
        bounded,
        ..Setup::new(NetworkCondition::custom(30, Some(0.1), 0.02), 500)
    };
    let report = setup.run()?;

    assert!(report.completed(), "{report:?}");
    assert_eq!(report.finished.len(), 4);
    for (id, stats) in &report.finished {
        assert_eq!(stats.data_received, 500, "{id}: {stats}");
    }
    assert!(report.link.dropped > 0);
    let retransmissions: u64 = report
        .finished
        .iter()
        .map(|(_, stats)| stats.retransmissions)
        .sum();
    // Every lost Interest forces at least one retransmission of its segment.
    assert!(retransmissions >= report.link.dropped);
    if bounded {
        assert_eq!(report.link.out_of_range, 0);
    }
    Ok(())
}

#[test_log::test]
fn test_same_seed_same_run() -> TestResult {
    let setup = Setup::new(NetworkCondition::INTERCONTINENTAL.with_mark_rate(0.01), 1_000);
    let first = setup.run()?;
    let second = setup.run()?;

    assert_eq!(first.elapsed, second.elapsed);
    assert_eq!(first.link, second.link);
    assert_eq!(first.finished, second.finished);

    let other = Setup { seed: 99, ..setup }.run()?;
    assert_ne!(first.finished, other.finished);
    Ok(())
}

#[test_log::test]
fn test_congestion_marks_shrink_the_window() -> TestResult {
    let queued = Setup::new(NetworkCondition::DATACENTER.with_mark_threshold(32), 5_000).run()?;
    assert!(queued.completed());
    let (_, stats) = &queued.finished[0];
    assert!(stats.congestion_marks > 0);
    assert!(stats.cwnd_decreases > 0);
    assert!(stats.cwnd_decreases <= stats.congestion_marks);
    assert_eq!(stats.retransmissions, 0, "marks are not losses");
    Ok(())
}

#[test_log::test]
fn test_fixed_window_paces_one_window_per_round_trip() -> TestResult {
    let setup = Setup {
        config: FetchConfig {
            window_capacity: 256,
            congestion: CongestionControlConfig::fixed_window(8),
            ..Default::default()
        },
        bounded: true,
        ..Setup::new(NetworkCondition::custom(10, None, 0.0), 800)
    };
    let report = setup.run()?;

    assert!(report.completed());
    // 100 rounds of ~10ms RTT plus polling delay.
    assert!(report.elapsed >= Duration::from_millis(1_000), "{report:?}");
    assert!(report.elapsed <= Duration::from_millis(1_500), "{report:?}");
    Ok(())
}

#[test_log::test]
fn test_cubic_outgrows_a_small_fixed_window() -> TestResult {
    let condition = NetworkCondition::custom(40, None, 0.0);
    let cubic = Setup::new(condition, 3_000).run()?;
    let fixed = Setup {
        config: FetchConfig {
            congestion: CongestionControlConfig::fixed_window(2),
            ..Default::default()
        },
        ..Setup::new(condition, 3_000)
    }
    .run()?;

    assert!(cubic.completed() && fixed.completed());
    assert!(cubic.elapsed * 10 < fixed.elapsed, "{cubic:?} vs {fixed:?}");
    Ok(())
}
