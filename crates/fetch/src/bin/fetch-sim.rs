//! Runs fetch sessions over a simulated lossy link in virtual time and
//! prints their statistics.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use ndn_fetch::sim::{run_simulation, NetworkCondition, SimulatedLink};
use ndn_fetch::{
    CongestionControlAlgorithm, FetchConfig, FetchEngine, FetchWorker, SegmentRange, VirtualTime,
};

#[derive(Parser, Debug)]
#[command(name = "fetch-sim")]
#[command(about = "Simulate congestion-controlled segment fetching over a lossy link")]
struct Args {
    /// Segments per fetched object
    #[arg(long, default_value_t = 10_000)]
    segments: u64,

    /// Number of concurrent sessions
    #[arg(long, default_value_t = 1)]
    sessions: u32,

    /// Base round-trip time in milliseconds
    #[arg(long, default_value_t = 50)]
    rtt_ms: u64,

    /// RTT jitter as a fraction in [0, 1), e.g. 0.1 for ±10%
    #[arg(long, value_parser = parse_jitter)]
    jitter: Option<f64>,

    /// Probability that a packet is lost
    #[arg(long, default_value_t = 0.0, value_parser = parse_probability)]
    loss: f64,

    /// Probability that a Data packet carries a congestion mark
    #[arg(long, default_value_t = 0.0, value_parser = parse_probability)]
    mark: f64,

    /// Mark Data while more than this many packets are in transit
    #[arg(long)]
    queue: Option<usize>,

    /// Seed for loss, marks and jitter
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Congestion control algorithm (cubic, fixed-window); overrides the config file
    #[arg(long)]
    algorithm: Option<CongestionControlAlgorithm>,

    /// TOML engine configuration
    #[arg(long, env = "NDN_FETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this much virtual time, in seconds
    #[arg(long, default_value_t = 600)]
    deadline_secs: u64,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|err| format!("{err}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not in [0, 1]"))
    }
}

fn parse_jitter(s: &str) -> Result<f64, String> {
    let jitter: f64 = s.parse().map_err(|err| format!("{err}"))?;
    if (0.0..1.0).contains(&jitter) {
        Ok(jitter)
    } else {
        Err(format!("{jitter} is not in [0, 1)"))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    ndn_fetch::tracer::init_tracer(args.log_level.or(Some(LevelFilter::INFO)))?;

    let mut config = match &args.config {
        Some(path) => FetchConfig::from_file(path)?,
        None => FetchConfig::default(),
    };
    if let Some(algorithm) = args.algorithm {
        config.congestion.algorithm = algorithm;
    }
    config.validate()?;

    let time = VirtualTime::new();
    let mut condition = NetworkCondition::custom(args.rtt_ms, args.jitter, args.loss)
        .with_mark_rate(args.mark);
    if let Some(queue) = args.queue {
        condition = condition.with_mark_threshold(queue);
    }
    let mut link = SimulatedLink::new(time.clone(), condition, args.seed);

    let mut worker = FetchWorker::default();
    for _ in 0..args.sessions {
        let engine =
            FetchEngine::new_with_time_source(&config, SegmentRange::unbounded(0), time.clone())?;
        let id = worker.add_session(engine);
        link.set_object_len(id, args.segments);
    }

    tracing::info!(
        segments = args.segments,
        sessions = args.sessions,
        algorithm = %config.congestion.algorithm,
        ?condition,
        "Starting simulation"
    );
    let report = run_simulation(
        &mut worker,
        &mut link,
        config.timer_interval,
        Duration::from_secs(args.deadline_secs),
    );

    for (id, stats) in &report.finished {
        println!("{id}: {stats}");
    }
    let elapsed = report.elapsed.as_secs_f64();
    let delivered = report.finished.len() as f64 * args.segments as f64;
    println!(
        "elapsed={:.3}s goodput={:.0} segments/s link={:?}",
        elapsed,
        if elapsed > 0.0 { delivered / elapsed } else { 0.0 },
        report.link,
    );

    if !report.completed() {
        anyhow::bail!(
            "{} session(s) unfinished after {:?}",
            report.unfinished,
            report.elapsed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_fractions_out_of_range() {
        assert!(Args::try_parse_from(["fetch-sim", "--jitter", "1.5"]).is_err());
        assert!(Args::try_parse_from(["fetch-sim", "--jitter", "-0.1"]).is_err());
        assert!(Args::try_parse_from(["fetch-sim", "--loss", "2"]).is_err());

        let args = Args::try_parse_from(["fetch-sim", "--jitter", "0.2", "--mark", "1"]).unwrap();
        assert_eq!(args.jitter, Some(0.2));
        assert_eq!(args.mark, 1.0);
    }
}
