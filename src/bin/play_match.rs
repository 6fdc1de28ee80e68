use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use lux_tuner::batch::{tally, BatchRunner, SeedSelection, DEFAULT_SEED};
use lux_tuner::configuration::Configuration;
use lux_tuner::logger::init_logger;
use lux_tuner::match_runner::MatchSpec;
use lux_tuner::DEFAULT_AGENT;

/// Play the simulator between two agents, one match per seed.
///
/// Environment: LUX_CPU, LUX_SILENT, LUX_VERBOSE, LUX_NO_TIMEOUT, LUX_LOG, LUX_SIMULATOR,
/// LUX_LOGS_ROOT, LUX_CONTAINED, LUX_ALLOW_UNCONTAINED.
#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Number of seeds: `N` plays seeds 0..N, `rN` plays N random seeds (default: seed 100)
    seeds: Option<SeedSelection>,

    /// The two agent executables (default: the local build, against itself)
    #[arg(num_args = 0..=2)]
    agents: Vec<PathBuf>,

    /// Ask the simulator for a stateful replay
    #[arg(long)]
    stateful_replay: bool,

    /// Simulator log level
    #[arg(long, default_value_t = 0)]
    log_level: u8,

    /// Kill a match still running after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Configuration::from_env();
    if config.log_enabled() {
        init_logger("play_match")?;
    }

    let agents = match cli.agents.as_slice() {
        [] => [PathBuf::from(DEFAULT_AGENT), PathBuf::from(DEFAULT_AGENT)],
        [a, b] => [a.clone(), b.clone()],
        _ => bail!("expected two agent paths, got {}", cli.agents.len()),
    };
    let seeds = cli
        .seeds
        .map(SeedSelection::seeds)
        .unwrap_or_else(|| vec![DEFAULT_SEED]);

    println!(
        "Using bots\x1b[33m {} {} \x1b[0m",
        agents[0].display(),
        agents[1].display()
    );

    let mut template = MatchSpec::new(0, agents)
        .with_log_level(cli.log_level)
        .with_stateful_replay(cli.stateful_replay);
    if let Some(secs) = cli.timeout_secs {
        template = template.with_timeout(Duration::from_secs(secs));
    }

    let reports = BatchRunner::new(config, template).run(&seeds).reports;
    if reports.len() > 1 {
        let summary = tally(&reports)
            .into_iter()
            .map(|(label, n)| format!("{label}: {n}"))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{summary}");
    }
    Ok(())
}
