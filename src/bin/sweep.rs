use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lux_tuner::configuration::Configuration;
use lux_tuner::logger::init_logger;
use lux_tuner::params::Knob;
use lux_tuner::sweep::{default_plan, SimulatorEvaluator, SweepConfig, SweepDriver};

/// Tune the agent one knob at a time against the simulator.
///
/// Runner behaviour (simulator command, containment, logging) comes from the same LUX_*
/// environment variables as `play_match`.
#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Agent reading the parameter file (default: the local build)
    #[arg(long)]
    agent: Option<PathBuf>,

    /// Opponent (default: same as the agent)
    #[arg(long)]
    opponent: Option<PathBuf>,

    /// Kill a match still running after this many seconds
    #[arg(long, default_value_t = 35)]
    timeout_secs: u64,

    /// Directory of the agent's score logs and of the report
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Parameter file read by the agent at startup
    #[arg(long, default_value = lux_tuner::params::DEFAULT_PARAMETER_FILE)]
    param_file: PathBuf,

    /// Comma-separated seeds (default: 1,2,5,10,25,50,100,200,500,1000)
    #[arg(long, value_delimiter = ',')]
    seeds: Vec<u64>,

    /// Only sweep these knobs, still in their default order (e.g. pathLength,pathStep)
    #[arg(long, value_delimiter = ',')]
    axis: Vec<Knob>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Configuration::from_env();
    if config.log_enabled() {
        init_logger("sweep")?;
    }

    let mut sweep = SweepConfig {
        timeout: Duration::from_secs(cli.timeout_secs),
        results_dir: cli.results_dir,
        parameter_file: cli.param_file,
        ..SweepConfig::default()
    };
    if let Some(agent) = cli.agent {
        let opponent = cli.opponent.unwrap_or_else(|| agent.clone());
        sweep.agents = [agent, opponent];
    } else if let Some(opponent) = cli.opponent {
        sweep.agents[1] = opponent;
    }
    if !cli.seeds.is_empty() {
        sweep.seeds = cli.seeds;
    }
    if !cli.axis.is_empty() {
        sweep.axes = default_plan()
            .into_iter()
            .filter(|a| cli.axis.contains(&a.knob))
            .collect();
    }

    println!("{config}");
    print!("{sweep}");

    let evaluator = SimulatorEvaluator::new(config, &sweep);
    let report = SweepDriver::new(sweep, evaluator).run()?;

    println!("final parameters: {}", report.parameters);
    Ok(())
}
