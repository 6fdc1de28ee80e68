//! Batches of matches between the same two agents.
//!
//! [`BatchRunner`] runs one match per seed on a bounded pool of worker threads, each thread
//! owning one simulator process. Results are printed as they complete; their order does not
//! matter since every seed is independent.
//!
//! When the batch holds a single seed, both agents' logs are printed once the match is over.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, Once};

use anyhow::Context;
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::configuration::Configuration;
use crate::match_runner::{dump_agent_logs, run_match, MatchReport, MatchSpec};
use crate::scheduler::SeedScheduler;
use crate::summary::Outcome;

/// Seed used when none is requested.
pub const DEFAULT_SEED: u64 = 100;

/// Largest seed drawn by [`SeedSelection::Random`].
pub const MAX_RANDOM_SEED: u64 = 10_000;

/// Which seeds a batch runs: `N` means `0..N`, `rN` means N random seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSelection {
    Sequential(u64),
    Random(u64),
}

impl SeedSelection {
    pub fn seeds(self) -> Vec<u64> {
        match self {
            SeedSelection::Sequential(n) => (0..n).collect(),
            SeedSelection::Random(n) => {
                let mut rng = rand::rng();
                (0..n).map(|_| rng.random_range(0..=MAX_RANDOM_SEED)).collect()
            }
        }
    }
}

impl FromStr for SeedSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (random, count) = if s.contains('r') {
            (true, s.replace('r', ""))
        } else {
            (false, s.to_string())
        };
        let count = count
            .parse()
            .with_context(|| format!("'{s}' is not a seed count (N or rN)"))?;
        Ok(if random {
            SeedSelection::Random(count)
        } else {
            SeedSelection::Sequential(count)
        })
    }
}

/// What a batch left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// One report per seed, ordered by seed
    pub reports: Vec<MatchReport>,
    /// Agent logs printed after a single-seed batch, empty otherwise
    pub agent_logs: Vec<PathBuf>,
}

/// Runs the same pairing over many seeds.
pub struct BatchRunner {
    config: Configuration,
    template: MatchSpec,
}

impl BatchRunner {
    /// `template` gives everything but the seed.
    pub fn new(config: Configuration, template: MatchSpec) -> Self {
        BatchRunner { config, template }
    }

    /// Shortcut for a default match between `agents`.
    pub fn with_agents(config: Configuration, agents: [PathBuf; 2]) -> Self {
        Self::new(config, MatchSpec::new(0, agents))
    }

    /// Run one match per seed and return the reports ordered by seed.
    ///
    /// A match that fails in any way is reported as [`Outcome::Crash`]; the batch always
    /// completes. A single-seed batch also prints both agents' logs.
    #[instrument(skip_all, fields(seeds = seeds.len()))]
    pub fn run(&self, seeds: &[u64]) -> BatchResult {
        let workers = self.config.worker_count(seeds.len());
        info!(workers, "starting batch");
        let show_running = seeds.len() > 1;

        setup_panic_hook();
        if show_running {
            disable_line_wrap();
        }

        let mut scheduler = SeedScheduler::new(seeds.to_vec(), workers);
        let (tx_result, rx_result) = mpsc::channel();
        let running = Arc::new(Mutex::new(vec![]));
        let mut reports = Vec::with_capacity(seeds.len());

        for seed in scheduler.advance() {
            self.launch_match(seed, tx_result.clone(), &running, show_running);
        }
        while !scheduler.is_finished() {
            // not finished <=> match running <=> result to receive
            let Ok(report) = rx_result.recv() else {
                warn!("result channel closed before the batch finished");
                break;
            };
            reports.push(report);
            for seed in scheduler.on_result() {
                self.launch_match(seed, tx_result.clone(), &running, show_running);
            }
        }

        if show_running {
            enable_line_wrap();
        }
        let agent_logs = if seeds.len() == 1 {
            dump_agent_logs(&self.config.logs_root)
        } else {
            vec![]
        };

        reports.sort_by_key(|r| r.seed);
        BatchResult {
            reports,
            agent_logs,
        }
    }

    fn launch_match(
        &self,
        seed: u64,
        tx_result: Sender<MatchReport>,
        running: &Arc<Mutex<Vec<u64>>>,
        show_running: bool,
    ) {
        let spec = MatchSpec {
            seed,
            ..self.template.clone()
        };
        let config = self.config.clone();
        let mutex = running.clone();

        update_running(&mutex, show_running, |r| r.push(seed));

        std::thread::spawn(move || {
            let report = run_match(&spec, &config).unwrap_or_else(|e| {
                warn!("match failed: {e:#}");
                MatchReport {
                    seed,
                    outcome: Outcome::Crash,
                    replay_file: None,
                    stderr: format!("{e:#}"),
                    elapsed: spec.timeout.unwrap_or_default(),
                }
            });

            update_running(&mutex, false, |r| r.retain(|&s| s != seed));
            // clear line, result, start of line
            println!("\x1b[2K{}\x1b[0G", report.summary_line());
            if show_running {
                update_running(&mutex, true, |_| {});
            }

            let _ = tx_result.send(report);
        });
    }
}

/// Count of each outcome in `reports`.
pub fn tally(reports: &[MatchReport]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for outcome in [Outcome::Win, Outcome::Defeat, Outcome::Draw, Outcome::Crash] {
        let n = reports.iter().filter(|r| r.outcome == outcome).count();
        counts.insert(outcome.label().trim_end(), n);
    }
    counts
}

fn update_running(mutex: &Mutex<Vec<u64>>, print: bool, f: impl FnOnce(&mut Vec<u64>)) {
    let mut guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
    if print {
        print_running_matches(&guard);
    }
}

fn print_running_matches(running: &[u64]) {
    // clear, green, default, start of line
    print!(
        "\x1b[2K\x1b[32mRunning...:\x1b[39m {}\x1b[0G",
        running
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

static PANIC_HOOK: Once = Once::new();

/// A panicking worker would leave the batch waiting forever: exit instead.
///
/// Installed once per process, however many batches run.
fn setup_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let orig_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            enable_line_wrap();
            orig_hook(panic_info);
            std::process::exit(1);
        }));
    });
}

fn disable_line_wrap() {
    print!("\x1b[?7l");
}

fn enable_line_wrap() {
    print!("\x1b[?7h");
}
