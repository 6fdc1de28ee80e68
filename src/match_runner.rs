//! One simulator match, from launch to classified result.

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::cgroup_manager::spawn_process;
use crate::configuration::Configuration;
use crate::summary::{MatchSummary, Outcome};

/// `--maxtime` given to the simulator in no-timeout mode.
pub const NO_TIMEOUT_MAXTIME: u64 = 1_000_000_000;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const BRIGHT_MAGENTA: &str = "\x1b[95m";
const RESET: &str = "\x1b[0m";

/// Everything needed to run one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    pub seed: u64,
    pub agents: [PathBuf; 2],
    /// Wall-clock limit after which the whole match is killed
    pub timeout: Option<Duration>,
    /// Simulator per-step time budget (`--maxtime`)
    pub max_time: Option<u64>,
    pub log_level: u8,
    pub stateful_replay: bool,
}

impl MatchSpec {
    pub fn new(seed: u64, agents: [PathBuf; 2]) -> Self {
        Self {
            seed,
            agents,
            timeout: None,
            max_time: None,
            log_level: 0,
            stateful_replay: false,
        }
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    #[must_use]
    pub fn with_max_time(self, max_time: u64) -> Self {
        Self {
            max_time: Some(max_time),
            ..self
        }
    }

    #[must_use]
    pub fn with_log_level(self, log_level: u8) -> Self {
        Self { log_level, ..self }
    }

    #[must_use]
    pub fn with_stateful_replay(self, stateful_replay: bool) -> Self {
        Self {
            stateful_replay,
            ..self
        }
    }

    /// Simulator arguments, agents last.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--seed={}", self.seed),
            format!("--loglevel={}", self.log_level),
        ];
        if self.stateful_replay {
            args.push("--statefulReplay".to_string());
        }
        if let Some(max_time) = self.max_time {
            args.push(format!("--maxtime={max_time}"));
        }
        args.extend(self.agents.iter().map(|a| a.to_string_lossy().into_owned()));
        args
    }
}

impl Display for MatchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[seed {}: {} VS {}]",
            self.seed,
            self.agents[0].display(),
            self.agents[1].display()
        )
    }
}

/// Classified result of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub seed: u64,
    pub outcome: Outcome,
    pub replay_file: Option<String>,
    pub stderr: String,
    pub elapsed: Duration,
}

impl MatchReport {
    /// One line per game: seed, outcome and replay path.
    pub fn summary_line(&self) -> String {
        let color = if self.outcome == Outcome::Crash {
            RED
        } else {
            MAGENTA
        };
        format!(
            "Game seed={:6} {color}{}{RESET} replay={}",
            self.seed,
            self.outcome.label(),
            self.replay_file.as_deref().unwrap_or("-")
        )
    }
}

/// The match was still running at its deadline and was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTimeout {
    pub seed: u64,
    pub timeout: Duration,
}

impl Display for MatchTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "match with seed {} killed after {:?}",
            self.seed, self.timeout
        )
    }
}

impl std::error::Error for MatchTimeout {}

/// Run one match and classify it.
///
/// A simulator that cannot be launched or whose output cannot be parsed gives
/// [`Outcome::Crash`], never an error.
///
/// # Errors
/// [`MatchTimeout`] when `spec.timeout` elapsed before the simulator exited, and failures to
/// wait on or kill the child process.
#[instrument(skip_all, fields(seed = spec.seed))]
pub fn run_match(spec: &MatchSpec, config: &Configuration) -> anyhow::Result<MatchReport> {
    let mut spec = spec.clone();
    if config.no_timeout && spec.max_time.is_none() {
        spec.max_time = Some(NO_TIMEOUT_MAXTIME);
    }
    let args = spec.args();
    debug!(simulator = %config.simulator, ?args);
    if config.verbose {
        println!("{YELLOW}$ {} {}{RESET}", config.simulator, args.join(" "));
    }

    let process = match spawn_process(&config.simulator, &args, config) {
        Ok(process) => process,
        Err(e) => {
            warn!("simulator launch failed: {e:#}");
            return Ok(crash(&spec, format!("{e:#}"), Duration::ZERO));
        }
    };

    let output = process
        .wait_with_deadline(spec.timeout)
        .context("simulator process handling failed")?;
    if output.timed_out() {
        warn!(elapsed = ?output.elapsed, "match timed out");
        return Err(MatchTimeout {
            seed: spec.seed,
            timeout: spec.timeout.unwrap_or_default(),
        }
        .into());
    }

    if !output.stderr.is_empty() && !config.silent {
        print_stderr(&output.stderr);
    }
    if config.verbose {
        println!("{}", output.stdout);
    }

    let classified = MatchSummary::parse(&output.stdout)
        .and_then(|summary| summary.outcome().map(|outcome| (outcome, summary.replay_file)));
    let report = match classified {
        Ok((outcome, replay_file)) => MatchReport {
            seed: spec.seed,
            outcome,
            replay_file,
            stderr: output.stderr,
            elapsed: output.elapsed,
        },
        Err(e) => {
            warn!(raw = %output.stdout, "unusable simulator output: {e:#}");
            if config.verbose {
                println!("{RED}Could not read simulator output: {e:#}{RESET}");
            }
            crash(&spec, output.stderr, output.elapsed)
        }
    };
    info!(outcome = %report.outcome, replay = ?report.replay_file, "match finished");
    Ok(report)
}

fn crash(spec: &MatchSpec, stderr: String, elapsed: Duration) -> MatchReport {
    MatchReport {
        seed: spec.seed,
        outcome: Outcome::Crash,
        replay_file: None,
        stderr,
        elapsed,
    }
}

fn print_stderr(stderr: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{RED}Errors occured: ----------------{RESET}");
    let _ = writeln!(out, "{}", stderr.trim_end());
    let _ = writeln!(out, "{RED}--------------------------------{RESET}");
}

/// Most recently created directory directly under `logs_root`.
pub fn latest_log_dir(logs_root: &Path) -> anyhow::Result<PathBuf> {
    let entries = std::fs::read_dir(logs_root)
        .with_context(|| format!("could not read {}", logs_root.display()))?;
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
            Some((time, entry.path()))
        })
        .max_by_key(|(time, _)| *time)
        .map(|(_, path)| path)
        .with_context(|| format!("no log directory in {}", logs_root.display()))
}

/// Print both agents' logs of the latest match and return the paths that were printed.
///
/// Only meaningful after a single match. Missing logs are reported, not fatal.
pub fn dump_agent_logs(logs_root: &Path) -> Vec<PathBuf> {
    let dir = match latest_log_dir(logs_root) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("no agent logs to show: {e:#}");
            println!("{YELLOW}No agent logs: {e:#}{RESET}");
            return vec![];
        }
    };
    let mut shown = vec![];
    for (i, title) in ["BOT1", "BOT2"].iter().enumerate() {
        let path = dir.join(format!("agent_{i}.log"));
        println!("{BRIGHT_MAGENTA}{title} LOG -------------{RESET}");
        match std::fs::read_to_string(&path) {
            Ok(log) => {
                println!("{log}");
                shown.push(path);
            }
            Err(e) => {
                warn!("could not read {}: {e}", path.display());
                println!("{YELLOW}could not read {}: {e}{RESET}", path.display());
            }
        }
    }
    shown
}
