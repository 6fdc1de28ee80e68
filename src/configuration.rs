//! Config for the match runner behaviors
//!
//! This module provides configuration options for controlling how matches are launched and
//! reported.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. A flag is enabled when the variable is set to anything other than an
//! empty string, `"0"` or `"false"` (case-insensitive).
//!
//! - `LUX_CPU`: Number of matches run in parallel (default: `min(20, logical cpus)`)
//! - `LUX_SILENT`: Do not print the simulator stderr (default: `false`)
//! - `LUX_VERBOSE`: Print the simulator command line and its raw output (default: `false`)
//! - `LUX_NO_TIMEOUT`: Give the simulator an unbounded per-step time budget (default: `false`)
//! - `LUX_LOG`: Enable logging to a file (default: `false`)
//! - `LUX_CONTAINED`: Launch each match inside its own cgroup, Linux only (default: `true`)
//! - `LUX_ALLOW_UNCONTAINED`: Fall back to plain processes if cgroups fail (default: `true`)
//! - `LUX_SIMULATOR`: Simulator command (default: `lux-ai-2021`)
//! - `LUX_LOGS_ROOT`: Directory holding the per-match agent logs (default: `errorlogs`)

use std::fmt::Display;
use std::path::PathBuf;

/// Hard upper bound on parallel matches when `LUX_CPU` is not set.
pub const MAX_DEFAULT_WORKERS: usize = 20;

/// Configuration for match runner behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) silent: bool,
    pub(crate) no_timeout: bool,
    pub(crate) log: bool,
    pub(crate) contained: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) workers: Option<usize>,
    pub(crate) simulator: String,
    pub(crate) logs_root: PathBuf,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The simulator stderr is printed, its raw stdout is not.
    /// - The simulator keeps its own per-step time budget.
    /// - Logging to file is disabled.
    /// - Matches run inside a cgroup when possible, and as plain processes otherwise.
    /// - Up to `min(20, logical cpus)` matches run in parallel.
    pub fn new() -> Self {
        Self {
            verbose: false,
            silent: false,
            no_timeout: false,
            log: false,
            contained: true,
            allow_uncontained: true,
            workers: None,
            simulator: "lux-ai-2021".to_string(),
            logs_root: PathBuf::from("errorlogs"),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables. Any variable that is unset
    /// (or that cannot be parsed, for `LUX_CPU`) keeps its default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => {
                    let val = val.trim();
                    !(val.is_empty() || val == "0" || val.eq_ignore_ascii_case("false"))
                }
                Err(_) => default,
            }
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("LUX_VERBOSE", defaults.verbose),
            silent: get_env_flag("LUX_SILENT", defaults.silent),
            no_timeout: get_env_flag("LUX_NO_TIMEOUT", defaults.no_timeout),
            log: get_env_flag("LUX_LOG", defaults.log),
            contained: get_env_flag("LUX_CONTAINED", defaults.contained),
            allow_uncontained: get_env_flag("LUX_ALLOW_UNCONTAINED", defaults.allow_uncontained),
            workers: std::env::var("LUX_CPU")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &usize| n > 0),
            simulator: std::env::var("LUX_SIMULATOR").unwrap_or(defaults.simulator),
            logs_root: std::env::var("LUX_LOGS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.logs_root),
        }
    }

    /// Enable or disable verbose mode.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable silent mode (simulator stderr is not printed).
    pub fn with_silent(mut self, value: bool) -> Self {
        self.silent = value;
        self
    }

    /// Enable or disable the unbounded simulator step time.
    pub fn with_no_timeout(mut self, value: bool) -> Self {
        self.no_timeout = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable cgroup containment of matches.
    pub fn with_contained(mut self, value: bool) -> Self {
        self.contained = value;
        self
    }

    /// Enable or disable the plain process fallback when cgroups are unavailable.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Set the number of matches run in parallel. Zero is treated as one.
    pub fn with_workers(mut self, value: usize) -> Self {
        self.workers = Some(value.max(1));
        self
    }

    /// Set the simulator command.
    pub fn with_simulator(mut self, value: impl Into<String>) -> Self {
        self.simulator = value.into();
        self
    }

    /// Set the directory where the simulator stores the agent logs of each match.
    pub fn with_logs_root(mut self, value: impl Into<PathBuf>) -> Self {
        self.logs_root = value.into();
        self
    }

    /// True if a log file should be written.
    pub fn log_enabled(&self) -> bool {
        self.log
    }

    /// Number of workers for a batch of `jobs` matches.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let cap = self
            .workers
            .unwrap_or_else(|| num_cpus::get().min(MAX_DEFAULT_WORKERS));
        cap.min(jobs).max(1)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "simulator         = {}", self.simulator)?;
        writeln!(f, "logs root         = {}", self.logs_root.display())?;
        match self.workers {
            Some(n) => writeln!(f, "workers           = {n}")?,
            None => writeln!(f, "workers           = auto")?,
        }
        writeln!(f, "verbose           = {}", self.verbose)?;
        writeln!(f, "silent            = {}", self.silent)?;
        writeln!(f, "no timeout        = {}", self.no_timeout)?;
        writeln!(f, "contained         = {}", self.contained)?;
        write!(f, "allow uncontained = {}", self.allow_uncontained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_bounded_by_jobs() {
        let config = Configuration::new().with_workers(8);
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(100), 8);
        assert_eq!(config.worker_count(0), 1);
    }

    #[test]
    fn default_worker_count_never_exceeds_cap() {
        let config = Configuration::new();
        assert!(config.worker_count(1000) <= MAX_DEFAULT_WORKERS);
        assert!(config.worker_count(1000) >= 1);
    }

    #[test]
    fn zero_workers_means_one() {
        let config = Configuration::new().with_workers(0);
        assert_eq!(config.worker_count(10), 1);
    }
}
