//! # Lux Tuner
//!
//! Operator tooling around the `lux-ai-2021` simulator: run matches between two agent
//! executables and tune the agent's parameters against match results.
//!
//! It provides:
//! - Single matches and batches over many seeds ([`match_runner`], [`batch`])
//! - A tolerant reader for the simulator's end-of-match summary ([`summary`])
//! - The parameter file handed to the agent ([`params`]) and the score log it writes back
//!   ([`score`])
//! - A one-axis-at-a-time grid sweep over the agent's knobs ([`sweep`])
//!
//! Every match is a separate OS process. On Linux it runs in its own cgroup so that a match
//! killed at its deadline takes both agents down with it.
//!
//! # Documentation Overview
//!
//! - For launching and classifying a match, see [`run_match`](crate::match_runner::run_match).
//! - For runner behaviour and its environment variables, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For the sweep and its report file, see [`SweepDriver`](crate::sweep::SweepDriver).
//!
//! # Usage Example
//!
//! ```no_run
//! use lux_tuner::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env();
//!     let agent = std::path::PathBuf::from("build-solution-x64/Debug/TeamName.exe");
//!
//!     let batch = BatchRunner::with_agents(config.clone(), [agent.clone(), agent.clone()]);
//!     for report in batch.run(&[1, 2, 3]).reports {
//!         println!("{}", report.summary_line());
//!     }
//!
//!     let sweep = SweepConfig::default();
//!     let evaluator = SimulatorEvaluator::new(config, &sweep);
//!     let report = SweepDriver::new(sweep, evaluator).run()?;
//!     println!("{}", report.render());
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod batch;
mod cgroup_manager;
pub mod configuration;
pub mod logger;
pub mod match_runner;
pub mod params;
mod scheduler;
pub mod score;
pub mod summary;
pub mod sweep;

/// Agent used on both sides when none is given.
pub const DEFAULT_AGENT: &str = "build-solution-x64/Debug/TeamName.exe";

/// Commonly used types for quick access.
///
/// ```rust
/// use lux_tuner::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{BatchResult, BatchRunner};
    pub use crate::configuration::Configuration;
    pub use crate::match_runner::{run_match, MatchReport, MatchSpec, MatchTimeout};
    pub use crate::params::{Knob, ParameterSet};
    pub use crate::summary::Outcome;
    pub use crate::sweep::{Axis, SimulatorEvaluator, SweepConfig, SweepDriver};
}
