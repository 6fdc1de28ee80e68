//! One-axis-at-a-time grid sweep over the agent's tuning knobs.
//!
//! For each [`Axis`], in declared order, every candidate value is tried on every seed while
//! the other knobs stay at the current baseline. The value with the best seed-averaged score
//! wins and becomes the baseline of the following axes. There is no early stopping and no
//! joint search across knobs.
//!
//! A sample that cannot be scored (timed-out match, crashed match, missing or malformed log)
//! counts as `f64::NEG_INFINITY` so that it can never win. Only failures on the
//! sweep's own files (parameter file, results directory, report file) abort the run.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, instrument, warn};

use crate::configuration::Configuration;
use crate::match_runner::{run_match, MatchSpec, MatchTimeout};
use crate::params::{Knob, ParameterSet, DEFAULT_PARAMETER_FILE};
use crate::score::extract_score;
use crate::summary::Outcome;

/// Score recorded for a sample that could not be measured.
pub const WORST_SCORE: f64 = f64::NEG_INFINITY;

/// Seeds every candidate value is evaluated on.
pub const DEFAULT_SEEDS: [u64; 10] = [1, 2, 5, 10, 25, 50, 100, 200, 500, 1000];

/// Name of the report file inside the results directory.
pub const REPORT_FILE_NAME: &str = "bestParametersFile.txt";

/// One knob and the values it is tried with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub knob: Knob,
    pub values: Vec<i64>,
}

impl Axis {
    pub fn new(knob: Knob, values: Vec<i64>) -> Self {
        Axis { knob, values }
    }

    /// Values from `start` to `end` inclusive, `step` apart.
    pub fn range(knob: Knob, start: i64, end: i64, step: usize) -> Self {
        Axis {
            knob,
            values: (start..=end).step_by(step.max(1)).collect(),
        }
    }
}

/// The knobs swept by default, in order.
pub fn default_plan() -> Vec<Axis> {
    vec![
        Axis::range(Knob::PathLength, 20, 80, 5),
        Axis::range(Knob::SimilarityPercentage, 15, 65, 5),
        Axis::range(Knob::SimilarityTolerance, 1, 4, 1),
        Axis::range(Knob::PropagationRadius, 1, 3, 1),
        Axis::range(Knob::ResourceTiles, 1, 5, 1),
        Axis::range(Knob::CityTiles, 1, 5, 1),
        Axis::range(Knob::PathStep, 2, 8, 1),
    ]
}

/// Everything a sweep needs to know.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub seeds: Vec<u64>,
    /// Wall-clock limit of a single match
    pub timeout: Duration,
    /// Where the agent writes its score logs, and where the report goes
    pub results_dir: PathBuf,
    pub parameter_file: PathBuf,
    pub agents: [PathBuf; 2],
    pub axes: Vec<Axis>,
    pub baseline: ParameterSet,
}

impl SweepConfig {
    pub fn report_path(&self) -> PathBuf {
        self.results_dir.join(REPORT_FILE_NAME)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.seeds.is_empty() {
            bail!("no seed to evaluate");
        }
        if let Some(axis) = self.axes.iter().find(|a| a.values.is_empty()) {
            bail!("axis '{}' has no candidate value", axis.knob);
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        let agent = PathBuf::from(crate::DEFAULT_AGENT);
        SweepConfig {
            seeds: DEFAULT_SEEDS.to_vec(),
            timeout: Duration::from_secs(35),
            results_dir: PathBuf::from("results"),
            parameter_file: PathBuf::from(DEFAULT_PARAMETER_FILE),
            agents: [agent.clone(), agent],
            axes: default_plan(),
            baseline: ParameterSet::baseline(),
        }
    }
}

impl Display for SweepConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seeds = self
            .seeds
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(f, "seeds             = {seeds}")?;
        writeln!(f, "match timeout     = {:?}", self.timeout)?;
        writeln!(f, "results dir       = {}", self.results_dir.display())?;
        writeln!(f, "parameter file    = {}", self.parameter_file.display())?;
        writeln!(f, "agent             = {}", self.agents[0].display())?;
        writeln!(f, "opponent          = {}", self.agents[1].display())?;
        writeln!(f, "baseline          = {}", self.baseline)?;
        for axis in &self.axes {
            writeln!(f, "axis {:<20} {:?}", axis.knob.key(), axis.values)?;
        }
        Ok(())
    }
}

/// Scores one parameter set on one seed.
///
/// Implementations map every per-match failure to [`WORST_SCORE`]; an `Err` aborts the sweep.
pub trait Evaluator {
    fn evaluate(&mut self, params: &ParameterSet, seed: u64) -> anyhow::Result<f64>;
}

/// Scores by running the real simulator and reading the agent's score log.
pub struct SimulatorEvaluator {
    config: Configuration,
    agents: [PathBuf; 2],
    timeout: Duration,
    parameter_file: PathBuf,
    results_dir: PathBuf,
}

impl SimulatorEvaluator {
    pub fn new(config: Configuration, sweep: &SweepConfig) -> Self {
        SimulatorEvaluator {
            config,
            agents: sweep.agents.clone(),
            timeout: sweep.timeout,
            parameter_file: sweep.parameter_file.clone(),
            results_dir: sweep.results_dir.clone(),
        }
    }

    fn score_log_path(&self, params: &ParameterSet) -> PathBuf {
        self.results_dir.join(format!("{}.txt", params.file_name()))
    }
}

impl Evaluator for SimulatorEvaluator {
    #[instrument(skip_all, fields(run = params.file_name(), seed = seed))]
    fn evaluate(&mut self, params: &ParameterSet, seed: u64) -> anyhow::Result<f64> {
        params.write_to(&self.parameter_file)?;
        let score_log = self.score_log_path(params);

        let spec = MatchSpec::new(seed, self.agents.clone()).with_timeout(self.timeout);
        let line = match run_match(&spec, &self.config) {
            // whatever the agent logged before crashing must not compete
            Ok(report) if report.outcome == Outcome::Crash => {
                warn!("match crashed, sample scored worst");
                remove_score_log(&score_log);
                println!("{}: {}", params.file_name(), report.summary_line());
                return Ok(WORST_SCORE);
            }
            Ok(report) => report.summary_line(),
            Err(e) => {
                if e.downcast_ref::<MatchTimeout>().is_some() {
                    warn!("{e}");
                } else {
                    warn!("match failed: {e:#}");
                }
                remove_score_log(&score_log);
                println!("{}: \x1b[31m{e}\x1b[0m", params.file_name());
                return Ok(WORST_SCORE);
            }
        };

        let score = extract_score(&score_log);
        remove_score_log(&score_log);
        let score = match score {
            Ok(score) => score,
            Err(e) => {
                warn!("no usable score: {e:#}");
                WORST_SCORE
            }
        };
        println!("{}: {line} score={score:.2}", params.file_name());
        Ok(score)
    }
}

fn remove_score_log(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", path.display()),
    }
}

/// One measured `(value, seed)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: i64,
    pub seed: u64,
    pub score: f64,
}

/// Everything measured on one axis, and its winner.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisOutcome {
    pub knob: Knob,
    pub samples: Vec<Sample>,
    pub best_value: i64,
    pub best_score: f64,
}

impl AxisOutcome {
    /// Reduce `samples` of `knob` to their arg-max.
    ///
    /// # Errors
    /// When `samples` is empty.
    pub fn from_samples(knob: Knob, samples: Vec<Sample>) -> anyhow::Result<Self> {
        let (best_value, best_score) = select_best(&average_by_value(&samples))
            .with_context(|| format!("no sample for axis '{knob}'"))?;
        Ok(AxisOutcome {
            knob,
            samples,
            best_value,
            best_score,
        })
    }

    pub fn averages(&self) -> Vec<(i64, f64)> {
        average_by_value(&self.samples)
    }
}

/// Mean score of each value, in order of first appearance.
pub fn average_by_value(samples: &[Sample]) -> Vec<(i64, f64)> {
    let mut sums: Vec<(i64, f64, usize)> = Vec::new();
    for sample in samples {
        match sums.iter_mut().find(|(v, _, _)| *v == sample.value) {
            Some((_, sum, n)) => {
                *sum += sample.score;
                *n += 1;
            }
            None => sums.push((sample.value, sample.score, 1)),
        }
    }
    sums.into_iter()
        .map(|(value, sum, n)| (value, sum / n as f64))
        .collect()
}

/// Value with the highest average. Ties, and an all-worst axis, go to the earliest value.
pub fn select_best(averages: &[(i64, f64)]) -> Option<(i64, f64)> {
    let mut best: Option<(i64, f64)> = None;
    for &(value, score) in averages {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((value, score)),
        }
    }
    best
}

/// Winners of a complete sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub axes: Vec<AxisOutcome>,
    pub parameters: ParameterSet,
}

impl SweepReport {
    /// Report file content: one `best <knob> = <value>` line per axis done so far.
    pub fn render(&self) -> String {
        self.axes
            .iter()
            .map(|a| format!("best {} = {}\n", a.knob, a.best_value))
            .collect()
    }
}

/// Runs the axes of a [`SweepConfig`] through an [`Evaluator`].
pub struct SweepDriver<E: Evaluator> {
    config: SweepConfig,
    evaluator: E,
}

impl<E: Evaluator> SweepDriver<E> {
    pub fn new(config: SweepConfig, evaluator: E) -> Self {
        SweepDriver { config, evaluator }
    }

    /// Sweep every axis in order, rewriting the report file after each one.
    pub fn run(&mut self) -> anyhow::Result<SweepReport> {
        self.config.validate()?;
        std::fs::create_dir_all(&self.config.results_dir).with_context(|| {
            format!(
                "could not create results directory {}",
                self.config.results_dir.display()
            )
        })?;

        let mut report = SweepReport {
            axes: vec![],
            parameters: self.config.baseline.clone(),
        };
        for axis in self.config.axes.clone() {
            let outcome = self.evaluate_axis(&axis, &report.parameters)?;
            info!(knob = %outcome.knob, value = outcome.best_value, score = outcome.best_score, "axis done");
            println!(
                "\x1b[32mbest {} = {}\x1b[0m (average score {:.2})",
                outcome.knob, outcome.best_value, outcome.best_score
            );
            report.parameters = report.parameters.with(outcome.knob, outcome.best_value);
            report.axes.push(outcome);
            self.write_report(&report)?;
        }
        Ok(report)
    }

    /// Try every value of `axis` on top of `baseline`.
    #[instrument(skip_all, fields(knob = %axis.knob))]
    pub fn evaluate_axis(
        &mut self,
        axis: &Axis,
        baseline: &ParameterSet,
    ) -> anyhow::Result<AxisOutcome> {
        let mut samples = Vec::with_capacity(axis.values.len() * self.config.seeds.len());
        for (i, &value) in axis.values.iter().enumerate() {
            for &seed in &self.config.seeds {
                let params = baseline
                    .clone()
                    .with(axis.knob, value)
                    .with_file_name(format!("{}_Tests_{}_{seed}", axis.knob.key(), i + 1));
                let score = self.evaluator.evaluate(&params, seed)?;
                samples.push(Sample { value, seed, score });
            }
        }
        AxisOutcome::from_samples(axis.knob, samples)
    }

    fn write_report(&self, report: &SweepReport) -> anyhow::Result<()> {
        let path = self.config.report_path();
        std::fs::write(&path, report.render())
            .with_context(|| format!("could not write report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Scores looked up by (value of the swept knob, seed).
    struct TableEvaluator {
        knob: Knob,
        scores: HashMap<(i64, u64), f64>,
        seen: Vec<ParameterSet>,
    }

    impl Evaluator for TableEvaluator {
        fn evaluate(&mut self, params: &ParameterSet, seed: u64) -> anyhow::Result<f64> {
            self.seen.push(params.clone());
            Ok(self
                .scores
                .get(&(params.get(self.knob), seed))
                .copied()
                .unwrap_or(WORST_SCORE))
        }
    }

    fn config(dir: &Path, axes: Vec<Axis>, seeds: Vec<u64>) -> SweepConfig {
        SweepConfig {
            seeds,
            results_dir: dir.to_path_buf(),
            parameter_file: dir.join(DEFAULT_PARAMETER_FILE),
            axes,
            ..SweepConfig::default()
        }
    }

    #[test]
    fn best_average_wins() {
        let scores = HashMap::from([
            ((10, 1), 1.0),
            ((10, 2), 3.0),
            ((20, 1), 5.0),
            ((20, 2), 5.0),
            ((30, 1), 2.0),
            ((30, 2), 2.0),
        ]);
        let evaluator = TableEvaluator {
            knob: Knob::PathLength,
            scores,
            seen: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let axis = Axis::new(Knob::PathLength, vec![10, 20, 30]);
        let mut driver = SweepDriver::new(config(dir.path(), vec![axis.clone()], vec![1, 2]), evaluator);

        let outcome = driver
            .evaluate_axis(&axis, &ParameterSet::baseline())
            .unwrap();

        assert_eq!(outcome.averages(), vec![(10, 2.0), (20, 5.0), (30, 2.0)]);
        assert_eq!(outcome.best_value, 20);
        assert_eq!(outcome.best_score, 5.0);
    }

    #[test]
    fn ties_go_to_the_first_value() {
        assert_eq!(select_best(&[(1, 3.0), (2, 3.0)]), Some((1, 3.0)));
    }

    #[test]
    fn worst_samples_never_win() {
        let samples = vec![
            Sample { value: 1, seed: 1, score: WORST_SCORE },
            Sample { value: 1, seed: 2, score: 100.0 },
            Sample { value: 2, seed: 1, score: -3.0 },
            Sample { value: 2, seed: 2, score: -5.0 },
        ];
        let outcome = AxisOutcome::from_samples(Knob::PathStep, samples).unwrap();
        assert_eq!(outcome.best_value, 2);
    }

    #[test]
    fn all_worst_falls_back_to_first_value() {
        assert_eq!(
            select_best(&[(4, WORST_SCORE), (5, WORST_SCORE)]),
            Some((4, WORST_SCORE))
        );
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn later_axes_start_from_earlier_winners() {
        let scores = HashMap::from([((30, 1), 9.0), ((20, 1), 1.0)]);
        let evaluator = TableEvaluator {
            knob: Knob::PathLength,
            scores,
            seen: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let axes = vec![
            Axis::new(Knob::PathLength, vec![20, 30]),
            Axis::new(Knob::PathStep, vec![2, 3]),
        ];
        let mut driver = SweepDriver::new(config(dir.path(), axes, vec![1]), evaluator);

        let report = driver.run().unwrap();

        assert_eq!(report.parameters.get(Knob::PathLength), 30);
        // path step scores are looked up by path length (30, seed 1) for both values: tie
        assert_eq!(report.parameters.get(Knob::PathStep), 2);
        let step_runs = driver
            .evaluator
            .seen
            .iter()
            .filter(|p| p.file_name().starts_with("pathStep"))
            .collect::<Vec<_>>();
        assert!(step_runs.iter().all(|p| p.get(Knob::PathLength) == 30));
        assert_eq!(step_runs[1].file_name(), "pathStep_Tests_2_1");

        let written = std::fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
        assert_eq!(written, "best pathLength = 30\nbest pathStep = 2\n");
    }

    #[test]
    fn empty_seed_set_is_rejected() {
        let evaluator = TableEvaluator {
            knob: Knob::PathLength,
            scores: HashMap::new(),
            seen: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SweepDriver::new(config(dir.path(), default_plan(), vec![]), evaluator);
        assert!(driver.run().is_err());
    }

    #[test]
    fn default_plan_matches_knob_order() {
        let knobs = default_plan().iter().map(|a| a.knob).collect::<Vec<_>>();
        assert_eq!(knobs, Knob::ALL.to_vec());
        assert_eq!(default_plan()[0].values.len(), 13);
        assert_eq!(default_plan()[6].values, vec![2, 3, 4, 5, 6, 7, 8]);
    }
}
