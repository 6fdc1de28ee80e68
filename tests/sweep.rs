#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use lux_tuner::prelude::*;
use lux_tuner::sweep::REPORT_FILE_NAME;

mod common;
use common::{agents, config_for, write_script, WIN_OUTPUT};

/// Simulator standing in for a full match: reads the parameter file like the agent does and
/// logs `pathLength - 40` as its margin. Hangs when `hang_on` is the path length.
fn scoring_simulator(dir: &Path, params: &Path, results: &Path, hang_on: i64) -> std::path::PathBuf {
    let body = format!(
        r#"name=$(sed -n 's/^fileName=//p' '{params}')
len=$(sed -n 's/^pathLength=//p' '{params}')
if [ "$len" = "{hang_on}" ]; then
  sleep 30
fi
echo "Turn 1 : P1 => &$len&; P2 => &40&" > '{results}/'"$name.txt"
echo "{WIN_OUTPUT}""#,
        params = params.display(),
        results = results.display(),
    );
    write_script(dir, "sim", &body)
}

fn sweep_config(dir: &Path, axes: Vec<Axis>) -> SweepConfig {
    SweepConfig {
        seeds: vec![1, 2],
        timeout: Duration::from_secs(2),
        results_dir: dir.join("results"),
        parameter_file: dir.join("parametersFile.txt"),
        agents: agents(),
        axes,
        ..SweepConfig::default()
    }
}

#[test]
fn sweep_keeps_the_best_value_of_each_axis() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = sweep_config(
        dir.path(),
        vec![
            Axis::new(Knob::PathLength, vec![30, 50, 45]),
            Axis::new(Knob::PathStep, vec![6, 3]),
        ],
    );
    let sim = scoring_simulator(dir.path(), &sweep.parameter_file, &sweep.results_dir, -1);
    let evaluator = SimulatorEvaluator::new(config_for(&sim, dir.path()), &sweep);

    let report = SweepDriver::new(sweep.clone(), evaluator).run().unwrap();

    assert_eq!(report.parameters.get(Knob::PathLength), 50);
    // path step does not change the score: first value kept
    assert_eq!(report.parameters.get(Knob::PathStep), 6);
    assert_eq!(report.axes[0].best_score, 60.0);

    let written = std::fs::read_to_string(sweep.report_path()).unwrap();
    assert_eq!(written, "best pathLength = 50\nbest pathStep = 6\n");

    // the agent's parameter file holds the last evaluated run
    let last = ParameterSet::read_from(&sweep.parameter_file).unwrap();
    assert_eq!(last.get(Knob::PathLength), 50);
    assert_eq!(last.get(Knob::PathStep), 3);
    assert_eq!(last.file_name(), "pathStep_Tests_2_2");

    // score logs are consumed
    let leftovers = std::fs::read_dir(&sweep.results_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name() != REPORT_FILE_NAME)
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn hanging_value_scores_worst_and_sweep_goes_on() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = sweep_config(dir.path(), vec![Axis::new(Knob::PathLength, vec![90, 45])]);
    let sim = scoring_simulator(dir.path(), &sweep.parameter_file, &sweep.results_dir, 90);
    let evaluator = SimulatorEvaluator::new(config_for(&sim, dir.path()), &sweep);

    let report = SweepDriver::new(sweep, evaluator).run().unwrap();

    let outcome = &report.axes[0];
    assert_eq!(outcome.averages()[0], (90, f64::NEG_INFINITY));
    assert_eq!(outcome.best_value, 45);
}

#[test]
fn missing_score_log_scores_worst() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = sweep_config(dir.path(), vec![Axis::new(Knob::CityTiles, vec![1, 2])]);
    let sim = write_script(dir.path(), "sim", &format!("echo \"{WIN_OUTPUT}\""));
    let evaluator = SimulatorEvaluator::new(config_for(&sim, dir.path()), &sweep);

    let report = SweepDriver::new(sweep, evaluator).run().unwrap();

    assert_eq!(report.axes[0].best_value, 1);
    assert_eq!(report.axes[0].best_score, f64::NEG_INFINITY);
}

#[test]
fn crashed_match_scores_worst_even_with_a_winning_log() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = sweep_config(dir.path(), vec![Axis::new(Knob::ResourceTiles, vec![3])]);
    let body = format!(
        r#"name=$(sed -n 's/^fileName=//p' '{params}')
echo "Turn 1 : P1 => &9&; P2 => &1&" > '{results}/'"$name.txt"
echo 'Segmentation fault'"#,
        params = sweep.parameter_file.display(),
        results = sweep.results_dir.display(),
    );
    let sim = write_script(dir.path(), "sim", &body);
    let evaluator = SimulatorEvaluator::new(config_for(&sim, dir.path()), &sweep);

    let report = SweepDriver::new(sweep.clone(), evaluator).run().unwrap();

    assert_eq!(report.axes[0].best_score, f64::NEG_INFINITY);
    // the crashed run's log is still consumed
    let leftovers = std::fs::read_dir(&sweep.results_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name() != REPORT_FILE_NAME)
        .count();
    assert_eq!(leftovers, 0);
}
