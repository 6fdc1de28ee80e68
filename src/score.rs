//! Reduction of an agent score log to one fitness value.
//!
//! During a match the agent appends one line per checkpoint to `results/<fileName>.txt`:
//!
//! ```text
//! Turn 12 : P1 => &5&; P2 => &3&
//! ```
//!
//! Split on `&`, field 1 is our agent's metric and field 3 the opponent's. These positions are
//! a contract with the agent code, nothing here can check what the metric means.

use std::path::Path;

use anyhow::{bail, Context};
use tracing::instrument;

/// Field delimiter of a score log line.
pub const DELIMITER: char = '&';

/// Bonus per line added when the last checkpoint shows a positive margin.
pub const WIN_BONUS_PER_LINE: i64 = 50;

/// Read `path` and compute its score with [`score_lines`].
#[instrument]
pub fn extract_score(path: &Path) -> anyhow::Result<f64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read score log {}", path.display()))?;
    score_lines(&content).with_context(|| format!("invalid score log {}", path.display()))
}

/// Mean per-checkpoint margin, with a win bonus folded in before averaging.
///
/// The bonus (`50 × line count`) is added when the final line's margin is strictly positive.
///
/// # Errors
/// Empty content, a line with fewer than 4 fields, or a non-integer metric.
pub fn score_lines(content: &str) -> anyhow::Result<f64> {
    let margins = content
        .lines()
        .enumerate()
        .map(|(i, line)| line_margin(line).with_context(|| format!("Line {}", i + 1)))
        .collect::<anyhow::Result<Vec<i64>>>()?;

    let Some(&last) = margins.last() else {
        bail!("score log is empty");
    };

    let count = margins.len() as i64;
    let mut total: i64 = margins.iter().sum();
    if last > 0 {
        total += WIN_BONUS_PER_LINE * count;
    }
    Ok(total as f64 / count as f64)
}

fn line_margin(line: &str) -> anyhow::Result<i64> {
    let fields = line.split(DELIMITER).collect::<Vec<_>>();
    if fields.len() < 4 {
        bail!("expected at least 4 fields, got {} in '{line}'", fields.len());
    }
    let ours: i64 = fields[1]
        .trim()
        .parse()
        .with_context(|| format!("field 1 '{}' is not an integer", fields[1]))?;
    let theirs: i64 = fields[3]
        .trim()
        .parse()
        .with_context(|| format!("field 3 '{}' is not an integer", fields[3]))?;
    Ok(ours - theirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_win_adds_bonus_before_averaging() {
        let score = score_lines("1&10&x&4\n2&20&x&8\n").unwrap();
        assert_eq!(score, 59.0);
    }

    #[test]
    fn final_loss_is_plain_mean() {
        let score = score_lines("1&10&x&4\n2&3&x&8\n").unwrap();
        assert_eq!(score, 0.5);
    }

    #[test]
    fn final_tie_gets_no_bonus() {
        let score = score_lines("1&4&x&0\n2&6&x&6\n").unwrap();
        assert_eq!(score, 2.0);
    }

    #[test]
    fn agent_line_shape_is_understood() {
        let log = "Turn 1 : P1 => &1&; P2 => &1&\n\
                   Turn 2 : P1 => &3&; P2 => &2&\n\
                   Turn 3 : P1 => &4&; P2 => &2&\n";
        // margins 0, 1, 2 and a win: (3 + 150) / 3
        assert_eq!(score_lines(log).unwrap(), 51.0);
    }

    #[test]
    fn empty_log_is_an_error() {
        assert!(score_lines("").is_err());
    }

    #[test]
    fn short_line_is_an_error() {
        let err = score_lines("1&10&x&4\n2&20&x\n").unwrap_err();
        assert!(format!("{err:#}").contains("Line 2"));
    }

    #[test]
    fn non_integer_metric_is_an_error() {
        assert!(score_lines("1&ten&x&4\n").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_score(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.txt");
        std::fs::write(&path, "1&10&x&4\n2&20&x&8\n").unwrap();
        assert_eq!(extract_score(&path).unwrap(), 59.0);
    }
}
