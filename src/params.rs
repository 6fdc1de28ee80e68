//! Tuning parameters handed to the agent through a flat `key=value` file.
//!
//! The agent reads the file once at startup. Its format is shared with the agent code and
//! must not change on one side only:
//!
//! ```text
//! pathLength=50
//!
//! similarityPercentage=80
//! similarityTolerance=3
//! propagationRadius=2
//!
//! resourceTiles=2
//! cityTiles=2
//!
//! pathStep=5
//!
//! fileName=pathLength_Tests_1_100
//! ```
//!
//! `fileName` names the score log the agent writes during the match (see [`crate::score`]).

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};
use tracing::{instrument, trace};

/// Default location of the parameter file, relative to the working directory.
pub const DEFAULT_PARAMETER_FILE: &str = "parametersFile.txt";

/// One tunable knob of the agent, in the order the file lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Knob {
    /// Max number of turns kept when tracking enemy paths
    PathLength,
    /// Percentage of similarity for two paths to belong to the same squad
    SimilarityPercentage,
    /// Power applied to path point differences when measuring similarity
    SimilarityTolerance,
    /// Radius used when propagating paths in the influence map
    PropagationRadius,
    /// Resource tiles a path must cover to be considered linking
    ResourceTiles,
    /// City tiles a path must cover to be considered linking
    CityTiles,
    /// Step in turns between compared points of enemy approach detection
    PathStep,
}

impl Knob {
    /// Every knob, in file order.
    pub const ALL: [Knob; 7] = [
        Knob::PathLength,
        Knob::SimilarityPercentage,
        Knob::SimilarityTolerance,
        Knob::PropagationRadius,
        Knob::ResourceTiles,
        Knob::CityTiles,
        Knob::PathStep,
    ];

    /// Key used in the parameter file.
    pub fn key(self) -> &'static str {
        match self {
            Knob::PathLength => "pathLength",
            Knob::SimilarityPercentage => "similarityPercentage",
            Knob::SimilarityTolerance => "similarityTolerance",
            Knob::PropagationRadius => "propagationRadius",
            Knob::ResourceTiles => "resourceTiles",
            Knob::CityTiles => "cityTiles",
            Knob::PathStep => "pathStep",
        }
    }

    fn index(self) -> usize {
        Knob::ALL
            .iter()
            .position(|&k| k == self)
            .unwrap_or_default()
    }

    /// Knobs followed by a blank line in the file.
    fn ends_group(self) -> bool {
        matches!(
            self,
            Knob::PathLength | Knob::PropagationRadius | Knob::CityTiles | Knob::PathStep
        )
    }
}

impl Display for Knob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Knob {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Knob::ALL
            .into_iter()
            .find(|k| k.key().eq_ignore_ascii_case(s.trim()))
            .with_context(|| format!("unknown parameter '{s}'"))
    }
}

/// The full set of knob values plus the run name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    values: [i64; 7],
    file_name: String,
}

impl ParameterSet {
    /// Baseline values the sweep starts from.
    pub fn baseline() -> Self {
        Self {
            values: [50, 80, 3, 2, 2, 2, 5],
            file_name: "default".to_string(),
        }
    }

    /// Value of `knob`.
    pub fn get(&self, knob: Knob) -> i64 {
        self.values[knob.index()]
    }

    /// Copy of `self` with `knob` set to `value`.
    #[must_use]
    pub fn with(mut self, knob: Knob, value: i64) -> Self {
        self.values[knob.index()] = value;
        self
    }

    /// Copy of `self` with a new run name.
    #[must_use]
    pub fn with_file_name(self, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..self
        }
    }

    /// Name of the score log the agent will write (without extension).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Render the file content.
    pub fn render(&self) -> String {
        let mut s = String::new();
        for knob in Knob::ALL {
            s += &format!("{}={}\n", knob.key(), self.get(knob));
            if knob.ends_group() {
                s += "\n";
            }
        }
        s += &format!("fileName={}\n", self.file_name);
        s
    }

    /// Overwrite `path` with this parameter set.
    #[instrument(skip(self), fields(file_name = %self.file_name))]
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("could not write parameter file {}", path.display()))?;
        trace!("parameter file written");
        Ok(())
    }

    /// Read a parameter file the way the agent does.
    ///
    /// Unknown keys are rejected; missing knobs keep their baseline value. `fileName` is
    /// mandatory.
    pub fn read_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read parameter file {}", path.display()))?;
        content.parse()
    }
}

impl FromStr for ParameterSet {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut set = ParameterSet::baseline();
        let mut file_name = None;

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("Line {}: expected 'name=value', got '{line}'", i + 1);
            };
            let (key, value) = (key.trim(), value.trim());
            if key == "fileName" {
                if value.is_empty() {
                    bail!("Line {}: 'fileName' value missing", i + 1);
                }
                file_name = Some(value.to_string());
                continue;
            }
            let knob: Knob = key.parse().with_context(|| format!("Line {}", i + 1))?;
            let value = value
                .parse()
                .with_context(|| format!("Line {}: '{value}' is not an integer", i + 1))?;
            set = set.with(knob, value);
        }

        let file_name = file_name.context("missing 'fileName' key")?;
        Ok(set.with_file_name(file_name))
    }
}

impl Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = Knob::ALL
            .iter()
            .map(|k| format!("{k}={}", self.get(*k)))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{values} fileName={}", self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_groups_knobs_with_blank_lines() {
        let set = ParameterSet::baseline().with_file_name("pathLength_Tests_1_100");
        let expected = "pathLength=50\n\n\
                        similarityPercentage=80\n\
                        similarityTolerance=3\n\
                        propagationRadius=2\n\n\
                        resourceTiles=2\n\
                        cityTiles=2\n\n\
                        pathStep=5\n\n\
                        fileName=pathLength_Tests_1_100\n";
        assert_eq!(set.render(), expected);
    }

    #[test]
    fn path_length_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_PARAMETER_FILE);
        let set = ParameterSet::baseline()
            .with(Knob::PathLength, 50)
            .with(Knob::PathStep, 7)
            .with_file_name("run");

        set.write_to(&path).unwrap();
        let read = ParameterSet::read_from(&path).unwrap();

        assert_eq!(read.get(Knob::PathLength), 50);
        assert_eq!(read, set);
    }

    #[test]
    fn with_only_touches_one_knob() {
        let set = ParameterSet::baseline().with(Knob::CityTiles, 4);
        assert_eq!(set.get(Knob::CityTiles), 4);
        assert_eq!(set.get(Knob::ResourceTiles), 2);
        assert_eq!(set.get(Knob::PathLength), 50);
    }

    #[test]
    fn file_name_is_mandatory() {
        let err = "pathLength=10\n".parse::<ParameterSet>().unwrap_err();
        assert!(err.to_string().contains("fileName"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!("speed=3\nfileName=x\n".parse::<ParameterSet>().is_err());
        assert!("pathLength=abc\nfileName=x\n".parse::<ParameterSet>().is_err());
    }

    #[test]
    fn knob_names_parse_back() {
        for knob in Knob::ALL {
            assert_eq!(knob.key().parse::<Knob>().unwrap(), knob);
        }
        assert_eq!("PATHSTEP".parse::<Knob>().unwrap(), Knob::PathStep);
    }
}
