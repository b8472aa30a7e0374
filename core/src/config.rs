use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::testing::{Limits, Supervisor, TestCase, TestGroup};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Invalid test plan TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("No test group is defined in `plan.groups`")]
    NoGroup,

    #[error("Test {index} has no entry in `limits.{table}` (only {len} entries)")]
    MissingLimit {
        table: &'static str,
        index: usize,
        len: usize,
    },
}

/// The whole `judge.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestPlan {
    /// Directory of the loaded file; relative paths of the plan hang off it.
    #[serde(skip)]
    pub source_dir: PathBuf,
    pub candidate: CandidateConfig,
    pub paths: PathConfig,
    pub limits: LimitConfig,
    pub plan: GroupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CandidateConfig {
    pub command: String,
    #[serde(default = "CandidateConfig::default_shell")]
    pub shell: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathConfig {
    pub scratch_dir: PathBuf,
    pub input_prefix: String,
    #[serde(default)]
    pub output_prefix: String,
    pub expected_output_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitConfig {
    pub time_ms: LimitTable,
    pub memory_mb: LimitTable,
    pub disk_mb: LimitTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupConfig {
    pub groups: Vec<TestGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum LimitRun {
    Single(u64),
    Repeat { value: u64, repeat: usize },
}

/// Limit values indexed by 1-based test number, written as runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<LimitRun>")]
pub struct LimitTable(Vec<u64>);

impl From<Vec<LimitRun>> for LimitTable {
    fn from(runs: Vec<LimitRun>) -> Self {
        let mut values = Vec::new();
        for run in runs {
            match run {
                LimitRun::Single(v) => values.push(v),
                LimitRun::Repeat { value, repeat } => {
                    values.extend(std::iter::repeat(value).take(repeat))
                }
            }
        }
        Self(values)
    }
}

impl LimitTable {
    pub fn get(&self, index: usize) -> Option<u64> {
        index.checked_sub(1).and_then(|i| self.0.get(i)).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CandidateConfig {
    fn default_shell() -> PathBuf {
        PathBuf::from("/bin/sh")
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

fn strip_prefix_dot(path: &Path) -> &Path {
    path.strip_prefix(".").unwrap_or(path)
}

impl TestPlan {
    pub const FILENAME: &str = "judge.toml";

    pub fn example_toml() -> String {
        let file = Asset::get(Self::FILENAME).unwrap();
        std::str::from_utf8(file.data.as_ref()).unwrap().to_owned()
    }

    /// Parse and validate. `source_dir` is left empty, i.e. the current dir.
    pub fn from_toml(s: &str) -> Result<Self, PlanError> {
        let plan: Self = toml::from_str(s)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_toml_file(filepath: impl AsRef<Path>) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let toml = fsutil::read(filepath).context("Cannot read test plan")?;
        let mut plan = Self::from_toml(&String::from_utf8_lossy(&toml))
            .with_context(|| format!("Invalid test plan: {:?}", filepath))?;
        plan.source_dir = filepath.parent().unwrap_or(Path::new(".")).to_owned();
        Ok(plan)
    }

    /// Find the plan file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let cur_dir = cur_dir.as_ref();
        cur_dir
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
            .with_context(|| {
                format!(
                    "Cannot find '{}' in {:?} or its ancestors",
                    Self::FILENAME,
                    cur_dir
                )
            })
    }

    pub fn from_file_finding_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let filepath = Self::find_file_in_ancestors(cur_dir)?;
        Self::from_toml_file(filepath)
    }

    /// Every index of every group must be covered by all three limit tables.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.plan.groups.is_empty() {
            return Err(PlanError::NoGroup);
        }
        let tables = [
            ("time_ms", &self.limits.time_ms),
            ("memory_mb", &self.limits.memory_mb),
            ("disk_mb", &self.limits.disk_mb),
        ];
        let max_index = self.plan.groups.iter().map(TestGroup::last).max().unwrap_or(0);
        for (table, values) in tables {
            if values.len() < max_index {
                return Err(PlanError::MissingLimit {
                    table,
                    index: max_index,
                    len: values.len(),
                });
            }
        }
        Ok(())
    }

    fn with_source_dir(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.source_dir.join(strip_prefix_dot(path))
        }
    }

    pub fn groups(&self) -> &[TestGroup] {
        &self.plan.groups
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.with_source_dir(&self.paths.scratch_dir)
    }

    pub fn limits_of(&self, index: usize) -> Result<Limits, PlanError> {
        let get = |table: &'static str, values: &LimitTable| {
            values.get(index).ok_or(PlanError::MissingLimit {
                table,
                index,
                len: values.len(),
            })
        };
        Ok(Limits {
            time_ms: get("time_ms", &self.limits.time_ms)?,
            memory_mb: get("memory_mb", &self.limits.memory_mb)?,
            disk_mb: get("disk_mb", &self.limits.disk_mb)?,
        })
    }

    /// Build the immutable testcase for `index` with every path resolved.
    pub fn resolve(&self, index: usize) -> Result<TestCase, PlanError> {
        let limits = self.limits_of(index)?;
        let scratch_dir = self.scratch_dir();
        let PathConfig {
            input_prefix,
            output_prefix,
            expected_output_prefix,
            ..
        } = &self.paths;

        Ok(TestCase::new(
            index,
            scratch_dir.join(format!("{}{}.in", input_prefix, index)),
            scratch_dir.join(format!("{}{}.out", output_prefix, index)),
            self.with_source_dir(format!("{}{}.out", expected_output_prefix, index)),
            limits,
        ))
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(&self.candidate.command).shell(&self.candidate.shell)
    }
}
