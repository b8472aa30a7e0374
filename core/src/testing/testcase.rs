use std::{
    fmt,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Per-testcase ceilings as written in the test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Limits {
    pub time_ms: u64,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

impl Limits {
    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb * MIB
    }

    pub fn disk_bytes(&self) -> u64 {
        self.disk_mb * MIB
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    index: usize,
    input_path: PathBuf,
    output_path: PathBuf,
    expected_path: PathBuf,
    limits: Limits,
}

impl TestCase {
    pub fn new(
        index: usize,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        expected: impl Into<PathBuf>,
        limits: Limits,
    ) -> Self {
        Self {
            index,
            input_path: input.into(),
            output_path: output.into(),
            expected_path: expected.into(),
            limits,
        }
    }

    /// 1-based.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn expected_path(&self) -> &Path {
        &self.expected_path
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidGroup {
    #[error("Test indices are 1-based, but group starts at 0")]
    ZeroIndex,

    #[error("Group ({0}, {1}) is empty: first index is greater than last")]
    Reversed(usize, usize),
}

/// Inclusive range of testcase indices. In the plan it is written as `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct TestGroup {
    first: usize,
    last: usize,
}

impl TestGroup {
    pub fn new(first: usize, last: usize) -> Result<Self, InvalidGroup> {
        if first == 0 {
            return Err(InvalidGroup::ZeroIndex);
        }
        if first > last {
            return Err(InvalidGroup::Reversed(first, last));
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

impl TryFrom<(usize, usize)> for TestGroup {
    type Error = InvalidGroup;

    fn try_from((first, last): (usize, usize)) -> Result<Self, Self::Error> {
        Self::new(first, last)
    }
}

impl From<TestGroup> for (usize, usize) {
    fn from(g: TestGroup) -> Self {
        (g.first, g.last)
    }
}

impl fmt::Display for TestGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.last)
    }
}
