use std::{fmt, time::Duration};

use serde::Serialize;

use super::{testcase::bytes_to_mb, verifier::Mismatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum JudgeCode {
    AC,
    WA,
    TLE,
    MLE,
    RE,
    DLE,
    SE,
}

/// How a failed candidate process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "return code {}", code),
            Termination::Signaled(sig) => write!(f, "signal {}", sig),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Failure {
    TimeLimitExceeded,
    MemoryLimitExceeded {
        peak_bytes: u64,
        limit_mb: u64,
        termination: Termination,
        stderr: String,
    },
    RuntimeFailure {
        termination: Termination,
        stderr: String,
    },
    WrongAnswer(Mismatch),
    DiskLimitExceeded {
        used_bytes: u64,
        limit_mb: u64,
    },
    SetupFailure(String),
}

impl Failure {
    pub fn judge(&self) -> JudgeCode {
        use Failure::*;
        match self {
            TimeLimitExceeded => JudgeCode::TLE,
            MemoryLimitExceeded { .. } => JudgeCode::MLE,
            RuntimeFailure { .. } => JudgeCode::RE,
            WrongAnswer(_) => JudgeCode::WA,
            DiskLimitExceeded { .. } => JudgeCode::DLE,
            SetupFailure(_) => JudgeCode::SE,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            Failure::MemoryLimitExceeded { stderr, .. } | Failure::RuntimeFailure { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Failure::*;
        match self {
            TimeLimitExceeded => write!(f, "Time limit exceeded"),
            MemoryLimitExceeded {
                peak_bytes,
                limit_mb,
                termination,
                stderr,
            } => write!(
                f,
                "Memory limit exceeded: {:.2}/{} MB (process failed with {}) : {}",
                bytes_to_mb(*peak_bytes),
                limit_mb,
                termination,
                stderr.trim_end()
            ),
            RuntimeFailure {
                termination,
                stderr,
            } => write!(f, "Process failed with {} : {}", termination, stderr.trim_end()),
            WrongAnswer(mismatch) => write!(
                f,
                "Output does not match the expected output. {}",
                mismatch
            ),
            DiskLimitExceeded {
                used_bytes,
                limit_mb,
            } => write!(
                f,
                "Disk Memory Limit Exceeded: {:.2}/{} MB",
                bytes_to_mb(*used_bytes),
                limit_mb
            ),
            SetupFailure(reason) => write!(f, "Setup failed: {}", reason),
        }
    }
}

/// Everything known about one attempted testcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub failure: Option<Failure>,
    pub execution_time: Duration,
    pub peak_memory_bytes: u64,
    /// Only measured when the testcase passed.
    pub disk_usage_bytes: Option<u64>,
}

impl ExecutionOutcome {
    pub fn is_passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn judge(&self) -> JudgeCode {
        self.failure.as_ref().map_or(JudgeCode::AC, Failure::judge)
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time.as_secs_f64() * 1000.0
    }

    pub fn peak_memory_mb(&self) -> f64 {
        bytes_to_mb(self.peak_memory_bytes)
    }

    pub fn disk_usage_mb(&self) -> Option<f64> {
        self.disk_usage_bytes.map(bytes_to_mb)
    }

    /// Elapsed milliseconds on success, the failure reason otherwise.
    pub fn diagnostic(&self) -> String {
        match &self.failure {
            None => format!("{:.2}", self.execution_time_ms()),
            Some(f) => f.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn runtime_failure_should_carry_stderr() {
        let f = Failure::RuntimeFailure {
            termination: Termination::Exited(1),
            stderr: "segmentation fault\n".into(),
        };
        assert_eq!(f.judge(), JudgeCode::RE);
        assert_eq!(
            f.to_string(),
            "Process failed with return code 1 : segmentation fault"
        );
    }

    #[test]
    fn disk_failure_should_show_used_and_allowed() {
        let f = Failure::DiskLimitExceeded {
            used_bytes: 600 * 1024 * 1024,
            limit_mb: 512,
        };
        assert_eq!(f.to_string(), "Disk Memory Limit Exceeded: 600.00/512 MB");
    }

    #[test]
    fn passed_outcome_should_be_ac() {
        let o = ExecutionOutcome {
            failure: None,
            execution_time: Duration::from_millis(250),
            peak_memory_bytes: 0,
            disk_usage_bytes: Some(0),
        };
        assert!(o.is_passed());
        assert_eq!(o.judge(), JudgeCode::AC);
        assert_eq!(o.diagnostic(), "250.00");
    }
}
