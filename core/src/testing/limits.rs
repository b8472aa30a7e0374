use std::io;

use rlimit::Resource;
use tokio::process::Command;

use super::testcase::Limits;

/// Ceiling of simultaneously open file descriptors, independent of the plan.
pub const MAX_OPEN_FILES: u64 = 50;

/// The rlimits installed on a candidate process between `fork` and `exec`.
///
/// Soft and hard limits are set to the same value, so the candidate can never raise them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub address_space_bytes: u64,
    pub cpu_seconds: u64,
    pub open_files: u64,
}

impl ResourceLimits {
    pub fn new(memory_mb: u64, time_ms: u64) -> Self {
        Self {
            address_space_bytes: memory_mb * 1024 * 1024,
            // RLIMIT_CPU only has whole-second granularity.
            cpu_seconds: time_ms / 1000,
            open_files: MAX_OPEN_FILES,
        }
    }

    /// Apply to the calling process. Only async-signal-safe calls happen here.
    pub fn apply(&self) -> io::Result<()> {
        rlimit::setrlimit(Resource::AS, self.address_space_bytes, self.address_space_bytes)?;
        rlimit::setrlimit(Resource::NOFILE, self.open_files, self.open_files)?;
        rlimit::setrlimit(Resource::CPU, self.cpu_seconds, self.cpu_seconds)?;
        Ok(())
    }

    /// Make `cmd` apply these limits in the child right before `exec`.
    /// If any of them cannot be installed, `spawn()` fails and the program never runs.
    pub fn install(self, cmd: &mut Command) {
        // SAFETY: the hook only issues setrlimit(2) syscalls; it neither allocates nor locks.
        unsafe {
            cmd.pre_exec(move || self.apply());
        }
    }
}

impl From<&Limits> for ResourceLimits {
    fn from(l: &Limits) -> Self {
        Self::new(l.memory_mb, l.time_ms)
    }
}
