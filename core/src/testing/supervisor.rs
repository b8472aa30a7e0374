use std::{
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use tokio::process::{Child, Command};

use super::{
    cputime,
    limits::ResourceLimits,
    memory::MemorySampler,
    result::{Failure, Termination},
    testcase::{Limits, TestCase},
};

/// Result of running the candidate once, before its output is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// `None` when the candidate exited with status 0.
    pub failure: Option<Failure>,
    pub execution_time: Duration,
    pub peak_memory_bytes: u64,
}

impl Execution {
    fn setup_failure(reason: impl ToString) -> Self {
        Self {
            failure: Some(Failure::SetupFailure(reason.to_string())),
            execution_time: Duration::ZERO,
            peak_memory_bytes: 0,
        }
    }
}

/// How the candidate ended, observed right before it was reaped.
#[derive(Debug, Clone, Copy)]
struct Exit {
    status: ExitStatus,
    /// CPU time of the shell and every descendant it waited for.
    cpu_time: Duration,
}

/// Spawns the candidate under rlimits and watches it until it exits.
///
/// There is no wall-clock timeout: the CPU rlimit makes the kernel kill a runaway candidate.
#[derive(Debug, Clone)]
pub struct Supervisor {
    command: String,
    shell: PathBuf,
}

impl Supervisor {
    const DEFAULT_SHELL: &str = "/bin/sh";
    const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: Self::DEFAULT_SHELL.into(),
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn get_command(&self) -> &str {
        &self.command
    }

    /// Run the candidate for `testcase` with `scratch_dir` as its working directory.
    ///
    /// Anything that goes wrong before the candidate starts is a `SetupFailure` verdict;
    /// an `Err` means the judge itself lost track of the child.
    pub async fn execute(
        &self,
        testcase: &TestCase,
        scratch_dir: &Path,
    ) -> anyhow::Result<Execution> {
        let rlimits = ResourceLimits::from(testcase.limits());
        self.execute_with(testcase, scratch_dir, rlimits).await
    }

    async fn execute_with(
        &self,
        testcase: &TestCase,
        scratch_dir: &Path,
        rlimits: ResourceLimits,
    ) -> anyhow::Result<Execution> {
        let stdin = match fsutil::open_file(testcase.input_path()) {
            Ok(f) => f,
            Err(e) => return Ok(Execution::setup_failure(e)),
        };
        let stdout = match fsutil::create_file(testcase.output_path()) {
            Ok(f) => f,
            Err(e) => return Ok(Execution::setup_failure(e)),
        };

        let limits = testcase.limits();
        let mut cmd = Command::new(&self.shell);
        cmd.args(["-c", &self.command])
            .current_dir(scratch_dir)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        rlimits.install(&mut cmd);

        log::debug!(
            "Spawning '{} -c {}' in {:?} with {:?}",
            self.shell.to_string_lossy(),
            self.command,
            scratch_dir,
            rlimits
        );
        let start_at = Instant::now();
        let mut proc = match cmd.spawn() {
            Ok(proc) => proc,
            Err(e) => {
                return Ok(Execution::setup_failure(format!(
                    "Failed to spawn '{} -c {}': {}",
                    self.shell.to_string_lossy(),
                    self.command,
                    e
                )))
            }
        };
        let mut stderr = proc.stderr.take().context("Failed to open stderr")?;
        let pid = proc
            .id()
            .context("Candidate process was reaped before it could be observed")?;

        let mut sampler = MemorySampler::new(pid);
        let mut stderr_buf = Vec::new();
        let (copied, exit) = tokio::join!(
            tokio::io::copy(&mut stderr, &mut stderr_buf),
            Self::watch(&mut proc, pid, &mut sampler),
        );
        let execution_time = start_at.elapsed();

        let exit = exit.context("Failed to wait for the candidate process")?;
        copied.context("Failed to read stderr of the candidate process")?;

        let peak_memory_bytes = sampler.peak_bytes();
        log::debug!(
            "pid {} exited with {} after {:?} (cpu {:?}), peak rss {} bytes",
            pid,
            exit.status,
            execution_time,
            exit.cpu_time,
            peak_memory_bytes
        );

        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();
        Ok(Execution {
            failure: classify(exit, stderr, peak_memory_bytes, limits),
            execution_time,
            peak_memory_bytes,
        })
    }

    /// Sample memory until the child terminates, then read its CPU time and reap it.
    async fn watch(proc: &mut Child, pid: u32, sampler: &mut MemorySampler) -> anyhow::Result<Exit> {
        let mut sampling = true;
        loop {
            if sampling {
                sampling = sampler.sample();
            }
            if cputime::has_exited(pid)? {
                break;
            }
            tokio::time::sleep(Self::SAMPLE_INTERVAL).await;
        }

        let cpu_time = cputime::tree_cpu_time(pid).unwrap_or_else(|e| {
            log::warn!("Cannot read CPU time of pid {}: {:#}", pid, e);
            Duration::ZERO
        });
        let status = proc.wait().await?;
        Ok(Exit { status, cpu_time })
    }
}

fn is_cpu_limit_signal(sig: i32) -> bool {
    sig == libc::SIGKILL || sig == libc::SIGXCPU
}

/// Whether `cpu_time` is close enough to the CPU rlimit for the kernel to have enforced it.
fn reached_cpu_limit(cpu_time: Duration, limits: &Limits) -> bool {
    // RLIMIT_CPU of 0 behaves as 1 second
    let budget = Duration::from_secs(ResourceLimits::from(limits).cpu_seconds.max(1));
    cpu_time * 10 >= budget * 9
}

/// Killed by a CPU-limit signal. A signal that killed a grandchild only shows up as the
/// shell's `128 + n` exit code, which a program can also return on purpose, so that
/// form needs the accumulated CPU time to back it up.
fn is_cpu_limit_kill(exit: &Exit, limits: &Limits) -> bool {
    match exit.status.signal() {
        Some(sig) => is_cpu_limit_signal(sig),
        None => {
            let shell_reported = exit
                .status
                .code()
                .filter(|&c| c > 128)
                .map_or(false, |c| is_cpu_limit_signal(c - 128));
            shell_reported && reached_cpu_limit(exit.cpu_time, limits)
        }
    }
}

fn classify(
    exit: Exit,
    stderr: String,
    peak_memory_bytes: u64,
    limits: &Limits,
) -> Option<Failure> {
    let status = exit.status;
    if status.success() {
        return None;
    }
    if is_cpu_limit_kill(&exit, limits) {
        return Some(Failure::TimeLimitExceeded);
    }

    let termination = match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(sig)) => Termination::Signaled(sig),
        (None, None) => Termination::Exited(-1),
    };

    // address-space exhaustion surfaces as an ordinary crash; attribute it by the sampled peak
    if peak_memory_bytes * 10 >= limits.memory_bytes() * 9 {
        return Some(Failure::MemoryLimitExceeded {
            peak_bytes: peak_memory_bytes,
            limit_mb: limits.memory_mb,
            termination,
            stderr,
        });
    }
    Some(Failure::RuntimeFailure {
        termination,
        stderr,
    })
}
