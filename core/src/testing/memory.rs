use std::collections::HashMap;

use sysinfo::{Pid, PidExt, Process, ProcessExt, ProcessRefreshKind, System, SystemExt};

/// Tracks the peak resident memory of a process and all of its descendants.
///
/// The candidate is started through a shell, which may or may not `exec` into the
/// program; summing the whole tree measures the program in both cases.
pub struct MemorySampler {
    sys: System,
    root: Pid,
    peak_bytes: u64,
}

impl MemorySampler {
    pub fn new(pid: u32) -> Self {
        Self {
            sys: System::new(),
            root: Pid::from_u32(pid),
            peak_bytes: 0,
        }
    }

    /// Take one sample. Returns `false` once the root process has disappeared,
    /// which is not an error: the caller just stops sampling.
    pub fn sample(&mut self) -> bool {
        self.sys
            .refresh_processes_specifics(ProcessRefreshKind::new());
        let procs = self.sys.processes();
        if !procs.contains_key(&self.root) {
            return false;
        }
        let current: u64 = procs
            .iter()
            .filter(|&(&pid, _)| descends_from(procs, pid, self.root))
            .map(|(_, p)| p.memory())
            .sum();
        if current > self.peak_bytes {
            log::trace!("pid {}: new peak rss {} bytes", self.root, current);
            self.peak_bytes = current;
        }
        true
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }
}

fn descends_from(procs: &HashMap<Pid, Process>, mut pid: Pid, root: Pid) -> bool {
    // bounded walk; a pid table is a forest, but entries may be stale mid-refresh
    for _ in 0..=procs.len() {
        if pid == root {
            return true;
        }
        match procs.get(&pid).and_then(|p| p.parent()) {
            Some(parent) => pid = parent,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod test {
    use std::process::{Command, Stdio};

    use super::*;

    #[test]
    fn sampler_should_observe_live_process_and_stop_after_exit() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "sleep 0.3"])
            .stdin(Stdio::null())
            .spawn()
            .unwrap();
        let mut sampler = MemorySampler::new(child.id());

        assert!(sampler.sample());
        assert!(sampler.peak_bytes() > 0);

        child.wait().unwrap();
        assert!(!sampler.sample());
    }

    #[test]
    fn peak_should_never_decrease() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "sleep 0.2"])
            .stdin(Stdio::null())
            .spawn()
            .unwrap();
        let mut sampler = MemorySampler::new(child.id());

        let mut last = 0;
        while sampler.sample() {
            assert!(sampler.peak_bytes() >= last);
            last = sampler.peak_bytes();
            if child.try_wait().unwrap().is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        child.wait().unwrap();
    }
}
