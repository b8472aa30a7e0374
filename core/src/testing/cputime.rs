use std::{io, mem::MaybeUninit, time::Duration};

use anyhow::Context as _;

/// Whether child `pid` has terminated. The child is left unreaped, so its `/proc` entry
/// stays readable until somebody waits for it.
pub fn has_exited(pid: u32) -> io::Result<bool> {
    let mut info = MaybeUninit::<libc::siginfo_t>::zeroed();
    let options = libc::WEXITED | libc::WNOHANG | libc::WNOWAIT;
    // SAFETY: `info` is a valid, zeroed siginfo_t that outlives the call.
    let ret = unsafe { libc::waitid(libc::P_PID, pid as libc::id_t, info.as_mut_ptr(), options) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    // SAFETY: zero-initialized above and filled in by waitid on success.
    let info = unsafe { info.assume_init() };
    // with WNOHANG, si_pid stays 0 while the child is running
    Ok(unsafe { info.si_pid() } != 0)
}

/// CPU time spent by `pid` itself plus every descendant it has already waited for.
pub fn tree_cpu_time(pid: u32) -> anyhow::Result<Duration> {
    let path = format!("/proc/{}/stat", pid);
    let stat = fsutil::read(&path)?;
    parse_stat(&String::from_utf8_lossy(&stat))
        .with_context(|| format!("Unexpected format of {}", path))
}

fn clock_ticks_per_sec() -> u64 {
    // SAFETY: sysconf has no preconditions.
    match unsafe { libc::sysconf(libc::_SC_CLK_TCK) } {
        n if n > 0 => n as u64,
        _ => 100,
    }
}

/// Sum of utime, stime, cutime and cstime (fields 14 to 17).
fn parse_stat(stat: &str) -> Option<Duration> {
    // comm may contain spaces and parens, so fields are counted after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let ticks: Vec<u64> = rest
        .split_whitespace()
        .skip(11)
        .take(4)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if ticks.len() != 4 {
        return None;
    }
    let total: u64 = ticks.iter().sum();
    Some(Duration::from_secs_f64(
        total as f64 / clock_ticks_per_sec() as f64,
    ))
}

#[cfg(test)]
mod test {
    use std::process::{Command, Stdio};

    use super::*;

    #[test]
    fn parse_stat_should_sum_own_and_children_ticks() {
        let hz = clock_ticks_per_sec();
        let stat = format!(
            "4242 (a (b) c) Z 1 4242 4242 0 -1 4194560 100 0 0 0 {} {} {} {} 20 0 1 0 5 0 0",
            hz,
            hz / 2,
            hz * 2,
            hz / 2
        );
        assert_eq!(parse_stat(&stat), Some(Duration::from_secs(4)));
    }

    #[test]
    fn parse_stat_should_reject_truncated_line() {
        assert_eq!(parse_stat("1 (sh) S 0 1 1"), None);
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn exited_child_should_stay_readable_until_reaped() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exit 3"])
            .stdin(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();

        while !has_exited(pid).unwrap() {
            std::thread::sleep(Duration::from_millis(5));
        }
        // still a zombie: both checks can be repeated
        assert!(has_exited(pid).unwrap());
        assert!(dbg!(tree_cpu_time(pid)).is_ok());

        assert_eq!(child.wait().unwrap().code(), Some(3));
    }

    #[test]
    fn waited_descendants_should_count_toward_cpu_time() {
        // the busy loop runs in a grandchild that the outer shell waits for
        let mut child = Command::new("/bin/sh")
            .args(["-c", "timeout 0.5 sh -c 'while :; do :; done'; exit 0"])
            .stdin(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();

        while !has_exited(pid).unwrap() {
            std::thread::sleep(Duration::from_millis(10));
        }
        let cpu = dbg!(tree_cpu_time(pid)).unwrap();
        child.wait().unwrap();
        assert!(cpu >= Duration::from_millis(200));
    }
}
