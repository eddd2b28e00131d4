//! Killer — component D.
//!
//! Delivers the signal chosen by the controller's state machine, with
//! the pid-reuse guard from `spec.md` §9: a pid selected during the scan
//! may refer to a different process by the time we're ready to signal
//! it, so we re-verify identity (`comm` + `starttime`) immediately
//! before calling `kill(2)`.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::procfs_reader;
use crate::selector::ProcessInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    fn as_libc(self) -> i32 {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
        }
    }
}

#[derive(Debug)]
pub enum KillError {
    /// `kill(2)` returned an unexpected errno (not ESRCH, which we treat
    /// as a no-op success since the process is already gone).
    Errno(i32),
}

impl fmt::Display for KillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillError::Errno(e) => write!(f, "kill(2) failed: errno {e}"),
        }
    }
}

impl std::error::Error for KillError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Signal delivered (or the target was already gone).
    Delivered,
    /// Permission denied; logged as a warning, not escalated.
    PermissionDenied,
    /// The pid now refers to a different process than the one we
    /// selected; the kill was aborted without touching anything.
    Stale,
}

/// Re-check that `pid` is still the same process we scored during
/// selection. A mismatch in `comm` or `starttime` means the pid was
/// recycled.
pub fn still_same_process(procdir: &Path, victim: &ProcessInfo) -> bool {
    let Ok(stat) = procfs_reader::read_stat(procdir, victim.pid) else {
        return false;
    };
    let comm_matches = procfs_reader::read_comm(procdir, victim.pid)
        .map(|c| c == victim.comm)
        .unwrap_or(false);
    comm_matches && stat.starttime == victim.starttime
}

/// Send `signal` to `victim`, guarding against pid reuse first.
pub fn kill_victim(procdir: &Path, victim: &ProcessInfo, signal: Signal) -> KillOutcome {
    if !still_same_process(procdir, victim) {
        return KillOutcome::Stale;
    }

    let ret = unsafe { libc::kill(victim.pid, signal.as_libc()) };
    if ret == 0 {
        return KillOutcome::Delivered;
    }

    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    match errno {
        libc::ESRCH => KillOutcome::Delivered,
        libc::EPERM => KillOutcome::PermissionDenied,
        _ => {
            eprintln!("memguard: warning: kill({}, {}) failed: errno {errno}", victim.pid, signal.name());
            KillOutcome::Delivered
        }
    }
}

/// Poll `is_alive` at a fixed cadence until `timeout` elapses or the
/// process exits. Returns `true` if the process exited within the
/// timeout.
pub fn wait_for_exit(procdir: &Path, pid: i32, timeout: Duration) -> bool {
    const POLL_INTERVAL: Duration = Duration::from_millis(100);
    let deadline = Instant::now() + timeout;
    loop {
        if !procfs_reader::is_alive(procdir, pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Build the sanitised, single-line stdout notification required by
/// `spec.md` §6: `sending SIGTERM/SIGKILL to process N "<comm>" uid U <cgroup> <reason>`.
pub fn format_notification(victim: &ProcessInfo, signal: Signal, cgroup: &str, reason: &str) -> String {
    let comm = crate::hygiene::sanitize(&victim.comm);
    format!(
        "sending {} to process {} \"{}\" uid {} {} {}",
        signal.name(),
        victim.pid,
        comm,
        victim.uid,
        cgroup,
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_victim(pid: i32) -> ProcessInfo {
        ProcessInfo {
            pid,
            oom_score: 500,
            oom_score_adj: 0,
            vm_rss_kib: 1000,
            num_threads: 1,
            state_char: b'S',
            ppid: 1,
            starttime: 5000,
            uid: 1000,
            comm: b"leaky".to_vec(),
            badness: 500,
        }
    }

    #[test]
    fn stale_when_procdir_entry_missing() {
        let dir = tempfile::tempdir().unwrap();
        let victim = sample_victim(424242);
        assert!(!still_same_process(dir.path(), &victim));
    }

    #[test]
    fn matches_when_comm_and_starttime_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let pid = 4242;
        let proc_dir = dir.path().join(pid.to_string());
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("comm"), "leaky\n").unwrap();
        std::fs::write(
            proc_dir.join("stat"),
            format!("{pid} (leaky) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 5000 1000000 200 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0"),
        )
        .unwrap();

        let victim = sample_victim(pid);
        assert!(still_same_process(dir.path(), &victim));
    }

    #[test]
    fn mismatch_when_comm_changed_pid_reused() {
        let dir = tempfile::tempdir().unwrap();
        let pid = 4242;
        let proc_dir = dir.path().join(pid.to_string());
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("comm"), "different\n").unwrap();
        std::fs::write(
            proc_dir.join("stat"),
            format!("{pid} (different) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 5000 1000000 200 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0"),
        )
        .unwrap();

        let victim = sample_victim(pid);
        assert!(!still_same_process(dir.path(), &victim));
    }

    #[test]
    fn mismatch_when_starttime_changed_despite_matching_comm() {
        // A new process can inherit the same pid and happen to share a
        // comm with the originally-selected victim (e.g. a quickly
        // respawned child of the same parent); starttime still differs.
        let dir = tempfile::tempdir().unwrap();
        let pid = 4242;
        let proc_dir = dir.path().join(pid.to_string());
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("comm"), "leaky\n").unwrap();
        std::fs::write(
            proc_dir.join("stat"),
            format!("{pid} (leaky) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 9999999 1000000 200 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0"),
        )
        .unwrap();

        let victim = sample_victim(pid);
        assert!(!still_same_process(dir.path(), &victim));
    }

    #[test]
    fn notification_is_sanitized_and_formatted() {
        let mut victim = sample_victim(123);
        victim.comm = b"weird name".to_vec();
        let line = format_notification(&victim, Signal::Term, "/", "mem <= 5.00%");
        assert!(line.starts_with("sending SIGTERM to process 123 \"weird_name\" uid 1000 / mem"));
    }
}
