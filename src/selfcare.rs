//! Self-protection discipline (`spec.md` §5): the daemon that is
//! supposed to save the machine from the OOM killer must not itself be
//! a casualty of the thing it watches for.

use std::fmt;

#[derive(Debug)]
pub struct SelfcareError(std::io::Error);

impl fmt::Display for SelfcareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SelfcareError {}

/// Best-effort request that the kernel lock our current and future
/// pages into RAM. Failure (commonly missing `CAP_IPC_LOCK`) is logged
/// and otherwise ignored; running unlocked is strictly worse, not fatal.
pub fn lock_memory() {
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        eprintln!("memguard: warning: mlockall failed: {err}, continuing unlocked");
    }
}

/// Set our own `oom_score_adj` to the minimum so the kernel OOM killer
/// never picks us. Fatal on failure: a daemon that can be OOM-killed
/// while protecting everything else has failed at its one job.
pub fn protect_self_from_oom() -> Result<(), SelfcareError> {
    std::fs::write("/proc/self/oom_score_adj", "-1000").map_err(SelfcareError)
}

/// Raise our own scheduling priority (`-p`). Best-effort: lacking
/// `CAP_SYS_NICE` is common and not worth failing startup over.
pub fn raise_priority() {
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        eprintln!("memguard: warning: failed to raise priority: {err}");
    }
}

/// Our own RSS in KiB, for the self-check in `spec.md` §8 (must stay
/// under 4096 KiB after the first status line).
pub fn rss_kib(procdir: &std::path::Path, page_size_kib: u64) -> Option<u64> {
    let pid = std::process::id() as i32;
    crate::procfs_reader::read_statm_rss_kib(procdir, pid, page_size_kib).ok()
}
