//! Victim selector — component C.
//!
//! Walks `<procdir>/<pid>` entries once per tick and returns the single
//! process judged most responsible for the current memory shortage.
//! Selection is a deterministic total order so the same mocked procdir
//! under the same policy always returns the same pid (`spec.md` §8).

use std::path::Path;

use regex::Regex;

use crate::procfs_reader::{self, ProcError};

/// Large enough to dominate the ordinary range of `oom_score` (roughly
/// `[-1000, 1000]`) and of `vm_rss_kib` on any machine with less than a
/// few TiB of RAM, but far below `i32::MAX` so it never itself overflows
/// the badness computation.
const BADNESS_BIAS: i32 = 10_000_000;

/// A scanned process. Constructed fresh every scan, never cached across
/// ticks: pids get reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub oom_score: i32,
    pub oom_score_adj: i32,
    pub vm_rss_kib: i64,
    pub num_threads: i32,
    pub state_char: u8,
    pub ppid: i32,
    pub starttime: u64,
    pub uid: u32,
    pub comm: Vec<u8>,
    pub badness: i32,
}

/// Policy knobs derived once from the CLI at startup.
#[derive(Clone)]
pub struct SelectionPolicy {
    pub avoid_regex: Option<Regex>,
    pub prefer_regex: Option<Regex>,
    pub ignore_root_user: bool,
    pub ignore_positive_adj: bool,
    pub sort_by_rss: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            avoid_regex: None,
            prefer_regex: None,
            ignore_root_user: false,
            ignore_positive_adj: false,
            sort_by_rss: false,
        }
    }
}

/// Strict lexicographic order over `(badness, vm_rss_kib, pid)`. `true`
/// means `candidate` should replace `current_best`.
fn is_larger(current_best: &ProcessInfo, candidate: &ProcessInfo) -> bool {
    let a = (current_best.badness, current_best.vm_rss_kib, current_best.pid);
    let b = (candidate.badness, candidate.vm_rss_kib, candidate.pid);
    b > a
}

fn compute_badness(base: i32, comm: &[u8], policy: &SelectionPolicy) -> i32 {
    let comm_str = String::from_utf8_lossy(comm);
    let mut badness = base;
    if let Some(re) = &policy.avoid_regex {
        if re.is_match(&comm_str) {
            badness = badness.saturating_sub(BADNESS_BIAS);
        }
    }
    if let Some(re) = &policy.prefer_regex {
        if re.is_match(&comm_str) {
            badness = badness.saturating_add(BADNESS_BIAS);
        }
    }
    badness
}

fn is_kernel_thread(pid: i32, ppid: i32) -> bool {
    ppid == 0 && pid != 1
}

/// Build a [`ProcessInfo`] for one pid, or `None` if it should be skipped
/// entirely (our own pid, pid 1, a kernel thread, or unreadable — any of
/// these is an expected per-tick race, not an error worth surfacing).
fn inspect(
    procdir: &Path,
    pid: i32,
    own_pid: i32,
    page_size_kib: u64,
    policy: &SelectionPolicy,
) -> Option<ProcessInfo> {
    if pid == own_pid || pid == 1 {
        return None;
    }

    let stat = procfs_reader::read_stat(procdir, pid).ok()?;
    if is_kernel_thread(pid, stat.ppid) {
        return None;
    }

    // A vanished-mid-scan pid fails these reads too (ENOENT); treat it the
    // same as the statm race below and drop the candidate rather than
    // scoring it with a made-up default.
    let oom_score = procfs_reader::read_oom_score(procdir, pid).ok()?;
    let oom_score_adj = procfs_reader::read_oom_score_adj(procdir, pid).ok()?;

    if policy.ignore_positive_adj && oom_score_adj > 0 {
        return None;
    }

    let uid = procfs_reader::read_uid_from_status(procdir, pid).ok()?;
    if policy.ignore_root_user && uid == 0 {
        return None;
    }

    let statm_rss_kib = procfs_reader::read_statm_rss_kib(procdir, pid, page_size_kib);
    let vm_rss_kib = match statm_rss_kib {
        Ok(rss) => rss as i64,
        // A zombie main thread can report 0 in statm; if the process
        // still has live threads, fall through with 0 and let the
        // vm_rss_kib tie-break naturally demote it below live peers.
        Err(ProcError::NotFound) => return None,
        Err(_) => 0,
    };

    let comm = procfs_reader::read_comm(procdir, pid).unwrap_or_else(|_| stat.comm.clone());

    let base = if policy.sort_by_rss {
        vm_rss_kib.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    } else {
        oom_score
    };
    let badness = compute_badness(base, &comm, policy);

    Some(ProcessInfo {
        pid,
        oom_score,
        oom_score_adj,
        vm_rss_kib,
        num_threads: stat.num_threads,
        state_char: stat.state,
        ppid: stat.ppid,
        starttime: stat.starttime,
        uid,
        comm,
        badness,
    })
}

/// One O(N) pass over `procdir`, O(1) state beyond the current best.
pub fn find_victim(
    procdir: &Path,
    own_pid: i32,
    page_size_kib: u64,
    policy: &SelectionPolicy,
) -> Option<ProcessInfo> {
    let entries = std::fs::read_dir(procdir).ok()?;

    let mut best: Option<ProcessInfo> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(pid) = name.parse::<i32>() else { continue };

        if let Some(candidate) = inspect(procdir, pid, own_pid, page_size_kib, policy) {
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    if is_larger(&current, &candidate) {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pi(pid: i32, badness: i32, rss: i64) -> ProcessInfo {
        ProcessInfo {
            pid,
            oom_score: badness,
            oom_score_adj: 0,
            vm_rss_kib: rss,
            num_threads: 1,
            state_char: b'S',
            ppid: 1,
            starttime: 5000,
            uid: 1000,
            comm: b"proc".to_vec(),
            badness,
        }
    }

    #[test]
    fn order_is_antisymmetric() {
        let a = pi(100, 10, 100);
        let b = pi(101, 20, 100);
        assert!(is_larger(&a, &b));
        assert!(!is_larger(&b, &a));
    }

    #[test]
    fn order_is_transitive() {
        let a = pi(1, 1, 1);
        let b = pi(2, 2, 2);
        let c = pi(3, 3, 3);
        assert!(is_larger(&a, &b));
        assert!(is_larger(&b, &c));
        assert!(is_larger(&a, &c));
    }

    #[test]
    fn pid_breaks_ties_on_equal_score_and_rss() {
        let a = pi(100, 50, 1000);
        let b = pi(101, 50, 1000);
        assert!(is_larger(&a, &b));
    }

    #[test]
    fn rss_breaks_ties_on_equal_score() {
        let a = pi(100, 50, 1000);
        let b = pi(200, 50, 2000);
        assert!(is_larger(&a, &b));
    }

    #[test]
    fn zombie_with_zero_rss_is_demoted_below_live_peer_of_equal_score() {
        let zombie = pi(103, 50, 0);
        let live = pi(102, 50, 4);
        assert!(is_larger(&zombie, &live));
    }

    fn write_proc_entry(
        root: &Path,
        pid: i32,
        oom_score: i32,
        oom_score_adj: i32,
        rss_pages: i64,
        num_threads: i32,
        ppid: i32,
        uid: u32,
        comm: &str,
    ) {
        let dir = root.join(pid.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("oom_score"), format!("{oom_score}\n")).unwrap();
        std::fs::write(dir.join("oom_score_adj"), format!("{oom_score_adj}\n")).unwrap();
        std::fs::write(dir.join("statm"), format!("0 {rss_pages} 0 0 0 0 0\n")).unwrap();
        std::fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        std::fs::write(
            dir.join("status"),
            format!("Name:\t{comm}\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\n"),
        )
        .unwrap();
        let stat = format!(
            "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 {num_threads} 0 5000 1000000 {rss} 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0",
            rss = rss_pages
        );
        std::fs::write(dir.join("stat"), stat).unwrap();
    }

    #[test]
    fn default_policy_selects_highest_oom_score_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 100, 0, 1234, 1, 1, 1000, "a");
        write_proc_entry(root, 101, 100, 0, 1238, 1, 1, 1000, "b");
        write_proc_entry(root, 102, 101, 0, 4, 1, 1, 1000, "c");
        write_proc_entry(root, 103, 103, 0, 0, 2, 1, 1000, "d");

        let policy = SelectionPolicy::default();
        let victim = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(victim.pid, 103);
    }

    #[test]
    fn sort_by_rss_selects_highest_rss() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 100, 0, 1234, 1, 1, 1000, "a");
        write_proc_entry(root, 101, 100, 0, 1238, 1, 1, 1000, "b");
        write_proc_entry(root, 102, 101, 0, 4, 1, 1, 1000, "c");
        write_proc_entry(root, 103, 103, 0, 0, 2, 1, 1000, "d");

        let policy = SelectionPolicy {
            sort_by_rss: true,
            ..SelectionPolicy::default()
        };
        let victim = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(victim.pid, 101);
    }

    #[test]
    fn determinism_repeated_scans_agree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 50, 0, 1000, 1, 1, 1000, "a");
        write_proc_entry(root, 200, 50, 0, 1000, 1, 1, 1000, "b");

        let policy = SelectionPolicy::default();
        let first = find_victim(root, 99999, 4, &policy).unwrap();
        let second = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(first.pid, second.pid);
        // Equal score and rss: higher pid wins, per spec.
        assert_eq!(first.pid, 200);
    }

    #[test]
    fn own_pid_and_init_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 1, 999, 0, 999999, 1, 0, 0, "init");
        write_proc_entry(root, 555, 999, 0, 999999, 1, 1, 0, "self");
        write_proc_entry(root, 200, 10, 0, 10, 1, 1, 1000, "victim");

        let policy = SelectionPolicy::default();
        let victim = find_victim(root, 555, 4, &policy).unwrap();
        assert_eq!(victim.pid, 200);
    }

    #[test]
    fn ignore_positive_adj_skips_protected_processes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 999, 1000, 1000, 1, 1, 1000, "shielded");
        write_proc_entry(root, 200, 10, 0, 10, 1, 1, 1000, "normal");

        let policy = SelectionPolicy {
            ignore_positive_adj: true,
            ..SelectionPolicy::default()
        };
        let victim = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(victim.pid, 200);
    }

    #[test]
    fn avoid_regex_demotes_but_does_not_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 999, 0, 1000, 1, 1, 1000, "sshd");
        write_proc_entry(root, 200, 10, 0, 10, 1, 1, 1000, "normal");

        let policy = SelectionPolicy {
            avoid_regex: Some(Regex::new("sshd").unwrap()),
            ..SelectionPolicy::default()
        };
        let victim = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(victim.pid, 200, "sshd should be avoided in favor of normal");
    }

    #[test]
    fn prefer_regex_wins_even_with_lower_oom_score() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_proc_entry(root, 100, 999, 0, 1000, 1, 1, 1000, "leaker");
        write_proc_entry(root, 200, 10, 0, 10, 1, 1, 1000, "build-worker");

        let policy = SelectionPolicy {
            prefer_regex: Some(Regex::new("build-worker").unwrap()),
            ..SelectionPolicy::default()
        };
        let victim = find_victim(root, 99999, 4, &policy).unwrap();
        assert_eq!(victim.pid, 200);
    }
}
