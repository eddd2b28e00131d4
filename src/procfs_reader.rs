//! Process introspector — component B.
//!
//! Every accessor here reads exactly one `/proc/<pid>/...` file and
//! returns either a value or a [`ProcError`] that tells the caller
//! whether the process just vanished (expected, a race with the rest of
//! the system) or the file's contents didn't parse (a bug, or a kernel
//! we don't understand).

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ProcError {
    /// ENOENT: the process exited between being listed and being read.
    NotFound,
    /// The file was readable but its contents didn't match the expected
    /// kernel layout.
    Parse(String),
    /// Any other I/O failure (permissions, etc).
    Io(std::io::Error),
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::NotFound => write!(f, "process not found"),
            ProcError::Parse(s) => write!(f, "parse error: {s}"),
            ProcError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ProcError {}

fn read_proc_file(procdir: &Path, pid: i32, name: &str) -> Result<Vec<u8>, ProcError> {
    let path: PathBuf = procdir.join(pid.to_string()).join(name);
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ProcError::NotFound),
        Err(e) => Err(ProcError::Io(e)),
    }
}

/// The fields of `/proc/<pid>/stat` this daemon cares about, parsed with
/// the mandatory right-to-left scan for the closing paren of `comm`
/// (`spec.md` §4.2, §9 "Hostile comm"): a left-to-right scan is a
/// correctness bug because `comm` itself may contain `)`, spaces, tabs,
/// newlines, or characters that look like later state-machine fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    pub comm: Vec<u8>,
    pub state: u8,
    pub ppid: i32,
    pub num_threads: i32,
    pub vm_rss_pages: i64,
    pub starttime: u64,
}

/// Field index of each column after `comm)` in `/proc/<pid>/stat`,
/// 1-indexed starting right after `comm`, matching `proc(5)`.
mod stat_field {
    pub const STATE: usize = 0;
    pub const PPID: usize = 1;
    pub const NUM_THREADS: usize = 17;
    pub const STARTTIME: usize = 19;
    pub const RSS: usize = 21;
}

pub fn read_stat(procdir: &Path, pid: i32) -> Result<StatInfo, ProcError> {
    let buf = read_proc_file(procdir, pid, "stat")?;
    parse_stat(&buf)
}

fn parse_stat(buf: &[u8]) -> Result<StatInfo, ProcError> {
    let open = buf
        .iter()
        .position(|&b| b == b'(')
        .ok_or_else(|| ProcError::Parse("no '(' in stat".into()))?;
    // Rightmost ')' — comm may itself contain ')'.
    let close = buf
        .iter()
        .rposition(|&b| b == b')')
        .ok_or_else(|| ProcError::Parse("no ')' in stat".into()))?;
    if close <= open {
        return Err(ProcError::Parse("malformed comm delimiters in stat".into()));
    }

    let comm = buf[open + 1..close].to_vec();
    let remainder = std::str::from_utf8(&buf[close + 1..])
        .map_err(|_| ProcError::Parse("non-utf8 stat remainder".into()))?;
    let fields: Vec<&str> = remainder.split_whitespace().collect();

    let get = |idx: usize| -> Result<&str, ProcError> {
        fields
            .get(idx)
            .copied()
            .ok_or_else(|| ProcError::Parse(format!("stat remainder too short for field {idx}")))
    };

    let state = get(stat_field::STATE)?
        .bytes()
        .next()
        .ok_or_else(|| ProcError::Parse("empty state field".into()))?;
    let ppid = get(stat_field::PPID)?
        .parse::<i32>()
        .map_err(|_| ProcError::Parse("bad ppid".into()))?;
    let num_threads = get(stat_field::NUM_THREADS)?
        .parse::<i32>()
        .map_err(|_| ProcError::Parse("bad num_threads".into()))?;
    let starttime = get(stat_field::STARTTIME)?
        .parse::<u64>()
        .map_err(|_| ProcError::Parse("bad starttime".into()))?;
    let vm_rss_pages = get(stat_field::RSS)?
        .parse::<i64>()
        .map_err(|_| ProcError::Parse("bad rss".into()))?;

    Ok(StatInfo {
        comm,
        state,
        ppid,
        num_threads,
        vm_rss_pages,
        starttime,
    })
}

/// `state` char not in `{Z, X}`. A missing file means the process is
/// gone, which also counts as "not alive".
pub fn is_alive(procdir: &Path, pid: i32) -> bool {
    match read_stat(procdir, pid) {
        Ok(stat) => stat.state != b'Z' && stat.state != b'X',
        Err(_) => false,
    }
}

/// RSS from `/proc/<pid>/statm` field 2, in KiB. Prefers `statm` over the
/// `stat` RSS field because `statm` is expressed directly in pages with
/// no jiffies/signed-ness ambiguity.
pub fn read_statm_rss_kib(procdir: &Path, pid: i32, page_size_kib: u64) -> Result<u64, ProcError> {
    let buf = read_proc_file(procdir, pid, "statm")?;
    let text = std::str::from_utf8(&buf).map_err(|_| ProcError::Parse("non-utf8 statm".into()))?;
    let rss_pages: u64 = text
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ProcError::Parse("statm too short".into()))?
        .parse()
        .map_err(|_| ProcError::Parse("bad statm rss field".into()))?;
    Ok(rss_pages * page_size_kib)
}

pub fn read_oom_score(procdir: &Path, pid: i32) -> Result<i32, ProcError> {
    read_single_integer(procdir, pid, "oom_score")
}

pub fn read_oom_score_adj(procdir: &Path, pid: i32) -> Result<i32, ProcError> {
    read_single_integer(procdir, pid, "oom_score_adj")
}

fn read_single_integer(procdir: &Path, pid: i32, name: &str) -> Result<i32, ProcError> {
    let buf = read_proc_file(procdir, pid, name)?;
    std::str::from_utf8(&buf)
        .ok()
        .map(|s| s.trim())
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| ProcError::Parse(format!("bad integer in {name}")))
}

/// `/proc/<pid>/comm`, trailing newline stripped, limited to the kernel's
/// 15-printable-byte contract (copy at most 16 bytes).
pub fn read_comm(procdir: &Path, pid: i32) -> Result<Vec<u8>, ProcError> {
    let mut buf = read_proc_file(procdir, pid, "comm")?;
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    buf.truncate(16);
    Ok(buf)
}

/// `/proc/<pid>/cmdline` with NUL argument separators turned into spaces
/// for display, stopping at the first double-NUL (kernel pads extra
/// space in the page with NULs). Truncates to `max_len` bytes then fixes
/// up any UTF-8 sequence the truncation split.
pub fn read_cmdline(procdir: &Path, pid: i32, max_len: usize) -> Result<String, ProcError> {
    let raw = read_proc_file(procdir, pid, "cmdline")?;

    let mut end = raw.len();
    for i in 0..raw.len().saturating_sub(1) {
        if raw[i] == 0 && raw[i + 1] == 0 {
            end = i;
            break;
        }
    }
    let mut display: Vec<u8> = raw[..end]
        .iter()
        .map(|&b| if b == 0 { b' ' } else { b })
        .collect();
    // Trim a trailing separator that came from the single terminating NUL.
    while display.last() == Some(&b' ') {
        display.pop();
    }
    display.truncate(max_len);

    Ok(crate::hygiene::fix_truncated_utf8(&display))
}

/// cgroup path selection, preferring the v1 `memory` controller line over
/// the v2 unified (`hid == 0`) line, per `spec.md` §4.2 and the hybrid-
/// hierarchy design note in §9.
pub fn read_cgroup_path(procdir: &Path, pid: i32) -> Result<String, ProcError> {
    let buf = read_proc_file(procdir, pid, "cgroup")?;
    let text = std::str::from_utf8(&buf).map_err(|_| ProcError::Parse("non-utf8 cgroup".into()))?;
    Ok(parse_cgroup(text))
}

fn parse_cgroup(text: &str) -> String {
    let mut unified_path: Option<&str> = None;
    for line in text.lines() {
        let mut parts = line.splitn(3, ':');
        let hid = parts.next().unwrap_or("");
        let controllers = parts.next().unwrap_or("");
        let path = parts.next().unwrap_or("");

        if controllers.split(',').any(|c| c == "memory") {
            return path.to_string();
        }
        if controllers.is_empty() && hid == "0" {
            unified_path = Some(path);
        }
    }
    unified_path.unwrap_or("/").to_string()
}

/// `Uid:` line of `/proc/<pid>/status`, real uid (first of the four
/// values kernel reports).
pub fn read_uid_from_status(procdir: &Path, pid: i32) -> Result<u32, ProcError> {
    let buf = read_proc_file(procdir, pid, "status")?;
    let text = std::str::from_utf8(&buf).map_err(|_| ProcError::Parse("non-utf8 status".into()))?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            return rest
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| ProcError::Parse("bad Uid: line".into()));
        }
    }
    Err(ProcError::Parse("no Uid: line in status".into()))
}
