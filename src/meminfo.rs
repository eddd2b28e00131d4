//! Meminfo reader — component A.
//!
//! Parses `/proc/meminfo` into the four kernel-reported fields this
//! daemon is allowed to use. No heuristics, no derived "estimated
//! available" math of our own: if the kernel doesn't expose
//! `MemAvailable` (pre-3.14), we refuse to guess and fail fast at
//! startup instead.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const BUF_SIZE: usize = 8192;

static CLAMP_LOGGED: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum MeminfoError {
    Unreadable(std::io::Error),
    MemAvailableMissing,
}

impl fmt::Display for MeminfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeminfoError::Unreadable(e) => write!(f, "cannot read meminfo: {e}"),
            MeminfoError::MemAvailableMissing => write!(
                f,
                "MemAvailable not found in meminfo (kernel too old, need Linux 3.14+)"
            ),
        }
    }
}

impl std::error::Error for MeminfoError {}

/// One tick's snapshot of memory and swap pressure, in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryState {
    pub mem_total_kib: u64,
    pub mem_avail_kib: u64,
    pub swap_total_kib: u64,
    pub swap_free_kib: u64,
}

impl MemoryState {
    pub fn mem_avail_percent(&self) -> f64 {
        100.0 * self.mem_avail_kib as f64 / self.mem_total_kib.max(1) as f64
    }

    pub fn swap_free_percent(&self) -> f64 {
        100.0 * self.swap_free_kib as f64 / self.swap_total_kib.max(1) as f64
    }
}

/// Keeps `/proc/meminfo` (or `<procdir>/meminfo`) open across ticks and
/// re-reads it with seek-to-zero rather than reopening, to stay inside
/// the daemon's fd budget (`spec.md` §5).
pub struct MeminfoReader {
    file: File,
    buf: [u8; BUF_SIZE],
}

impl MeminfoReader {
    pub fn open(procdir: &Path) -> Result<Self, MeminfoError> {
        let path: PathBuf = procdir.join("meminfo");
        let file = File::open(&path).map_err(MeminfoError::Unreadable)?;
        Ok(Self {
            file,
            buf: [0u8; BUF_SIZE],
        })
    }

    pub fn read(&mut self) -> Result<MemoryState, MeminfoError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(MeminfoError::Unreadable)?;
        let n = self.file.read(&mut self.buf).map_err(MeminfoError::Unreadable)?;
        parse_meminfo(&self.buf[..n])
    }
}

fn parse_meminfo(buf: &[u8]) -> Result<MemoryState, MeminfoError> {
    let text = String::from_utf8_lossy(buf);

    let mut mem_total = None;
    let mut mem_avail = None;
    let mut swap_total = None;
    let mut swap_free = None;

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else { continue };
        let Some(value_str) = fields.next() else { continue };
        let Ok(value) = value_str.parse::<u64>() else { continue };

        match key {
            "MemTotal:" => mem_total = Some(value),
            "MemAvailable:" => mem_avail = Some(value),
            "SwapTotal:" => swap_total = Some(value),
            "SwapFree:" => swap_free = Some(value),
            _ => {}
        }
    }

    let mem_total = mem_total.unwrap_or(0);
    let mem_avail = mem_avail.ok_or(MeminfoError::MemAvailableMissing)?;
    let swap_total = swap_total.unwrap_or(0);
    let swap_free = swap_free.unwrap_or(0);

    let (mem_avail, clamped_mem) = clamp_at_most(mem_avail, mem_total);
    let (swap_free, clamped_swap) = clamp_at_most(swap_free, swap_total);

    if (clamped_mem || clamped_swap) && !CLAMP_LOGGED.swap(true, Ordering::Relaxed) {
        eprintln!("memguard: warning: kernel reported avail > total in /proc/meminfo, clamping");
    }

    Ok(MemoryState {
        mem_total_kib: mem_total,
        mem_avail_kib: mem_avail,
        swap_total_kib: swap_total,
        swap_free_kib: swap_free,
    })
}

fn clamp_at_most(value: u64, limit: u64) -> (u64, bool) {
    if value > limit {
        (limit, true)
    } else {
        (value, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
MemTotal:        8024108 kB
MemFree:         1234567 kB
MemAvailable:    4000000 kB
Buffers:          123456 kB
Cached:          2345678 kB
SwapTotal:        102396 kB
SwapFree:          51200 kB
";

    #[test]
    fn parses_well_formed_buffer() {
        let state = parse_meminfo(SAMPLE.as_bytes()).unwrap();
        assert_eq!(state.mem_total_kib, 8024108);
        assert_eq!(state.mem_avail_kib, 4000000);
        assert_eq!(state.swap_total_kib, 102396);
        assert_eq!(state.swap_free_kib, 51200);
    }

    #[test]
    fn missing_mem_available_is_fatal() {
        let buf = "MemTotal: 1000 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n";
        let err = parse_meminfo(buf.as_bytes()).unwrap_err();
        assert!(matches!(err, MeminfoError::MemAvailableMissing));
    }

    #[test]
    fn ignores_unknown_fields() {
        let buf = "MemTotal: 1000 kB\nMemAvailable: 500 kB\nSomeWeirdField: 99 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n";
        let state = parse_meminfo(buf.as_bytes()).unwrap();
        assert_eq!(state.mem_total_kib, 1000);
        assert_eq!(state.mem_avail_kib, 500);
    }

    #[test]
    fn clamps_impossible_avail_above_total() {
        let buf = "MemTotal: 1000 kB\nMemAvailable: 5000 kB\nSwapTotal: 100 kB\nSwapFree: 500 kB\n";
        let state = parse_meminfo(buf.as_bytes()).unwrap();
        assert_eq!(state.mem_avail_kib, 1000);
        assert_eq!(state.swap_free_kib, 100);
    }

    #[test]
    fn invariant_avail_never_exceeds_total() {
        let cases = [
            "MemTotal: 100 kB\nMemAvailable: 50 kB\nSwapTotal: 10 kB\nSwapFree: 5 kB\n",
            "MemTotal: 0 kB\nMemAvailable: 0 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n",
            "MemTotal: 16000000 kB\nMemAvailable: 16000000 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n",
        ];
        for c in cases {
            let state = parse_meminfo(c.as_bytes()).unwrap();
            assert!(state.mem_avail_kib <= state.mem_total_kib);
            assert!(state.swap_free_kib <= state.swap_total_kib);
        }
    }

    #[test]
    fn percent_helpers_avoid_div_by_zero() {
        let state = MemoryState {
            mem_total_kib: 0,
            mem_avail_kib: 0,
            swap_total_kib: 0,
            swap_free_kib: 0,
        };
        assert_eq!(state.mem_avail_percent(), 0.0);
        assert_eq!(state.swap_free_percent(), 0.0);
    }
}
