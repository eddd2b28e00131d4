//! Validated, immutable configuration for memguard.
//!
//! Per the redesign note in `spec.md` §9, every CLI flag is resolved
//! exactly once, here, into a single `Config` that is threaded through
//! the rest of the program by reference. No process-wide mutable flags
//! exist after this point, except the SIGINT/SIGTERM shutdown latch.

use std::fmt;
use std::path::PathBuf;

use regex::Regex;

use crate::cli::RawArgs;
use crate::meminfo::MemoryState;
use crate::selector::SelectionPolicy;
use crate::thresholds::{parse_term_kill_tuple, ThresholdParseError};

/// Fatal startup failures, each carrying the exit code `spec.md` §6
/// requires.
#[derive(Debug)]
pub enum StartupError {
    InvalidMemThreshold(ThresholdParseError),
    InvalidSwapThreshold(ThresholdParseError),
    InvalidReportInterval(String),
    InvalidRegex { flag: &'static str, source: regex::Error },
    Meminfo(crate::meminfo::MeminfoError),
    OomScoreAdj(std::io::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::InvalidMemThreshold(_) => 15,
            StartupError::InvalidSwapThreshold(_) => 16,
            StartupError::InvalidReportInterval(_) => 1,
            StartupError::InvalidRegex { .. } => 1,
            StartupError::Meminfo(_) => 1,
            StartupError::OomScoreAdj(_) => 1,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::InvalidMemThreshold(e) => write!(f, "invalid -m/-M value: {e}"),
            StartupError::InvalidSwapThreshold(e) => write!(f, "invalid -s/-S value: {e}"),
            StartupError::InvalidReportInterval(s) => write!(f, "invalid -r value: '{s}'"),
            StartupError::InvalidRegex { flag, source } => {
                write!(f, "invalid --{flag} regex: {source}")
            }
            StartupError::Meminfo(e) => write!(f, "{e}"),
            StartupError::OomScoreAdj(e) => {
                write!(f, "failed to set own oom_score_adj: {e}")
            }
        }
    }
}

impl std::error::Error for StartupError {}

/// Fully validated, immutable configuration. Built once, at startup.
pub struct Config {
    pub procdir: PathBuf,
    pub mem_term_percent: f64,
    pub mem_kill_percent: f64,
    pub swap_term_percent: f64,
    pub swap_kill_percent: f64,
    pub report_interval_seconds: f64,
    pub raise_priority: bool,
    pub debug: bool,
    pub notify: bool,
    pub policy: SelectionPolicy,
}

impl Config {
    /// Resolve raw CLI args into a validated `Config`, given the
    /// `MemoryState` observed at startup (needed to turn `-M`/`-S`
    /// absolute KiB overrides into percentages).
    pub fn from_args(args: &RawArgs, startup_state: &MemoryState) -> Result<Config, StartupError> {
        let (mem_term_percent, mem_kill_percent) = match &args.mem_kib {
            Some(kib_tuple) => {
                let upper = startup_state.mem_total_kib.max(1) as f64;
                let (term_kib, kill_kib) = parse_term_kill_tuple(kib_tuple, upper)
                    .map_err(StartupError::InvalidMemThreshold)?;
                (100.0 * term_kib / upper, 100.0 * kill_kib / upper)
            }
            None => parse_term_kill_tuple(&args.mem_percent, 100.0)
                .map_err(StartupError::InvalidMemThreshold)?,
        };

        let (swap_term_percent, swap_kill_percent) = match &args.swap_kib {
            Some(kib_tuple) => {
                let upper = startup_state.swap_total_kib.max(1) as f64;
                let (term_kib, kill_kib) = parse_term_kill_tuple(kib_tuple, upper)
                    .map_err(StartupError::InvalidSwapThreshold)?;
                (100.0 * term_kib / upper, 100.0 * kill_kib / upper)
            }
            None => parse_term_kill_tuple(&args.swap_percent, 100.0)
                .map_err(StartupError::InvalidSwapThreshold)?,
        };

        let report_interval_seconds: f64 = args
            .report_interval_seconds
            .parse()
            .map_err(|_| StartupError::InvalidReportInterval(args.report_interval_seconds.clone()))?;
        if report_interval_seconds < 0.0 {
            return Err(StartupError::InvalidReportInterval(
                args.report_interval_seconds.clone(),
            ));
        }

        let avoid_regex = compile_optional_regex(&args.avoid, "avoid")?;
        let prefer_regex = compile_optional_regex(&args.prefer, "prefer")?;

        let policy = SelectionPolicy {
            avoid_regex,
            prefer_regex,
            ignore_root_user: args.ignore_root_user,
            ignore_positive_adj: args.ignore_positive_adj,
            sort_by_rss: args.sort_by_rss,
        };

        Ok(Config {
            procdir: PathBuf::from(&args.procdir),
            mem_term_percent,
            mem_kill_percent,
            swap_term_percent,
            swap_kill_percent,
            report_interval_seconds,
            raise_priority: args.raise_priority,
            debug: args.debug,
            notify: args.notify,
            policy,
        })
    }
}

fn compile_optional_regex(
    pattern: &Option<String>,
    flag: &'static str,
) -> Result<Option<Regex>, StartupError> {
    match pattern {
        None => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|source| StartupError::InvalidRegex { flag, source }),
    }
}
