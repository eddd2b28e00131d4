//! Command-line surface for memguard.
//!
//! The flags themselves use `clap`, same as the teacher's `Config`. What
//! differs from a typical clap-derived CLI is that the exit codes and
//! stdout/stderr split are a boundary contract (`spec.md` §6) that
//! predates this crate and must match exactly, so help/version/extra-
//! positional-argument handling is done by hand in [`Config::from_args`]
//! rather than left to clap's defaults.

use clap::Parser;

/// Raw, unvalidated command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    disable_help_flag = true,
    disable_version_flag = true,
    about = "Early OOM daemon: kill the worst memory offender before the kernel OOM killer has to"
)]
pub struct RawArgs {
    /// Print this help text and exit.
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    pub version: bool,

    /// Memory TERM[,KILL] percent thresholds.
    #[arg(short = 'm', default_value = "10")]
    pub mem_percent: String,

    /// Swap TERM[,KILL] percent thresholds.
    #[arg(short = 's', default_value = "10")]
    pub swap_percent: String,

    /// Absolute memory TERM[,KILL] thresholds, in KiB, overriding `-m`.
    #[arg(short = 'M')]
    pub mem_kib: Option<String>,

    /// Absolute swap TERM[,KILL] thresholds, in KiB, overriding `-s`.
    #[arg(short = 'S')]
    pub swap_kib: Option<String>,

    /// Seconds between periodic status lines on stdout. 0 disables.
    #[arg(short = 'r', default_value = "1")]
    pub report_interval_seconds: String,

    /// Raise the daemon's own scheduling priority.
    #[arg(short = 'p')]
    pub raise_priority: bool,

    /// Print every scan decision to stdout.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Send a desktop notification after every kill.
    #[arg(short = 'n')]
    pub notify: bool,

    /// Regex of process names to avoid killing (lowest priority, not immune).
    #[arg(long = "avoid")]
    pub avoid: Option<String>,

    /// Regex of process names to prefer killing.
    #[arg(long = "prefer")]
    pub prefer: Option<String>,

    /// Never select a process owned by uid 0.
    #[arg(long = "ignore-root-user")]
    pub ignore_root_user: bool,

    /// Skip processes with a positive oom_score_adj.
    #[arg(long = "ignore-positive-adj")]
    pub ignore_positive_adj: bool,

    /// Rank candidates by resident set size instead of oom_score.
    #[arg(long = "sort-by-rss")]
    pub sort_by_rss: bool,

    /// Accepted for backwards compatibility, has no effect.
    #[arg(short = 'i')]
    pub legacy_i: bool,

    /// Root of the /proc-like tree to scan. Overridden in tests.
    #[arg(long = "procdir", default_value = "/proc", hide = true)]
    pub procdir: String,

    /// Anything left over is an error (spec.md exit code 13).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}
