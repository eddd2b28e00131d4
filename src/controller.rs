//! Controller — component E.
//!
//! The main loop: sample meminfo, drive the two-axis pressure state
//! machine, hand the worse axis off to the selector and killer, sleep
//! an adaptive interval, repeat until the shutdown flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::killer::{self, KillOutcome, Signal};
use crate::meminfo::{MemoryState, MeminfoReader};
use crate::procfs_reader;
use crate::selector;
use crate::selfcare;

/// Resident set budget from `spec.md` §5/§8: checked once, after the
/// first status line, since that's the point by which startup
/// allocations have settled.
const MAX_SELF_RSS_KIB: u64 = 4096;

const TERM_WAIT: Duration = Duration::from_secs(10);
const WARNING_RATE_LIMIT: Duration = Duration::from_secs(60);

/// One axis's pressure state. Ordered `Normal < TermArmed < KillArmed` so
/// the worse of the memory and swap axes can be picked with a plain
/// `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Normal,
    TermArmed,
    KillArmed,
}

fn axis_phase(avail_percent: f64, term_percent: f64, kill_percent: f64) -> Phase {
    if avail_percent <= kill_percent {
        Phase::KillArmed
    } else if avail_percent <= term_percent {
        Phase::TermArmed
    } else {
        Phase::Normal
    }
}

/// Adaptive sleep: inversely proportional to headroom above the TERM
/// threshold, clamped to `[50, 1000]` ms. Monotonic: less headroom never
/// yields a longer sleep.
fn adaptive_sleep_ms(mem_headroom: f64, swap_headroom: f64) -> u64 {
    const MIN_SLEEP_MS: f64 = 50.0;
    const MAX_SLEEP_MS: f64 = 1000.0;
    const MAX_HEADROOM: f64 = 20.0;

    let headroom = mem_headroom.min(swap_headroom);
    let sleep_ms = if headroom <= 0.0 {
        MIN_SLEEP_MS
    } else if headroom >= MAX_HEADROOM {
        MAX_SLEEP_MS
    } else {
        MIN_SLEEP_MS + (headroom / MAX_HEADROOM) * (MAX_SLEEP_MS - MIN_SLEEP_MS)
    };
    sleep_ms.round() as u64
}

pub struct Controller {
    config: Config,
    meminfo: MeminfoReader,
    own_pid: i32,
    page_size_kib: u64,
    last_report: Instant,
    last_no_victim_warning: Option<Instant>,
    rss_checked: bool,
    shutdown: &'static AtomicBool,
}

impl Controller {
    pub fn new(
        config: Config,
        meminfo: MeminfoReader,
        own_pid: i32,
        page_size_kib: u64,
        shutdown: &'static AtomicBool,
    ) -> Self {
        Self {
            config,
            meminfo,
            own_pid,
            page_size_kib,
            last_report: Instant::now() - Duration::from_secs(3600),
            last_no_victim_warning: None,
            rss_checked: false,
            shutdown,
        }
    }

    /// Run until the shutdown flag is observed. Exits at the next sleep
    /// boundary, never mid-kill.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let state = match self.meminfo.read() {
                Ok(s) => s,
                Err(e) => {
                    if self.config.debug {
                        println!("memguard: debug: meminfo read failed: {e}");
                    }
                    std::thread::sleep(Duration::from_millis(200));
                    continue;
                }
            };

            self.maybe_report(&state);
            self.act(&state);

            let mem_headroom = state.mem_avail_percent() - self.config.mem_term_percent;
            let swap_headroom = state.swap_free_percent() - self.config.swap_term_percent;
            std::thread::sleep(Duration::from_millis(adaptive_sleep_ms(
                mem_headroom,
                swap_headroom,
            )));
        }
    }

    fn maybe_report(&mut self, state: &MemoryState) {
        if self.config.report_interval_seconds <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f64(self.config.report_interval_seconds);
        if self.last_report.elapsed() < interval {
            return;
        }
        self.last_report = Instant::now();
        println!(
            "mem avail: {} of {} MiB ({:5.2}%), swap free: {} of {} MiB ({:5.2}%)",
            state.mem_avail_kib / 1024,
            state.mem_total_kib / 1024,
            state.mem_avail_percent(),
            state.swap_free_kib / 1024,
            state.swap_total_kib / 1024,
            state.swap_free_percent(),
        );

        if !self.rss_checked {
            self.rss_checked = true;
            if let Some(rss) = selfcare::rss_kib(&self.config.procdir, self.page_size_kib) {
                if rss > MAX_SELF_RSS_KIB {
                    eprintln!(
                        "memguard: warning: own RSS {rss} KiB exceeds the {MAX_SELF_RSS_KIB} KiB budget"
                    );
                }
            }
        }
    }

    fn act(&mut self, state: &MemoryState) {
        let mem_phase = axis_phase(
            state.mem_avail_percent(),
            self.config.mem_term_percent,
            self.config.mem_kill_percent,
        );
        let swap_phase = axis_phase(
            state.swap_free_percent(),
            self.config.swap_term_percent,
            self.config.swap_kill_percent,
        );
        let phase = mem_phase.max(swap_phase);

        if phase == Phase::Normal {
            if self.config.debug {
                println!(
                    "memguard: debug: mem {:.2}% swap {:.2}%, no action",
                    state.mem_avail_percent(),
                    state.swap_free_percent()
                );
            }
            return;
        }

        let signal = if phase == Phase::KillArmed {
            Signal::Kill
        } else {
            Signal::Term
        };

        let victim = selector::find_victim(
            &self.config.procdir,
            self.own_pid,
            self.page_size_kib,
            &self.config.policy,
        );

        let Some(victim) = victim else {
            self.warn_no_victim();
            return;
        };

        let reason = format!(
            "mem <= {:5.2}% and swap <= {:5.2}%",
            self.config.mem_term_percent, self.config.swap_term_percent
        );
        self.deliver(&victim, signal, &reason);
    }

    fn deliver(&self, victim: &selector::ProcessInfo, signal: Signal, reason: &str) {
        let cgroup =
            procfs_reader::read_cgroup_path(&self.config.procdir, victim.pid).unwrap_or_else(|_| "/".to_string());
        let outcome = killer::kill_victim(&self.config.procdir, victim, signal);
        match outcome {
            KillOutcome::Stale => {
                if self.config.debug {
                    println!("memguard: debug: pid {} no longer matches scan, skipping", victim.pid);
                }
                return;
            }
            KillOutcome::PermissionDenied => {
                eprintln!("memguard: warning: permission denied signalling pid {}", victim.pid);
                return;
            }
            KillOutcome::Delivered => {}
        }

        println!("{}", killer::format_notification(victim, signal, &cgroup, reason));
        if self.config.notify {
            crate::notify::send_kill_notification(victim, signal);
        }

        if signal == Signal::Term {
            if !killer::wait_for_exit(&self.config.procdir, victim.pid, TERM_WAIT) {
                let escalated = killer::kill_victim(&self.config.procdir, victim, Signal::Kill);
                if escalated == KillOutcome::Delivered {
                    println!(
                        "{}",
                        killer::format_notification(victim, Signal::Kill, &cgroup, reason)
                    );
                }
            }
        }
    }

    fn warn_no_victim(&mut self) {
        let should_warn = match self.last_no_victim_warning {
            None => true,
            Some(t) => t.elapsed() >= WARNING_RATE_LIMIT,
        };
        if should_warn {
            eprintln!("memguard: warning: no eligible victim found for current policy");
            self.last_no_victim_warning = Some(Instant::now());
        }
    }
}
