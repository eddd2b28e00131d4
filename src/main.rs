//! # memguard
//!
//! A userspace early-OOM daemon for Linux: watches `/proc/meminfo` for
//! memory and swap pressure and kills the worst offending process
//! before the kernel's own OOM killer has to step in.
//!
//! ## Module organization
//!
//! - [`meminfo`]: parses `/proc/meminfo` into a `MemoryState`.
//! - [`procfs_reader`]: per-pid `/proc` accessors, including the hostile
//!   `stat` parser.
//! - [`selector`]: walks `/proc` once per tick and picks a victim.
//! - [`killer`]: delivers SIGTERM/SIGKILL with the pid-reuse guard.
//! - [`controller`]: the main loop and pressure state machine.
//! - [`hygiene`]: byte-sanitisation helpers shared by logging paths.
//! - [`thresholds`]: the `TERM[,KILL]` tuple grammar.
//! - [`cli`] / [`config`]: argument parsing and startup validation.
//! - [`selfcare`]: the daemon's own OOM/priority/memory-lock hygiene.
//! - [`notify`]: best-effort desktop notifications.

mod cli;
mod config;
mod controller;
mod hygiene;
mod killer;
mod meminfo;
mod notify;
mod procfs_reader;
mod selector;
mod selfcare;
mod thresholds;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use cli::RawArgs;
use config::Config;
use controller::Controller;
use meminfo::MeminfoReader;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args = RawArgs::parse();

    if args.help {
        print_help();
        std::process::exit(0);
    }
    if args.version {
        eprintln!("memguard {VERSION}");
        std::process::exit(0);
    }
    if !args.extra.is_empty() {
        eprintln!("memguard: fatal: unexpected argument(s): {:?}", args.extra);
        std::process::exit(13);
    }

    let procdir = Path::new(&args.procdir);
    let mut meminfo_reader = match MeminfoReader::open(procdir) {
        Ok(r) => r,
        Err(e) => fatal(&e.to_string(), 1),
    };
    let startup_state = match meminfo_reader.read() {
        Ok(s) => s,
        Err(e) => fatal(&e.to_string(), 1),
    };

    let config = match Config::from_args(&args, &startup_state) {
        Ok(c) => c,
        Err(e) => fatal(&e.to_string(), e.exit_code()),
    };

    if let Err(e) = selfcare::protect_self_from_oom() {
        fatal(&e.to_string(), 1);
    }
    selfcare::lock_memory();
    if config.raise_priority {
        selfcare::raise_priority();
    }

    print_startup_banner(&startup_state, &config);

    setup_signal_handler();

    let own_pid = std::process::id() as i32;
    let page_size_kib = page_size_kib();

    let mut controller = Controller::new(config, meminfo_reader, own_pid, page_size_kib, &SHUTDOWN);
    controller.run();
}

fn fatal(message: &str, code: i32) -> ! {
    eprintln!("memguard: fatal: {message}");
    std::process::exit(code);
}

fn print_help() {
    eprintln!("memguard {VERSION} - kill the worst memory offender before the kernel OOM killer has to");
    eprintln!();
    eprintln!("this help text describes the available flags:");
    eprintln!("  -m PCT[,PCT]       memory TERM[,KILL] percent thresholds (default 10)");
    eprintln!("  -s PCT[,PCT]       swap TERM[,KILL] percent thresholds (default 10)");
    eprintln!("  -M KIB[,KIB]       absolute memory thresholds, overrides -m");
    eprintln!("  -S KIB[,KIB]       absolute swap thresholds, overrides -s");
    eprintln!("  -r SECS            report interval on stdout, 0 disables (default 1)");
    eprintln!("  -p                 raise the daemon's own scheduling priority");
    eprintln!("  -d                 print every scan decision");
    eprintln!("  -n                 send a desktop notification after every kill");
    eprintln!("  --avoid RE         avoid killing processes whose comm matches RE");
    eprintln!("  --prefer RE        prefer killing processes whose comm matches RE");
    eprintln!("  --ignore-root-user never select a process owned by uid 0");
    eprintln!("  --ignore-positive-adj  skip processes with a positive oom_score_adj");
    eprintln!("  --sort-by-rss      rank candidates by resident set size");
    eprintln!("  -i                 accepted for backwards compatibility, no effect");
    eprintln!("  -h, --help         this help text");
    eprintln!("  -v, --version      print the version");
}

fn print_startup_banner(state: &meminfo::MemoryState, config: &Config) {
    eprintln!("memguard {VERSION}");
    eprintln!(
        "mem total: {} MiB, min: {} MiB ({:5.2}%)",
        state.mem_total_kib / 1024,
        (state.mem_total_kib as f64 * config.mem_term_percent / 100.0 / 1024.0) as u64,
        config.mem_term_percent,
    );
    eprintln!(
        "swap total: {} MiB, min: {} MiB ({:5.2}%)",
        state.swap_total_kib / 1024,
        (state.swap_total_kib as f64 * config.swap_term_percent / 100.0 / 1024.0) as u64,
        config.swap_term_percent,
    );
    eprintln!(
        "sending SIGTERM when mem <= {:5.2}% and swap <= {:5.2}%",
        config.mem_term_percent, config.swap_term_percent,
    );
}

fn page_size_kib() -> u64 {
    let bytes = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    (bytes.max(0) as u64) / 1024
}

/// The one piece of process-wide mutable state the daemon keeps: the
/// shutdown flag itself. The signal handler writes it directly (an
/// async-signal-safe store is all §5 permits inside the handler), and
/// the controller polls the same flag at each sleep boundary — no
/// helper thread, single-threaded cooperative scheduling throughout.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn setup_signal_handler() {
    unsafe {
        libc::signal(libc::SIGINT, signal_handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as *const () as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_: i32) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
