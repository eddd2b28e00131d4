//! Best-effort desktop notifications, gated by `-n`.
//!
//! A missing `notify-send` binary, a headless session, or any other
//! failure here must never affect the kill path: the notification is
//! strictly advisory, emitted after the kill has already been decided.

use crate::killer::Signal;
use crate::selector::ProcessInfo;

pub fn send_kill_notification(victim: &ProcessInfo, signal: Signal) {
    let comm = crate::hygiene::sanitize(&victim.comm);
    let summary = format!("memguard: {} sent to {} ({})", signal.name(), comm, victim.pid);
    let output = std::process::Command::new("notify-send")
        .args(["-u", "critical", "memguard", &summary])
        .output();

    if let Err(e) = output {
        eprintln!("memguard: debug: notify-send unavailable: {e}");
    }
}
