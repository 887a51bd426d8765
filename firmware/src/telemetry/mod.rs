//! Log sink for boot and cycle events.
//!
//! Lines are rendered with `core::fmt` into a fixed buffer and then handed to
//! defmt on the target or stdout on the host, so both builds print the same
//! text.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::{self, Write};

use heapless::String;
use meter_core::power::BootReport;
use meter_core::scheduler::CycleSummary;
use meter_core::status::{NodeStatusSnapshot, StatusFormatter};

/// Longest line emitted; longer output is truncated.
pub const LOG_LINE_CAPACITY: usize = 128;

type LogLine = String<LOG_LINE_CAPACITY>;

/// Renders a single line, keeping the fragments written before the buffer filled.
fn render(write: impl FnOnce(&mut LogLine) -> fmt::Result) -> LogLine {
    let mut line = LogLine::new();
    let _ = write(&mut line);
    line
}

/// Logs the boot banner, corrected configuration faults, and node status.
pub fn log_boot<TE: fmt::Debug>(report: &BootReport<TE>, snapshot: &NodeStatusSnapshot) {
    let formatter = StatusFormatter::new(snapshot);
    emit_log(&render(|line| formatter.write_identity_line(line)));
    for fault in report.faults.iter() {
        emit_log(&render(|line| write!(line, "config fault: {fault}")));
    }
    if let Some(err) = &report.wake_timer_error {
        emit_log(&render(|line| write!(line, "wake timer not programmed: {err:?}")));
    }
    emit_log(&render(|line| {
        write!(line, "sequence resumes after {}", report.sequence_start)
    }));
    emit_log(&render(|line| formatter.write_calibration_line(line)));
    emit_log(&render(|line| formatter.write_schedule_line(line)));
}

/// Logs a completed wake cycle.
pub fn log_cycle(cycle: u32, summary: &CycleSummary) {
    emit_log(&render(|line| write!(line, "cycle {cycle}: {summary}")));
}

/// Logs an unrecoverable boot error.
pub fn log_boot_failure(err: &dyn fmt::Display) {
    emit_log(&render(|line| write!(line, "boot failed: {err}")));
}

#[cfg(target_os = "none")]
fn emit_log(line: &str) {
    defmt::info!("{=str}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_log(line: &str) {
    println!("{line}");
}
