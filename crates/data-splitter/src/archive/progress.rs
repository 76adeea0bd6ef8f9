//! Progress reporting for table-year copies.
//!
//! The copy engine reports through [`ProgressObserver`]. The stock
//! [`LineProgressReporter`] writes the machine-readable lines that external
//! monitors parse from stdout:
//!
//! ```text
//! PROGRESS table=orders year=2022 processed=0 total=0 batch=0 status=started
//! PROGRESS table=orders year=2022 processed=1000 total=2500 batch=10
//! PROGRESS table=orders year=2022 processed=2500 total=2500 batch=25 status=completed duration=1.5s
//! FINAL table=orders year=2022 processed=2500 duration=1.5s exit=0
//! ```

use std::io::{self, Stdout, Write};
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

/// Counters at a reporting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent<'a> {
    pub table: &'a str,
    pub year: i32,
    pub processed: u64,
    pub total: u64,
    pub batch: u64,
}

/// Receives progress events from the copy engine.
pub trait ProgressObserver: Send + Sync {
    /// A table-year copy started.
    fn on_started(&self, table: &str, year: i32);

    /// A heartbeat interval elapsed.
    fn on_heartbeat(&self, event: &ProgressEvent<'_>);

    /// A table-year copy finished.
    fn on_completed(&self, event: &ProgressEvent<'_>, duration: Duration);
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_started(&self, _table: &str, _year: i32) {}
    fn on_heartbeat(&self, _event: &ProgressEvent<'_>) {}
    fn on_completed(&self, _event: &ProgressEvent<'_>, _duration: Duration) {}
}

/// `PROGRESS ... status=started` line.
pub fn format_started(table: &str, year: i32) -> String {
    format!("PROGRESS table={table} year={year} processed=0 total=0 batch=0 status=started")
}

/// Heartbeat `PROGRESS` line.
pub fn format_heartbeat(e: &ProgressEvent<'_>) -> String {
    format!(
        "PROGRESS table={} year={} processed={} total={} batch={}",
        e.table, e.year, e.processed, e.total, e.batch
    )
}

/// `PROGRESS ... status=completed` line.
pub fn format_completed(e: &ProgressEvent<'_>, duration: Duration) -> String {
    format!(
        "PROGRESS table={} year={} processed={} total={} batch={} status=completed duration={}",
        e.table,
        e.year,
        e.processed,
        e.total,
        e.batch,
        format_duration(duration)
    )
}

/// `FINAL` line closing a table-year.
pub fn format_final(e: &ProgressEvent<'_>, duration: Duration) -> String {
    format!(
        "FINAL table={} year={} processed={} duration={} exit=0",
        e.table,
        e.year,
        e.processed,
        format_duration(duration)
    )
}

/// Human-readable duration: `850ms`, `1.5s`, `2m3.25s`, `1h2m3s`.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds_ms = total_ms % 60_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }

    let whole = seconds_ms / 1000;
    let frac = seconds_ms % 1000;
    if frac == 0 {
        out.push_str(&format!("{whole}s"));
    } else {
        let frac = format!("{frac:03}");
        out.push_str(&format!("{whole}.{}s", frac.trim_end_matches('0')));
    }
    out
}

/// Writes progress lines to any writer, one line per event.
pub struct LineProgressReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineProgressReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the reporter and return its writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, lines: &[String]) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{line}"))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!("Failed to write progress line: {}", e);
        }
    }
}

impl LineProgressReporter<Stdout> {
    /// Reporter writing to the process's stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ProgressObserver for LineProgressReporter<W> {
    fn on_started(&self, table: &str, year: i32) {
        self.emit(&[format_started(table, year)]);
    }

    fn on_heartbeat(&self, event: &ProgressEvent<'_>) {
        self.emit(&[format_heartbeat(event)]);
    }

    fn on_completed(&self, event: &ProgressEvent<'_>, duration: Duration) {
        self.emit(&[
            format_completed(event, duration),
            format_final(event, duration),
        ]);
    }
}

/// Reporter writing to stdout.
pub type StdoutProgressReporter = LineProgressReporter<Stdout>;

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    /// Observer that keeps the formatted lines in memory.
    #[derive(Default)]
    pub struct RecordingObserver {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        pub fn heartbeats(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|l| l.starts_with("PROGRESS") && !l.contains("status="))
                .collect()
        }
    }

    impl ProgressObserver for RecordingObserver {
        fn on_started(&self, table: &str, year: i32) {
            self.lines.lock().unwrap().push(format_started(table, year));
        }

        fn on_heartbeat(&self, event: &ProgressEvent<'_>) {
            self.lines.lock().unwrap().push(format_heartbeat(event));
        }

        fn on_completed(&self, event: &ProgressEvent<'_>, _duration: Duration) {
            // Durations vary run to run; record a fixed one
            let fixed = Duration::ZERO;
            let mut lines = self.lines.lock().unwrap();
            lines.push(format_completed(event, fixed));
            lines.push(format_final(event, fixed));
        }
    }
}
