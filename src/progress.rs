//! Scan progress reporting for the CLI.
//!
//! `intake run` and `intake intel scan` print one line per item or topic plus
//! a final aggregate. Progress goes to **stderr** so stdout stays parseable.

use anyhow::{bail, Result};
use std::io::Write;

/// A single progress event emitted by a scan body.
#[derive(Clone, Debug)]
pub enum ScanProgressEvent {
    /// Processing of one unit (item or topic) is starting.
    Started {
        n: usize,
        total: usize,
        label: String,
    },
    /// One unit finished.
    Finished {
        label: String,
        ok: bool,
        detail: String,
    },
    /// Aggregate line for the whole pass.
    Summary { line: String },
}

pub trait ScanProgressReporter: Send + Sync {
    fn report(&self, event: ScanProgressEvent);
}

/// Human-friendly progress on stderr: `[2/5] link generic https://...`.
pub struct StderrProgress;

impl ScanProgressReporter for StderrProgress {
    fn report(&self, event: ScanProgressEvent) {
        let line = match &event {
            ScanProgressEvent::Started { n, total, label } => {
                format!("[{}/{}] {}\n", n, total, label)
            }
            ScanProgressEvent::Finished { label, ok, detail } => {
                let mark = if *ok { "ok" } else { "FAILED" };
                format!("    {} {}: {}\n", mark, label, detail)
            }
            // The aggregate line goes to stdout from the command itself.
            ScanProgressEvent::Summary { .. } => return,
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScanProgressReporter for JsonProgress {
    fn report(&self, event: ScanProgressEvent) {
        let obj = match &event {
            ScanProgressEvent::Started { n, total, label } => serde_json::json!({
                "event": "started",
                "n": n,
                "total": total,
                "label": label,
            }),
            ScanProgressEvent::Finished { label, ok, detail } => serde_json::json!({
                "event": "finished",
                "label": label,
                "ok": ok,
                "detail": detail,
            }),
            ScanProgressEvent::Summary { line } => serde_json::json!({
                "event": "summary",
                "summary": line,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter (daemon and server paths log through `tracing` instead).
pub struct NoProgress;

impl ScanProgressReporter for NoProgress {
    fn report(&self, _event: ScanProgressEvent) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parses `--progress`; `None` means the TTY default.
    pub fn from_flag(flag: Option<&str>) -> Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some("off") => Ok(ProgressMode::Off),
            Some(other) => bail!(
                "Unknown progress mode: {}. Use human, json, or off.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ScanProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        assert_eq!(ProgressMode::from_flag(Some("json")).unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::from_flag(Some("off")).unwrap(), ProgressMode::Off);
        assert!(ProgressMode::from_flag(Some("loud")).is_err());
    }
}
