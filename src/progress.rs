//! Run progress reporting.
//!
//! Long `extract` and `track` runs report which document they are on so
//! users can tell a slow oracle from a stuck process. Progress goes to
//! **stderr**; stdout carries only the end-of-run summary.

use std::io::Write;

/// A single progress event for a run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Documents are being discovered. Total unknown.
    Discovering { run: String },
    /// Document `n` of `total` is starting.
    Processing {
        run: String,
        n: u64,
        total: u64,
        document: String,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "track  processing  12 / 1,340 documents (…)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { run } => format!("{}  discovering...\n", run),
            ProgressEvent::Processing {
                run,
                n,
                total,
                document,
            } => format!(
                "{}  processing  {} / {} documents ({})\n",
                run,
                format_number(*n),
                format_number(*total),
                document
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { run } => serde_json::json!({
                "event": "progress",
                "run": run,
                "phase": "discovering"
            }),
            ProgressEvent::Processing {
                run,
                n,
                total,
                document,
            } => serde_json::json!({
                "event": "progress",
                "run": run,
                "phase": "processing",
                "n": n,
                "total": total,
                "document": document
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
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
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn parse_modes() {
        use clap::ValueEnum;
        assert_eq!(ProgressMode::from_str("json", false), Ok(ProgressMode::Json));
        assert_eq!(ProgressMode::from_str("off", false), Ok(ProgressMode::Off));
        assert!(ProgressMode::from_str("loud", false).is_err());
    }
}
