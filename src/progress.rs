//! Batch progress reporting.
//!
//! Reports observable progress during `rvw analyze` so users see which files
//! finished and how the batch ended. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

use crate::models::OutcomeStatus;

/// A single progress event for a batch.
#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    /// Discovery has started for this root. Total unknown.
    Discovering { root: String },
    /// One more file reached a terminal state; `n` files done so far.
    FileDone {
        n: u64,
        path: String,
        status: OutcomeStatus,
    },
    /// Every admitted file is done.
    Finished {
        analyzed: u64,
        skipped: u64,
        errors: u64,
    },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    /// Emit a progress event. Called from batch workers.
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "analyze  1,234 done  src/lib.rs  skipped".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Discovering { root } => {
                format!("analyze {}  discovering...\n", root)
            }
            BatchProgressEvent::FileDone { n, path, status } => {
                format!(
                    "analyze  {} done  {}  {}\n",
                    format_number(*n),
                    path,
                    status.as_str()
                )
            }
            BatchProgressEvent::Finished {
                analyzed,
                skipped,
                errors,
            } => format!(
                "analyze  finished  {} analyzed, {} skipped, {} failed\n",
                format_number(*analyzed),
                format_number(*skipped),
                format_number(*errors)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            BatchProgressEvent::FileDone { n, path, status } => serde_json::json!({
                "event": "progress",
                "phase": "analyzing",
                "n": n,
                "path": path,
                "status": status
            }),
            BatchProgressEvent::Finished {
                analyzed,
                skipped,
                errors,
            } => serde_json::json!({
                "event": "finished",
                "analyzed": analyzed,
                "skipped": skipped,
                "errors": errors
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value. `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
