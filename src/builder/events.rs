//! Build event reporting.
//!
//! With `--message-format json` every event is written to stdout as one
//! JSON object per line, tagged by `reason`:
//!
//! - `build-started`: the number of units and workers
//! - `unit-started`, `unit-finished`, `unit-failed`, `unit-cancelled`
//! - `diagnostic`: a warning or note raised outside a unit build
//! - `build-finished`: overall result and per-state counts
//!
//! New fields may be added; existing fields are not renamed or removed.
//! Human output goes to stderr, with a progress bar when attached to a
//! terminal.

use std::io::{IsTerminal, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::builder::scheduler::{BuildReport, UnitEvent, UnitState};
use crate::util::diagnostic::Diagnostic;

/// Output mode for build progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    BuildStarted { units: usize, jobs: usize },

    #[serde(rename = "unit-started")]
    UnitStarted { unit: String },

    #[serde(rename = "unit-finished")]
    UnitFinished {
        unit: String,
        /// `built` or `skipped`
        state: UnitState,
        duration_ms: u64,
    },

    #[serde(rename = "unit-failed")]
    UnitFailed {
        unit: String,
        message: String,
        duration_ms: u64,
    },

    #[serde(rename = "unit-cancelled")]
    UnitCancelled {
        unit: String,
        /// The failed unit this one depended on.
        cause: String,
    },

    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note")
        level: String,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        context: Vec<String>,
    },

    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        duration_ms: u64,
        built: usize,
        skipped: usize,
        failed: usize,
        cancelled: usize,
    },
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl BuildEvent {
    /// Convert a scheduler notification. `Building` has no JSON form.
    pub fn from_unit_event(event: &UnitEvent<'_>) -> Option<Self> {
        Some(match event {
            UnitEvent::Started(unit) => BuildEvent::UnitStarted { unit: unit.to_string() },
            UnitEvent::Building(_) => return None,
            UnitEvent::Finished { unit, state, duration } => BuildEvent::UnitFinished {
                unit: unit.to_string(),
                state: *state,
                duration_ms: millis(*duration),
            },
            UnitEvent::Failed { unit, error, duration } => BuildEvent::UnitFailed {
                unit: unit.to_string(),
                message: error.to_string(),
                duration_ms: millis(*duration),
            },
            UnitEvent::Cancelled { unit, cause } => BuildEvent::UnitCancelled {
                unit: unit.to_string(),
                cause: cause.to_string(),
            },
        })
    }

    pub fn diagnostic(diag: &Diagnostic) -> Self {
        BuildEvent::Diagnostic {
            level: diag.severity.to_string(),
            message: diag.message.clone(),
            context: diag.context.clone(),
        }
    }

    pub fn finished(report: &BuildReport) -> Self {
        BuildEvent::BuildFinished {
            success: report.success(),
            duration_ms: millis(report.duration),
            built: report.count(UnitState::Built),
            skipped: report.count(UnitState::Skipped),
            failed: report.count(UnitState::Failed),
            cancelled: report.count(UnitState::Cancelled),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Where build progress goes.
pub struct EventSink {
    format: MessageFormat,
    out: Box<dyn Write + Send>,
    progress: Option<ProgressBar>,
    color: bool,
}

impl EventSink {
    /// JSON to stdout, or human output to stderr.
    pub fn new(format: MessageFormat, verbose: bool) -> Self {
        let interactive = std::io::stderr().is_terminal();
        let mut sink = EventSink::with_writer(format, Box::new(std::io::stdout()));
        sink.color = interactive;
        if format == MessageFormat::Human && interactive && !verbose {
            sink.progress = Some(ProgressBar::hidden());
        }
        sink
    }

    /// Write JSON events to `out`; human output is never colored.
    pub fn with_writer(format: MessageFormat, out: Box<dyn Write + Send>) -> Self {
        EventSink {
            format,
            out,
            progress: None,
            color: false,
        }
    }

    fn emit_json(&mut self, event: &BuildEvent) {
        let _ = writeln!(self.out, "{}", event.to_json());
    }

    fn status(&self, verb: &str, message: &str) {
        let line = format!("{:>12} {}", verb, message);
        match &self.progress {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }

    pub fn build_started(&mut self, units: usize, jobs: usize) {
        match self.format {
            MessageFormat::Json => self.emit_json(&BuildEvent::BuildStarted { units, jobs }),
            MessageFormat::Human => {
                if let Some(pb) = &self.progress {
                    pb.set_length(units as u64);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                }
            }
        }
    }

    pub fn unit_event(&mut self, event: &UnitEvent<'_>) {
        if self.format == MessageFormat::Json {
            if let Some(json) = BuildEvent::from_unit_event(event) {
                self.emit_json(&json);
            }
            return;
        }

        match event {
            UnitEvent::Started(_) => {}
            UnitEvent::Building(unit) => {
                self.status("Building", &unit.to_string());
                if let Some(pb) = &self.progress {
                    pb.set_message(unit.to_string());
                }
            }
            UnitEvent::Finished { unit, state, .. } => {
                if *state == UnitState::Skipped {
                    tracing::debug!("{} is fresh", unit);
                }
                if let Some(pb) = &self.progress {
                    pb.inc(1);
                }
            }
            UnitEvent::Failed { error, .. } => {
                let rendered = error.to_diagnostic().format(self.color);
                match &self.progress {
                    Some(pb) => {
                        pb.println(rendered.trim_end());
                        pb.inc(1);
                    }
                    None => eprint!("{}", rendered),
                }
            }
            UnitEvent::Cancelled { unit, cause } => {
                self.status("Cancelled", &format!("{} (dependency `{}` failed)", unit, cause));
                if let Some(pb) = &self.progress {
                    pb.inc(1);
                }
            }
        }
    }

    /// Report a warning or note that is not tied to a unit build.
    pub fn diagnostic(&mut self, diag: &Diagnostic) {
        match self.format {
            MessageFormat::Json => self.emit_json(&BuildEvent::diagnostic(diag)),
            MessageFormat::Human => {
                let rendered = diag.format(self.color);
                match &self.progress {
                    Some(pb) => pb.println(rendered.trim_end()),
                    None => eprint!("{}", rendered),
                }
            }
        }
    }

    pub fn finish(&mut self, report: &BuildReport) {
        if let Some(pb) = self.progress.take() {
            pb.finish_and_clear();
        }
        match self.format {
            MessageFormat::Json => self.emit_json(&BuildEvent::finished(report)),
            MessageFormat::Human => {
                let summary = format!(
                    "{} built, {} fresh, {} failed, {} cancelled in {:.2}s",
                    report.count(UnitState::Built),
                    report.count(UnitState::Skipped),
                    report.count(UnitState::Failed),
                    report.count(UnitState::Cancelled),
                    report.duration.as_secs_f64()
                );
                self.status(if report.success() { "Finished" } else { "Failed" }, &summary);
            }
        }
        let _ = self.out.flush();
    }

    pub fn is_json(&self) -> bool {
        self.format == MessageFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::errors::BuildError;
    use crate::core::UnitId;
    use std::sync::{Arc, Mutex};

    /// A writer whose contents the test can read back.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_unit_events_as_json_lines() {
        let captured = Captured::default();
        let mut sink = EventSink::with_writer(MessageFormat::Json, Box::new(captured.clone()));
        let p1 = UnitId::new("s", "P1");
        let p2 = UnitId::new("s", "P2");
        let error = BuildError::MissingResult {
            unit: p1.clone(),
            path: "lib.so".into(),
        };

        sink.build_started(2, 4);
        sink.unit_event(&UnitEvent::Started(&p1));
        sink.unit_event(&UnitEvent::Building(&p1));
        sink.unit_event(&UnitEvent::Failed {
            unit: &p1,
            error: &error,
            duration: Duration::from_millis(1500),
        });
        sink.unit_event(&UnitEvent::Cancelled { unit: &p2, cause: &p1 });

        let lines = captured.lines();
        let reasons: Vec<_> = lines.iter().map(|l| l["reason"].as_str().unwrap()).collect();
        assert_eq!(reasons, vec!["build-started", "unit-started", "unit-failed", "unit-cancelled"]);
        assert_eq!(lines[2]["unit"], "s:P1");
        assert_eq!(lines[2]["duration_ms"], 1500);
        assert_eq!(lines[3]["cause"], "s:P1");
    }

    #[test]
    fn test_finished_event_counts() {
        let captured = Captured::default();
        let mut sink = EventSink::with_writer(MessageFormat::Json, Box::new(captured.clone()));
        let report = BuildReport {
            states: [
                (UnitId::new("s", "a"), UnitState::Built),
                (UnitId::new("s", "b"), UnitState::Skipped),
                (UnitId::new("s", "c"), UnitState::Skipped),
            ]
            .into_iter()
            .collect(),
            ledger: Vec::new(),
            errors: Vec::new(),
            duration: Duration::from_millis(42),
        };
        sink.finish(&report);

        let event = &captured.lines()[0];
        assert_eq!(event["reason"], "build-finished");
        assert_eq!(event["success"], true);
        assert_eq!(event["built"], 1);
        assert_eq!(event["skipped"], 2);
        assert_eq!(event["duration_ms"], 42);
    }

    #[test]
    fn test_diagnostic_event() {
        let diag = Diagnostic::warning("license `X` is not declared").with_context("in s:RUBY");
        let json = BuildEvent::diagnostic(&diag).to_json();
        assert!(json.contains("\"reason\":\"diagnostic\""));
        assert!(json.contains("\"level\":\"warning\""));
        assert!(json.contains("in s:RUBY"));
    }

    #[test]
    fn test_unit_finished_state_is_lowercase() {
        let unit = UnitId::new("s", "a");
        let event = BuildEvent::from_unit_event(&UnitEvent::Finished {
            unit: &unit,
            state: UnitState::Skipped,
            duration: Duration::ZERO,
        })
        .unwrap();
        assert!(event.to_json().contains("\"state\":\"skipped\""));
    }
}
