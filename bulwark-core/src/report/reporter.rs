use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use bulwark_model::{Report, ReportEvent, ReportMetadata};
use chrono::Utc;
use tracing::{error, info};

use crate::error::Result;

/// Accumulates the session's events and serializes the final report.
///
/// While a session runs the reporter is owned by the event bridge task, which
/// is its only writer. [`crate::bridge::EventBridge::stop`] hands it back once
/// the stream is drained, so serialization can only happen afterwards.
#[derive(Debug)]
pub struct Reporter {
    report: Report,
}

impl Reporter {
    pub fn new(metadata: ReportMetadata) -> Self {
        Self {
            report: Report::new(metadata),
        }
    }

    /// Append-only intake.
    pub fn record(&mut self, event: ReportEvent) {
        self.report.push(event);
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.report.events
    }

    pub fn len(&self) -> usize {
        self.report.len()
    }

    pub fn is_empty(&self) -> bool {
        self.report.is_empty()
    }

    pub fn set_targets(&mut self, targets: Vec<String>) {
        self.report.metadata.targets = targets;
    }

    pub fn mark_finished(&mut self) {
        self.report.metadata.finished_at = Some(Utc::now());
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, &self.report)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Creates `path` when missing, otherwise truncates and rewrites it.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Writes the report to `stdout` and then to `path`. A failure on one
    /// destination is logged and never prevents the other.
    pub fn publish<W: Write>(&self, stdout: W, path: &Path) -> PublishOutcome {
        let stdout_written = match self.write_to(stdout) {
            Ok(()) => true,
            Err(err) => {
                error!(target: "bulwark::report", error = %err, "failed to write report to stdout");
                false
            }
        };

        let file_written = match self.write_file(path) {
            Ok(()) => {
                info!(
                    target: "bulwark::report",
                    path = %path.display(),
                    events = self.len(),
                    "report written"
                );
                true
            }
            Err(err) => {
                error!(
                    target: "bulwark::report",
                    path = %path.display(),
                    error = %err,
                    "failed to write report file"
                );
                false
            }
        };

        PublishOutcome {
            stdout_written,
            file_written,
        }
    }

    pub fn exit_decision(&self, requested: i32) -> ExitDecision {
        ExitDecision {
            requested,
            has_findings: !self.is_empty(),
        }
    }
}

/// Which report destinations were written successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub stdout_written: bool,
    pub file_written: bool,
}

/// Requested exit code paired with whether the report holds any finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDecision {
    pub requested: i32,
    pub has_findings: bool,
}

impl ExitDecision {
    pub fn code(&self) -> i32 {
        if self.requested == 0 || !self.has_findings {
            0
        } else {
            self.requested
        }
    }
}
