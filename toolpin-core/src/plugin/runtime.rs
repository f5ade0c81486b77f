//! Shapes shared with the layers that run installed tools
//!
//! A scheduler drives [`Runnable`] units and a report writer consumes a
//! [`DiagnosticSink`]. Neither is implemented here; the types only pin down
//! the boundary so those layers can be built against the core unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status of a runnable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);
    pub const FAILURE: ExitStatus = ExitStatus(1);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// Receives the console output of a running unit
pub trait OutputSink {
    fn write(&mut self, text: &str);

    fn writeln(&mut self, line: &str) {
        self.write(line);
        self.write("\n");
    }
}

impl OutputSink for String {
    fn write(&mut self, text: &str) {
        self.push_str(text);
    }
}

/// A unit of work the scheduler can run
pub trait Runnable {
    fn run(&mut self, output: &mut dyn OutputSink) -> ExitStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            line: None,
            source: None,
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }
}

/// A file produced by a tool run, kept alongside its report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
}

/// Final state of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Passed,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Report already finished with status {0:?}")]
    Finished(ReportStatus),
}

/// Collects diagnostics and attachments of one tool run
pub trait DiagnosticSink {
    fn add_diagnostic(&mut self, diagnostic: Diagnostic) -> Result<(), SinkError>;
    fn add_attachment(&mut self, attachment: Attachment) -> Result<(), SinkError>;
    fn finish(&mut self, status: ReportStatus);
}

/// In-memory [`DiagnosticSink`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticBuffer {
    pub diagnostics: Vec<Diagnostic>,
    pub attachments: Vec<Attachment>,
    pub status: Option<ReportStatus>,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest severity seen so far
    pub fn max_severity(&self) -> Option<Severity> {
        self.diagnostics.iter().map(|d| d.severity).max()
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        match self.status {
            Some(status) => Err(SinkError::Finished(status)),
            None => Ok(()),
        }
    }
}

impl DiagnosticSink for DiagnosticBuffer {
    fn add_diagnostic(&mut self, diagnostic: Diagnostic) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.diagnostics.push(diagnostic);
        Ok(())
    }

    fn add_attachment(&mut self, attachment: Attachment) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.attachments.push(attachment);
        Ok(())
    }

    fn finish(&mut self, status: ReportStatus) {
        self.status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    impl Runnable for Echo {
        fn run(&mut self, output: &mut dyn OutputSink) -> ExitStatus {
            output.writeln(self.0);
            ExitStatus::SUCCESS
        }
    }

    #[test]
    fn test_runnable_writes_to_sink() {
        let mut output = String::new();
        let status = Echo("hello").run(&mut output);
        assert!(status.is_success());
        assert_eq!(output, "hello\n");
    }

    #[test]
    fn test_buffer_closes_on_finish() {
        let mut buffer = DiagnosticBuffer::new();
        buffer
            .add_diagnostic(Diagnostic::new(Severity::Warning, "unused variable").at("src/a.php", Some(3)))
            .unwrap();
        buffer
            .add_diagnostic(Diagnostic::new(Severity::Info, "done"))
            .unwrap();
        buffer.finish(ReportStatus::Failed);

        assert_eq!(buffer.max_severity(), Some(Severity::Warning));
        assert_eq!(
            buffer.add_attachment(Attachment {
                name: "log".to_string(),
                path: PathBuf::from("/tmp/log"),
            }),
            Err(SinkError::Finished(ReportStatus::Failed))
        );
    }
}
