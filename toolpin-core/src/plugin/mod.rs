//! Installed plugins as seen by the layers above the update pipeline

pub mod registry;
pub mod runtime;

pub use registry::{is_compatible, PluginError, PluginHandle, PluginRegistry, PLUGIN_API_VERSION};
pub use runtime::{
    Attachment, Diagnostic, DiagnosticBuffer, DiagnosticSink, ExitStatus, OutputSink,
    ReportStatus, Runnable, Severity, SinkError,
};
