//! Best-effort sinks for informational and error text.

/// A pair of free-form text sinks consumed by the samplers.
///
/// Writes are best-effort: implementations must not block the sampling loop
/// and failures go unreported.
pub trait DiagnosticWriter {
    fn info(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Discards all output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullWriter;

impl DiagnosticWriter for NullWriter {}

/// Prints informational text to stdout and errors to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdWriter;

impl DiagnosticWriter for StdWriter {
    fn info(&self, msg: &str) {
        println!("{msg}");
    }

    fn error(&self, msg: &str) {
        eprintln!("{msg}");
    }
}
