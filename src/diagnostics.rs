//! Diagnostic sink: typed `{WARNING, ERROR, FATAL, INTERNAL}`
//! reports with a source tag and formatted message, lifted into a
//! capability object so tests can inject a capturing fake instead of
//! asserting on stderr text.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
    Internal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

pub trait DiagnosticSink {
    fn report(&self, severity: Severity, source: &str, message: &str);
}

/// Default sink: routes through the `log` facade at a level matching
/// severity.
pub struct LogDiagnosticSink;

impl DiagnosticSink for LogDiagnosticSink {
    fn report(&self, severity: Severity, source: &str, message: &str) {
        match severity {
            Severity::Warning => log::warn!("{source}: {message}"),
            Severity::Error | Severity::Fatal => log::error!("{source}: {message}"),
            Severity::Internal => log::error!("{source}: internal error: {message}"),
        }
    }
}

/// A capturing fake for tests.
#[cfg(test)]
pub struct CapturingDiagnosticSink {
    pub reports: std::cell::RefCell<Vec<(Severity, String, String)>>,
}

#[cfg(test)]
impl CapturingDiagnosticSink {
    pub fn new() -> Self {
        CapturingDiagnosticSink { reports: std::cell::RefCell::new(Vec::new()) }
    }
}

#[cfg(test)]
impl DiagnosticSink for CapturingDiagnosticSink {
    fn report(&self, severity: Severity, source: &str, message: &str) {
        self.reports.borrow_mut().push((severity, source.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_sink_records_reports() {
        let sink = CapturingDiagnosticSink::new();
        sink.report(Severity::Warning, "foo.img", "surplus sectors marked unused");
        let reports = sink.reports.borrow();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Warning);
        assert_eq!(reports[0].1, "foo.img");
    }
}
