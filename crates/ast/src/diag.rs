use std::fmt;

use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// The node the message is about.
    pub node: Option<Node>,
}

/// Collects the diagnostics of one unit and forwards each to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    unit: String,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            entries: Vec::new(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Record a diagnostic. An entry identical to one already recorded is
    /// dropped, since fixpoint rules may revisit the same spot every sweep.
    pub fn report(&mut self, severity: Severity, message: impl Into<String>, node: Option<&Node>) {
        let entry = Diagnostic {
            severity,
            message: message.into(),
            node: node.cloned(),
        };
        if self.entries.contains(&entry) {
            return;
        }
        match severity {
            Severity::Info => tracing::info!(unit = %self.unit, "{}", entry.message),
            Severity::Warning => tracing::warn!(unit = %self.unit, "{}", entry.message),
            Severity::Error | Severity::Fatal => {
                tracing::error!(unit = %self.unit, severity = %severity, "{}", entry.message)
            }
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Severity::Info, message, None);
    }

    pub fn warning(&mut self, message: impl Into<String>, node: Option<&Node>) {
        self.report(Severity::Warning, message, node);
    }

    pub fn error(&mut self, message: impl Into<String>, node: Option<&Node>) {
        self.report(Severity::Error, message, node);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity >= Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_dropped() {
        let mut diags = Diagnostics::new("scr_test");
        diags.error("cannot find end of switch", Some(&Node::Exit));
        diags.error("cannot find end of switch", Some(&Node::Exit));
        diags.warning("removed unreachable block", None);
        assert_eq!(diags.entries().len(), 2);
        assert_eq!(diags.count(Severity::Error), 1);
        assert!(diags.has_errors());
        assert_eq!(diags.entries()[0].node, Some(Node::Exit));
    }
}
