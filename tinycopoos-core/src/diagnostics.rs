//! Diagnostic collection, grounded on the teacher's
//! `Diagnostics`/`DiagnosticBuilder` builder pattern: callers build up a
//! `Diagnostic` with a small fluent API and `.emit()` it into the shared
//! collection, rather than constructing and pushing a struct literal by hand.
//!
//! This crate only collects diagnostics; rendering them against source text
//! (spec.md §7's expectation-failure message, "expected one of: X, Y or Z")
//! is `tinycopoos-compiler`'s `diagnostics_printer` module, built on
//! `annotate-snippets`.

use crate::chars::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Accumulates diagnostics for a single compile. Never panics or fails a
/// compile by itself — whether a diagnostic is fatal is a decision made by
/// the caller (the parser treats any emitted `Severity::Error` as grounds to
/// report overall failure; see spec.md §7's distinction between user-input
/// errors and the dedicated `CastFailure` programming-error category, which
/// bypasses this collection entirely and panics).
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, at: Cursor, message: impl Into<String>) -> &mut Diagnostic {
        self.push(Severity::Error, at, message)
    }

    pub fn warning(&mut self, at: Cursor, message: impl Into<String>) -> &mut Diagnostic {
        self.push(Severity::Warning, at, message)
    }

    fn push(&mut self, severity: Severity, at: Cursor, message: impl Into<String>) -> &mut Diagnostic {
        self.entries.push(Diagnostic {
            severity,
            message: message.into(),
            offset: at.offset,
            line: at.line,
            column: at.column,
        });
        self.entries.last_mut().expect("just pushed")
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_marks_collection_as_failed() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.error(Cursor::start(), "expected one of: identifier, '('");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.warning(Cursor::start(), "unused task parameter");
        assert!(!diags.has_errors());
    }
}
