//! Renders an [`ExpectationReport`] as a source-annotated diagnostic,
//! grounded on the teacher's `DiagnosticsPrinter` builder: a small
//! `annotate-snippets` wrapper that knows how to turn this crate's own
//! failure data into a readable report without the engine itself taking a
//! rendering dependency.
//!
//! spec.md §7: on parse failure, the highest-offset expectations are the
//! whole error — there is no recovery and no secondary diagnostics, so
//! this only ever prints one snippet, with one annotation per distinct
//! expectation message at that offset.

use std::fmt::{self, Write};

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};

use crate::engine::ExpectationReport;

pub struct DiagnosticsPrinter<'r, 's> {
    report: &'r ExpectationReport,
    source: Option<&'s str>,
    path: Option<&'s str>,
    colored: bool,
}

impl<'r, 's> DiagnosticsPrinter<'r, 's> {
    pub fn new(report: &'r ExpectationReport) -> Self {
        Self { report, source: None, path: None, colored: false }
    }

    pub fn source(mut self, source: &'s str) -> Self {
        self.source = Some(source);
        self
    }

    pub fn path(mut self, path: &'s str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn colored(mut self, value: bool) -> Self {
        self.colored = value;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.format(&mut out).expect("writing to a String never fails");
        out
    }

    pub fn format(&self, w: &mut impl Write) -> fmt::Result {
        let Some(source) = self.source else {
            return self.format_plain(w);
        };
        let path = self.path.unwrap_or("<input>");
        let offset = self.report.highest_offset as usize;
        let messages: Vec<&str> = self.report.entries.iter().map(|e| e.msg).collect();
        let label = if messages.is_empty() {
            "unexpected input".to_owned()
        } else {
            format!("expected {}", messages.join(", "))
        };
        let end = (offset + 1).min(source.len());
        let start = offset.min(end);
        let snippet = Snippet::source(source)
            .path(path)
            .annotation(AnnotationKind::Primary.span(start..end).label(&label));
        let group = Group::with_title(Level::ERROR.title("parse error")).element(snippet);
        let renderer = if self.colored { Renderer::styled() } else { Renderer::plain() };
        writeln!(w, "{}", renderer.render(&[group]))
    }

    fn format_plain(&self, w: &mut impl Write) -> fmt::Result {
        writeln!(w, "parse error at byte offset {}", self.report.highest_offset)?;
        for entry in &self.report.entries {
            write!(w, "  expected {}", entry.msg)?;
            if let Some((name, cursor)) = entry.stack.last() {
                write!(w, " while parsing `{name}` ({}:{})", cursor.line, cursor.column)?;
            }
            writeln!(w)?;
            for (name, cursor) in entry.stack.iter().rev() {
                writeln!(w, "    in `{name}` at {}:{}", cursor.line, cursor.column)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExpectationRecord;
    use tinycopoos_core::chars::Cursor;

    fn cursor(offset: u32) -> Cursor {
        Cursor { offset, line: 1, column: offset + 1 }
    }

    #[test]
    fn plain_render_lists_expectations_and_stack() {
        let report = ExpectationReport {
            highest_offset: 4,
            entries: vec![ExpectationRecord {
                stack: vec![("expr", cursor(0)), ("cast_expr", cursor(4))],
                msg: "operand",
            }],
        };
        let printer = DiagnosticsPrinter::new(&report);
        let rendered = printer.render();
        assert!(rendered.contains("byte offset 4"));
        assert!(rendered.contains("operand"));
        assert!(rendered.contains("cast_expr"));
    }

    #[test]
    fn source_render_includes_the_snippet() {
        let report = ExpectationReport {
            highest_offset: 4,
            entries: vec![ExpectationRecord { stack: vec![("cast_expr", cursor(4))], msg: "operand" }],
        };
        let printer = DiagnosticsPrinter::new(&report).source("a * ;").path("input.tc");
        let rendered = printer.render();
        assert!(rendered.contains("operand"));
    }
}
