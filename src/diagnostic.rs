use std::fmt;

use crate::span::Span;

/// A lowering diagnostic.
///
/// Every diagnostic raised by the lowering passes is fatal: one malformed
/// or unsupported instruction aborts the whole run.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// What went wrong, independent of where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A node reached a pass that an earlier pass should have removed.
    InternalConsistency,
    /// A node kind or built-in that is acknowledged but not lowered yet.
    Unimplemented,
    /// A structural assumption did not hold (e.g. a scalar result).
    Invariant,
    /// Invalid lowering configuration.
    Config,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::InternalConsistency => write!(f, "internal consistency"),
            DiagnosticKind::Unimplemented => write!(f, "unimplemented"),
            DiagnosticKind::Invariant => write!(f, "invariant violated"),
            DiagnosticKind::Config => write!(f, "configuration"),
        }
    }
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn internal(message: String, span: Span) -> Self {
        Self::error(DiagnosticKind::InternalConsistency, message, span)
    }

    pub fn unimplemented(message: String, span: Span) -> Self {
        Self::error(DiagnosticKind::Unimplemented, message, span)
    }

    pub fn invariant(message: String, span: Span) -> Self {
        Self::error(DiagnosticKind::Invariant, message, span)
    }

    pub fn config(message: String) -> Self {
        Self::error(DiagnosticKind::Config, message, Span::dummy())
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Attach the instruction the diagnostic was raised for.
    ///
    /// Passes raise diagnostics without knowing which instruction they run
    /// on; the pipeline adds it on the way out. Applied once.
    pub fn in_instruction(self, name: &str, span: Span) -> Self {
        let note = format!("in instruction `{}`", name);
        if self.notes.contains(&note) {
            return self;
        }
        let span = self.span.or(span);
        let mut d = self.with_note(note);
        d.span = span;
        d
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let start = (self.span.start as usize).min(source.len());
        let end = (self.span.end as usize).clamp(start, source.len());

        let mut report = Report::build(kind, filename, start)
            .with_message(format!("{}: {}", self.kind, self.message))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        let _ = report.finish().eprint((filename, Source::from(source)));
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let span = Span::new(0, 10, 15);
        let d = Diagnostic::internal("constant reached op lowering".to_string(), span);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.kind, DiagnosticKind::InternalConsistency);
        assert_eq!(d.message, "constant reached op lowering");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_kind_constructors() {
        assert_eq!(
            Diagnostic::unimplemented("let".into(), Span::dummy()).kind,
            DiagnosticKind::Unimplemented
        );
        assert_eq!(
            Diagnostic::invariant("scalar".into(), Span::dummy()).kind,
            DiagnosticKind::Invariant
        );
        assert_eq!(
            Diagnostic::config("bad width".into()).kind,
            DiagnosticKind::Config
        );
    }

    #[test]
    fn test_in_instruction_applied_once() {
        let d = Diagnostic::invariant("x".into(), Span::dummy())
            .in_instruction("ADD", Span::new(0, 2, 5))
            .in_instruction("ADD", Span::new(0, 2, 5));
        assert_eq!(d.notes, vec!["in instruction `ADD`".to_string()]);
        assert_eq!(d.span, Span::new(0, 2, 5));
    }

    #[test]
    fn test_in_instruction_keeps_node_span() {
        let d = Diagnostic::invariant("x".into(), Span::new(0, 7, 9))
            .in_instruction("ADD", Span::new(0, 2, 5));
        assert_eq!(d.span, Span::new(0, 7, 9));
    }

    #[test]
    fn test_display_includes_notes_and_help() {
        let d = Diagnostic::unimplemented("select not lowered".into(), Span::dummy())
            .with_note("node n4 (select)".into())
            .with_help("split the select into an if region".into());
        let text = d.to_string();
        assert!(text.starts_with("unimplemented: select not lowered"));
        assert!(text.contains("note: node n4 (select)"));
        assert!(text.contains("help: split the select"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "instruction ADD : R = X(rd) := X(rs1) + X(rs2)\n";
        let d = Diagnostic::internal("raw parameter".to_string(), Span::new(0, 20, 45))
            .with_note("in instruction `ADD`".to_string());
        d.render("rv64i.vadl", source);
    }

    #[test]
    fn test_render_out_of_range_span_does_not_panic() {
        let d = Diagnostic::invariant("width".to_string(), Span::new(0, 100, 200));
        render_diagnostics(&[d], "short.vadl", "x");
    }
}
