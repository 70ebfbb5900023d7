//!
//! Diagnostic Module - Rich Error Reporting
//!
//! Renders surface errors with source context using miette. Duplicate
//! declarations show both sites: the offending one as the primary label,
//! the earlier one as a secondary label.
//!
//! Usage:
//!   let reporter = DiagnosticReporter::new("audio_engine.toml", &source);
//!   reporter.report_errors(&errors);
//!

use std::ops::Range;

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, LabeledSpan, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::error::GenError;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SurfaceDiagnostic {
    message: String,
    src: NamedSource<String>,
    span: SourceSpan,
    label: String,
    help_text: Option<String>,
    related: Option<SourceSpan>,
}

impl Diagnostic for SurfaceDiagnostic {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_primary_with_span(Some(self.label.clone()), self.span);
        let related = self
            .related
            .map(|span| LabeledSpan::new_with_span(Some("first declared here".to_string()), span));
        Some(Box::new(std::iter::once(primary).chain(related)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }
}

impl SurfaceDiagnostic {
    pub fn from_gen_error(err: &GenError, name: &str, source: &str) -> Self {
        let span = clamp(err.span(), source.len());
        let (line, col) = line_col(source, span.start);
        let (label, help) = error_details(err);

        Self {
            message: format!("{} at {}:{}", err, line, col),
            src: NamedSource::new(name, source.to_string()),
            span: to_source_span(&span),
            label,
            help_text: help,
            related: err
                .first_span()
                .map(|first| to_source_span(&clamp(first, source.len()))),
        }
    }
}

fn clamp(span: Range<usize>, len: usize) -> Range<usize> {
    let start = span.start.min(len);
    start..span.end.clamp(start, len)
}

fn to_source_span(span: &Range<usize>) -> SourceSpan {
    (span.start, span.end - span.start).into()
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
    (line, col)
}

fn error_details(err: &GenError) -> (String, Option<String>) {
    match err {
        GenError::DuplicateSymbol { .. } => (
            "symbol already bound".to_string(),
            Some("set `symbol` on one of the methods to the name the library exports".to_string()),
        ),
        GenError::DuplicateMethod { .. } => (
            "already declared".to_string(),
            Some("rename or remove one of the methods".to_string()),
        ),
        GenError::DuplicateType { .. } => (
            "already declared".to_string(),
            Some("handles, structs and callbacks share one namespace".to_string()),
        ),
        GenError::DuplicateMember { .. } => ("declared twice".to_string(), None),
        GenError::UnknownType { .. } => (
            "unknown type".to_string(),
            Some("declare it under [handles], [structs] or [callbacks]".to_string()),
        ),
        GenError::MalformedType { reason, .. } => (reason.clone(), None),
        GenError::ByReferenceParameter { .. } => (
            "passed by reference".to_string(),
            Some("use ptr<T> or ptr_mut<T>; references are only allowed in callback parameters".to_string()),
        ),
        GenError::ByReferenceReturn { .. } => (
            "returned by reference".to_string(),
            Some("return ptr<T> or ptr_mut<T> instead".to_string()),
        ),
        GenError::NonBlittable { reason, .. } => (
            reason.clone(),
            Some("only primitives, bool, handles, pointers, callbacks and blittable structs cross the boundary".to_string()),
        ),
        GenError::RecursiveStruct { .. } => (
            "contains itself by value".to_string(),
            Some("hold the inner struct through ptr<T> or ptr_mut<T>".to_string()),
        ),
        GenError::VoidParameter { .. } => (
            "void parameter".to_string(),
            Some("remove the parameter".to_string()),
        ),
        GenError::TooManyParameters { max, .. } => (
            "too many parameters".to_string(),
            Some(format!(
                "native calls take at most {} parameters; pass the rest through a ptr<T> to a struct",
                max
            )),
        ),
        GenError::InvalidName { reason, .. } => (reason.clone(), None),
        GenError::InvalidSymbol { reason, .. } => (reason.clone(), None),
        GenError::InvalidRelease { reason, .. } => (reason.clone(), None),
        GenError::Parse { message, .. } => (message.clone(), None),
    }
}

pub struct DiagnosticReporter<'a> {
    name: &'a str,
    source: &'a str,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(name: &'a str, source: &'a str) -> Self {
        Self { name, source }
    }

    pub fn report_error(&self, err: &GenError) {
        let diag = SurfaceDiagnostic::from_gen_error(err, self.name, self.source);
        let report = Report::new(diag);
        eprintln!("{:?}", report);
    }

    pub fn report_errors(&self, errors: &[GenError]) {
        for err in errors {
            self.report_error(err);
        }
    }

    /// Renders all errors without color, for build-script panics and tests.
    pub fn render(&self, errors: &[GenError]) -> String {
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
        let mut out = String::new();
        for err in errors {
            let diag = SurfaceDiagnostic::from_gen_error(err, self.name, self.source);
            if handler.render_report(&mut out, &diag).is_err() {
                out.push_str(&diag.message);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "[surface]\nname = \"native\"\n\n[[methods]]\nname = \"Open\"\n\n[[methods]]\nname = \"Reopen\"\nsymbol = \"NATIVE_Open\"\n";

    fn span_of(text: &str) -> Range<usize> {
        let start = SOURCE.find(text).expect("text in source");
        start..start + text.len()
    }

    #[test]
    fn test_line_col() {
        assert_eq!(line_col(SOURCE, 0), (1, 1));
        assert_eq!(line_col(SOURCE, 10), (2, 1));
        assert_eq!(line_col(SOURCE, 17), (2, 8));
    }

    #[test]
    fn test_duplicate_symbol_has_both_sites() {
        let err = GenError::DuplicateSymbol {
            symbol: "NATIVE_Open".to_string(),
            span: span_of("\"NATIVE_Open\""),
            first: span_of("\"Open\""),
        };
        let diag = SurfaceDiagnostic::from_gen_error(&err, "native.toml", SOURCE);
        assert!(diag.message.starts_with("duplicate native symbol 'NATIVE_Open' at 9:"));
        let labels: Vec<_> = diag.labels().expect("labels").collect();
        assert_eq!(labels.len(), 2);
        assert!(labels[0].primary());
        assert_eq!(labels[1].label(), Some("first declared here"));
    }

    #[test]
    fn test_render_contains_message_and_help() {
        let err = GenError::UnknownType {
            name: "Strem".to_string(),
            span: span_of("\"Open\""),
        };
        let rendered = DiagnosticReporter::new("native.toml", SOURCE).render(&[err]);
        assert!(rendered.contains("unknown type 'Strem'"));
        assert!(rendered.contains("declare it under [handles]"));
    }

    #[test]
    fn test_out_of_range_span_is_clamped() {
        let err = GenError::Parse {
            message: "unexpected end of file".to_string(),
            span: Some(500..510),
        };
        let diag = SurfaceDiagnostic::from_gen_error(&err, "native.toml", SOURCE);
        assert_eq!(diag.span.offset(), SOURCE.len());
        assert_eq!(diag.span.len(), 0);
    }
}
