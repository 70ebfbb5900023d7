///
/// Generator error types.
///
/// GenError covers every reason a surface is rejected. Analysis collects
/// all of them for a surface before giving up, and any error blocks code
/// emission. GenerateError wraps a rejected surface (with its source text,
/// for rendering) and file-system failures.
///

use std::ops::Range;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenError {
    #[error("duplicate native symbol '{symbol}'")]
    DuplicateSymbol {
        symbol: String,
        span: Range<usize>,
        first: Range<usize>,
    },

    #[error("duplicate method '{name}'")]
    DuplicateMethod {
        name: String,
        span: Range<usize>,
        first: Range<usize>,
    },

    #[error("duplicate type '{name}'")]
    DuplicateType {
        name: String,
        span: Range<usize>,
        first: Range<usize>,
    },

    #[error("duplicate member '{member}' in '{owner}'")]
    DuplicateMember {
        owner: String,
        member: String,
        span: Range<usize>,
    },

    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Range<usize> },

    #[error("malformed type '{text}': {reason}")]
    MalformedType {
        text: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("parameter '{param}' of '{method}' is passed by reference ({ty})")]
    ByReferenceParameter {
        method: String,
        param: String,
        ty: String,
        span: Range<usize>,
    },

    #[error("'{method}' returns a reference ({ty})")]
    ByReferenceReturn {
        method: String,
        ty: String,
        span: Range<usize>,
    },

    #[error("'{path}' is not blittable: {reason}")]
    NonBlittable {
        path: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("struct '{name}' contains itself by value ({cycle})")]
    RecursiveStruct {
        name: String,
        cycle: String,
        span: Range<usize>,
    },

    #[error("parameter '{param}' of '{owner}' has type void")]
    VoidParameter {
        owner: String,
        param: String,
        span: Range<usize>,
    },

    #[error("'{owner}' takes {count} parameters, at most {max} are supported")]
    TooManyParameters {
        owner: String,
        count: usize,
        max: usize,
        span: Range<usize>,
    },

    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("invalid native symbol '{symbol}': {reason}")]
    InvalidSymbol {
        symbol: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("invalid release method '{method}' for handle '{handle}': {reason}")]
    InvalidRelease {
        handle: String,
        method: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("failed to parse surface: {message}")]
    Parse {
        message: String,
        span: Option<Range<usize>>,
    },
}

impl GenError {
    pub fn span(&self) -> Range<usize> {
        match self {
            GenError::DuplicateSymbol { span, .. }
            | GenError::DuplicateMethod { span, .. }
            | GenError::DuplicateType { span, .. }
            | GenError::DuplicateMember { span, .. }
            | GenError::UnknownType { span, .. }
            | GenError::MalformedType { span, .. }
            | GenError::ByReferenceParameter { span, .. }
            | GenError::ByReferenceReturn { span, .. }
            | GenError::NonBlittable { span, .. }
            | GenError::RecursiveStruct { span, .. }
            | GenError::VoidParameter { span, .. }
            | GenError::TooManyParameters { span, .. }
            | GenError::InvalidName { span, .. }
            | GenError::InvalidSymbol { span, .. }
            | GenError::InvalidRelease { span, .. } => span.clone(),
            GenError::Parse { span, .. } => span.clone().unwrap_or(0..0),
        }
    }

    /// Location of the earlier declaration a duplicate collides with.
    pub fn first_span(&self) -> Option<Range<usize>> {
        match self {
            GenError::DuplicateSymbol { first, .. }
            | GenError::DuplicateMethod { first, .. }
            | GenError::DuplicateType { first, .. } => Some(first.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("surface '{name}' is invalid ({} error(s))", errors.len())]
    Invalid {
        name: String,
        source_text: String,
        errors: Vec<GenError>,
    },
}
