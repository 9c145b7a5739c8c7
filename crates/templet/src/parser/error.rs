//! Parse error types for templates.

use thiserror::Error;

use super::ast::{LineIndex, Position, Span};

/// An error found while parsing or extracting a template.
///
/// Parsing is error tolerant: errors are collected alongside the tree and
/// the offending construct is kept as an error node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A malformed expression inside braces.
    #[error("{message}")]
    Syntax { span: Span, message: String },

    /// An opening delimiter without its closing partner.
    #[error("missing closing {expected}")]
    Unclosed { span: Span, expected: &'static str },

    /// A closing delimiter that does not match the innermost opening one.
    #[error("unexpected '{found}', expected closing {expected}")]
    Mismatched {
        span: Span,
        found: String,
        expected: &'static str,
    },

    /// A malformed sub-template block.
    #[error("invalid sub-template: {message}")]
    Subtemplate { span: Span, message: String },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Syntax { span, .. }
            | ParseError::Unclosed { span, .. }
            | ParseError::Mismatched { span, .. }
            | ParseError::Subtemplate { span, .. } => *span,
        }
    }

    /// Shift the span of an error found in a sub-slice starting at `delta`.
    pub fn offset_by(self, delta: usize) -> ParseError {
        let shift = |span: Span| Span::new(span.start + delta, span.end + delta);
        match self {
            ParseError::Syntax { span, message } => ParseError::Syntax {
                span: shift(span),
                message,
            },
            ParseError::Unclosed { span, expected } => ParseError::Unclosed {
                span: shift(span),
                expected,
            },
            ParseError::Mismatched {
                span,
                found,
                expected,
            } => ParseError::Mismatched {
                span: shift(span),
                found,
                expected,
            },
            ParseError::Subtemplate { span, message } => ParseError::Subtemplate {
                span: shift(span),
                message,
            },
        }
    }
}

/// A parse error located in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedError {
    pub error: ParseError,
    pub start: Position,
    pub end: Position,
}

impl LocatedError {
    /// Locate an error whose span indexes `index`'s text, which itself starts
    /// at `origin` in the document.
    pub fn locate(error: ParseError, index: &LineIndex, origin: Position) -> Self {
        let span = error.span();
        Self {
            start: index.position(span.start).shifted(origin),
            end: index.position(span.end).shifted(origin),
            error,
        }
    }
}
