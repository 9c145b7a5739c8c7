//! Error types for the interpreter.

use serde::Serialize;
use strsim::levenshtein;
use thiserror::Error;

use crate::parser::{LocatedError, Position};

/// What kind of problem an error record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    General,
    /// A remote context or sub-template could not be loaded.
    Loading,
}

/// A recoverable error recorded while interpreting a template.
///
/// The node that failed renders as `ERROR: message` and interpretation
/// continues.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateError {
    pub kind: ErrorKind,
    pub start: Position,
    pub end: Position,
    pub message: String,
}

impl TemplateError {
    pub fn general(start: Position, end: Position, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::General,
            start,
            end,
            message: message.into(),
        }
    }
}

impl From<LocatedError> for TemplateError {
    fn from(located: LocatedError) -> Self {
        TemplateError::general(located.start, located.end, located.error.to_string())
    }
}

/// An entry of the user-visible debug log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugEntry {
    pub level: u8,
    pub text: String,
}

/// An error raised by a method or annotation call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    /// No built-in or host method has this name.
    #[error("unknown method '{name}'{}", did_you_mean(suggestions))]
    UnknownMethod {
        name: String,
        suggestions: Vec<String>,
    },

    /// Wrong number of arguments.
    #[error("{name}() expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// An argument has an unusable value.
    #[error("{name}(): {message}")]
    InvalidArgument { name: String, message: String },

    /// `Assert(expected)` did not hold.
    #[error("{message}")]
    AssertionFailed { message: String },
}

/// An error returned by a [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Nothing exists at this location.
    #[error("'{url}' was not found")]
    NotFound { url: String },

    /// The location exists but could not be read.
    #[error("failed to load '{url}': {message}")]
    Failed { url: String, message: String },
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean: {}?", suggestions.join(", "))
    }
}

/// Names from `available` close to `name`, closest first, at most three.
///
/// Short names (up to three characters) allow one edit, longer names two.
pub fn compute_suggestions(name: &str, available: &[&str]) -> Vec<String> {
    let max_distance = if name.chars().count() <= 3 { 1 } else { 2 };
    let mut scored: Vec<(usize, &str)> = available
        .iter()
        .map(|candidate| (levenshtein(name, candidate), *candidate))
        .filter(|&(distance, _)| distance > 0 && distance <= max_distance)
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(3)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}
