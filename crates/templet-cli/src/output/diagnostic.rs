//! Miette diagnostic wrapper for template errors.

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use templet::parser::{LocatedError, ParseError};
use templet::ErrorRecord;
use thiserror::Error;

/// A miette-compatible diagnostic for template errors.
///
/// Note: Fields are read by miette derive macros, not directly by code.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(templet::template))]
pub struct TempletDiagnostic {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    message: String,

    #[help]
    help: Option<String>,
}

impl TempletDiagnostic {
    /// Create a diagnostic from a syntax error found by checking a document.
    pub fn from_located(path: &Path, content: &str, error: &LocatedError) -> Self {
        let start = error.start.offset.min(content.len());
        let end = error.end.offset.clamp(start, content.len());
        let help = match &error.error {
            ParseError::Unclosed { expected, .. } => Some(format!("add the missing {expected}")),
            ParseError::Mismatched { expected, .. } => {
                Some(format!("close the inner {expected} first"))
            }
            ParseError::Syntax { .. } | ParseError::Subtemplate { .. } => None,
        };
        TempletDiagnostic {
            src: NamedSource::new(path.display().to_string(), content.to_string()),
            span: (start, (end - start).max(1)).into(),
            message: error.error.to_string(),
            help,
        }
    }

    /// Create a diagnostic from an error in a render result.
    pub fn from_record(path: &Path, content: &str, record: &ErrorRecord) -> Self {
        let start = offset_of(content, record.start_line, record.start_col);
        let end = offset_of(content, record.end_line, record.end_col).max(start);
        TempletDiagnostic {
            src: NamedSource::new(path.display().to_string(), content.to_string()),
            span: (start, (end - start).max(1)).into(),
            message: record.message.clone(),
            help: None,
        }
    }
}

/// Convert a 1-based line and character column to a byte offset, clamped to
/// the content.
fn offset_of(content: &str, line: usize, column: usize) -> usize {
    let line_start = content
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>()
        .min(content.len());
    content[line_start..]
        .char_indices()
        .nth(column.saturating_sub(1))
        .map_or(content.len(), |(at, _)| line_start + at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_count_characters_within_the_line() {
        let content = "héllo\nwörld";
        assert_eq!(offset_of(content, 1, 1), 0);
        assert_eq!(offset_of(content, 1, 3), 3);
        assert_eq!(offset_of(content, 2, 2), 8);
    }

    #[test]
    fn offsets_past_the_end_are_clamped() {
        assert_eq!(offset_of("ab", 9, 9), 2);
    }
}
