//! Sub-template extraction.
//!
//! A template may end with a `Subtemplates:` section holding named blocks:
//!
//! ```text
//! Subtemplates:
//! {#Row:[{.} {name}].@BulletStyle('I.')}
//! ```
//!
//! Extraction splits that section off the document, recursing into each
//! block body for its own nested section. Malformed blocks are reported and
//! skipped; they never abort the rest of the document.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};
use winnow::combinator::delimited;
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::ast::{LineIndex, Position, Span};
use super::error::{LocatedError, ParseError};
use super::lexer::{
    Token, TokenKind, is_ident_cont, is_ident_start, matching_close, tokenize,
};

/// Named sub-templates in definition order.
pub type SubtemplateMap = IndexMap<String, Rc<SubtemplateRecord>>;

/// A named sub-template.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtemplateRecord {
    pub name: String,
    /// The `[...]` body plus any method suffix, nested section removed.
    pub raw: String,
    /// Document position of the first character of `raw`.
    pub origin: Position,
    /// Document position of the block's opening brace.
    pub start: Position,
    /// Document position just past the block's closing brace.
    pub end: Position,
    /// Sub-templates defined inside this one.
    pub nested: SubtemplateMap,
}

/// The result of splitting sub-templates out of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// The document with its sub-template section removed. Malformed blocks
    /// are appended as visible `ERROR:` lines.
    pub residual: String,
    pub subtemplates: SubtemplateMap,
    pub errors: Vec<LocatedError>,
}

/// Split the `Subtemplates:` section off `text`, which starts at `origin` in
/// the document.
pub fn extract(text: &str, origin: Position) -> Extraction {
    let tokens = tokenize(text);
    let Some(marker) = tokens.iter().position(|t| t.kind == TokenKind::Subtemplates) else {
        return Extraction {
            residual: text.to_string(),
            ..Extraction::default()
        };
    };

    let index = LineIndex::new(text);
    let mut extraction = Extraction {
        residual: text[..tokens[marker].span.start].trim_end().to_string(),
        ..Extraction::default()
    };
    let mut failures = Vec::new();
    let mut i = marker + 1;

    while let Some(token) = tokens.get(i) {
        match token.kind {
            TokenKind::Newline | TokenKind::Spaces | TokenKind::Comment => i += 1,
            TokenKind::LBrace => match matching_close(&tokens, i) {
                Ok(close) => {
                    let block = Block {
                        text,
                        index: &index,
                        origin,
                        open: &tokens[i],
                        close: &tokens[close],
                    };
                    match block.record() {
                        Ok((record, nested_errors)) => {
                            extraction.errors.extend(nested_errors);
                            insert(&mut extraction.subtemplates, record);
                        }
                        Err(error) => failures.push(error),
                    }
                    i = close + 1;
                }
                Err(error) => {
                    failures.push(error);
                    match next_block(&tokens, i + 1) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
            },
            _ => {
                let line_end = tokens[i..]
                    .iter()
                    .position(|t| t.kind == TokenKind::Newline)
                    .map_or(tokens.len(), |n| i + n);
                let end = tokens.get(line_end).map_or(text.len(), |t| t.span.start);
                failures.push(ParseError::Subtemplate {
                    span: Span::new(token.span.start, end),
                    message: format!("unexpected text '{}'", text[token.span.start..end].trim()),
                });
                i = line_end;
            }
        }
    }

    for error in failures {
        let located = LocatedError::locate(error, &index, origin);
        warn!(line = located.start.line, error = %located.error, "malformed sub-template");
        extraction.residual.push_str(&format!(
            "\nERROR: {} (line {})",
            located.error, located.start.line
        ));
        extraction.errors.push(located);
    }
    debug!(
        count = extraction.subtemplates.len(),
        line = origin.line,
        "extracted sub-templates"
    );
    extraction
}

/// Validate a fetched sub-template body and extract its nested section.
///
/// The text must be a bracketed body, optionally followed by method calls.
pub fn extract_fetched(
    name: &str,
    text: &str,
) -> Result<(SubtemplateRecord, Vec<LocatedError>), LocatedError> {
    let trimmed = text.trim();
    let index = LineIndex::new(trimmed);
    let end = index.position(trimmed.len());
    build_record(name, trimmed, Position::START, Position::START, end)
        .map_err(|error| LocatedError::locate(error, &index, Position::START))
}

/// The index of the first line-initial `{#` at or after `from`.
fn next_block(tokens: &[Token<'_>], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&j| {
        let line_initial = match j.checked_sub(1).map(|p| tokens[p].kind) {
            Some(TokenKind::Newline) => true,
            Some(TokenKind::Spaces) => j < 2 || tokens[j - 2].kind == TokenKind::Newline,
            _ => false,
        };
        line_initial
            && tokens[j].kind == TokenKind::LBrace
            && tokens.get(j + 1).is_some_and(|t| t.kind == TokenKind::Pound)
    })
}

fn insert(map: &mut SubtemplateMap, record: SubtemplateRecord) {
    if map.contains_key(&record.name) {
        warn!(name = %record.name, "sub-template redefined; the last definition wins");
    }
    map.insert(record.name.clone(), Rc::new(record));
}

/// One `{#Name:[...]}` block located in the token stream.
struct Block<'a> {
    text: &'a str,
    index: &'a LineIndex,
    origin: Position,
    open: &'a Token<'a>,
    close: &'a Token<'a>,
}

impl Block<'_> {
    fn record(&self) -> Result<(SubtemplateRecord, Vec<LocatedError>), ParseError> {
        let inner_start = self.open.span.end;
        let mut rest = &self.text[inner_start..self.close.span.start];
        let name = header.parse_next(&mut rest).map_err(|_| ParseError::Subtemplate {
            span: Span::new(self.open.span.start, self.close.span.end),
            message: "expected '#Name:' header".to_string(),
        })?;
        let raw_start = self.close.span.start - rest.len();
        let raw = rest.trim_end();
        let document = |offset: usize| self.index.position(offset).shifted(self.origin);
        build_record(
            name,
            raw,
            document(raw_start),
            document(self.open.span.start),
            document(self.close.span.end),
        )
        .map_err(|error| error.offset_by(raw_start))
    }
}

/// Build a record from `raw` (`[body]suffix`), recursing into the body.
///
/// Errors returned are relative to `raw`.
fn build_record(
    name: &str,
    raw: &str,
    origin: Position,
    start: Position,
    end: Position,
) -> Result<(SubtemplateRecord, Vec<LocatedError>), ParseError> {
    let tokens = tokenize(raw);
    if tokens.first().map(|t| t.kind) != Some(TokenKind::LBracket) {
        return Err(ParseError::Subtemplate {
            span: Span::new(0, raw.len()),
            message: format!("body of #{name} must start with '['"),
        });
    }
    let close = matching_close(&tokens, 0)?;
    let body_end = tokens[close].span.start;
    let suffix = &raw[tokens[close].span.end..];
    if !suffix.is_empty() && !suffix.starts_with('.') {
        return Err(ParseError::Subtemplate {
            span: Span::new(tokens[close].span.end, raw.len()),
            message: format!("unexpected text after body of #{name}"),
        });
    }

    let raw_index = LineIndex::new(raw);
    let body_origin = raw_index.position(1).shifted(origin);
    let nested = extract(&raw[1..body_end], body_origin);
    let record = SubtemplateRecord {
        name: name.to_string(),
        raw: format!("[{}]{suffix}", nested.residual),
        origin,
        start,
        end,
        nested: nested.subtemplates,
    };
    Ok((record, nested.errors))
}

/// `#Name:` with optional surrounding blanks.
fn header<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    delimited(
        (blank, '#'),
        (one_of(is_ident_start), take_while(0.., is_ident_cont)).take(),
        (blank, ':', blank),
    )
    .parse_next(input)
}

fn blank<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(0.., char::is_whitespace).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_marker_leaves_text_unchanged() {
        let extraction = extract("Hello {name}", Position::START);
        assert_eq!(extraction.residual, "Hello {name}");
        assert!(extraction.subtemplates.is_empty());
    }

    #[test]
    fn extracts_blocks_with_positions() {
        let text = "Body {#Row}\n\nSubtemplates:\n{#Row:[{a}]}\n  {#Other:[x].@Debug(2)}\n";
        let extraction = extract(text, Position::START);
        assert_eq!(extraction.residual, "Body {#Row}");
        assert!(extraction.errors.is_empty());
        let row = &extraction.subtemplates["Row"];
        assert_eq!(row.raw, "[{a}]");
        assert_eq!((row.start.line, row.start.column), (4, 1));
        assert_eq!((row.origin.line, row.origin.column), (4, 7));
        assert_eq!(extraction.subtemplates["Other"].raw, "[x].@Debug(2)");
    }

    #[test]
    fn nested_sections_are_offset() {
        let text = "x\nSubtemplates:\n{#Outer:[\n{#Inner}\nSubtemplates:\n{#Inner:[in]}\n]}";
        let extraction = extract(text, Position::START);
        assert!(extraction.errors.is_empty(), "{:?}", extraction.errors);
        let outer = &extraction.subtemplates["Outer"];
        assert_eq!(outer.raw, "[\n{#Inner}]");
        let inner = &outer.nested["Inner"];
        assert_eq!(inner.raw, "[in]");
        assert_eq!((inner.start.line, inner.start.column), (6, 1));
    }

    #[test]
    fn malformed_block_becomes_error_line() {
        let text = "x\nSubtemplates:\n{Bad:[y]}\n{#Good:[z]}";
        let extraction = extract(text, Position::START);
        assert!(extraction.subtemplates.contains_key("Good"));
        assert_eq!(extraction.errors.len(), 1);
        assert_eq!(extraction.errors[0].start.line, 3);
        assert_eq!(
            extraction.residual,
            "x\nERROR: invalid sub-template: expected '#Name:' header (line 3)"
        );
    }

    #[test]
    fn trailing_garbage_is_reported() {
        let text = "Subtemplates:\n{#A:[a]} junk\n";
        let extraction = extract(text, Position::START);
        assert!(extraction.subtemplates.contains_key("A"));
        assert!(matches!(
            &extraction.errors[0].error,
            ParseError::Subtemplate { message, .. } if message == "unexpected text 'junk'"
        ));
    }

    #[test]
    fn unclosed_block_is_reported() {
        let text = "Subtemplates:\n{#A:[a}\n";
        let extraction = extract(text, Position::START);
        assert!(extraction.subtemplates.is_empty());
        assert_eq!(extraction.errors.len(), 1);
        assert!(extraction.residual.starts_with("\nERROR: "));
    }

    #[test]
    fn blocks_after_a_mismatched_close_survive() {
        let text = "x\nSubtemplates:\n{#A:[a}\n{#B:[b]}\n  {#C:[c]}\n";
        let extraction = extract(text, Position::START);
        let names: Vec<&str> = extraction.subtemplates.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(extraction.errors.len(), 1);
        assert_eq!(extraction.errors[0].start.line, 3);
        assert!(matches!(extraction.errors[0].error, ParseError::Mismatched { .. }));
    }

    #[test]
    fn blocks_after_an_unclosed_block_survive() {
        let text = "Subtemplates:\n{#A:[a\n{#B:[b]}\n{#C:[c]}\n";
        let extraction = extract(text, Position::START);
        assert_eq!(extraction.errors.len(), 1);
        assert!(extraction.subtemplates.contains_key("B"));
        assert!(extraction.subtemplates.contains_key("C"));
        assert!(!extraction.subtemplates.contains_key("A"));
    }

    #[test]
    fn fetched_body_validation() {
        let (record, errors) = extract_fetched("Remote", " [hi {name}] ").unwrap();
        assert!(errors.is_empty());
        assert_eq!(record.raw, "[hi {name}]");
        assert!(extract_fetched("Remote", "no brackets").is_err());
        assert!(extract_fetched("Remote", "[a] tail").is_err());
    }
}
