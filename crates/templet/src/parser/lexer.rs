//! Template tokenizer using winnow.
//!
//! Produces a flat token stream with positions. The stream is used by the
//! sub-template extractor, by error recovery in the template parser, and for
//! the `@.Tokens` meta key. Tokenizing never fails: anything unrecognised
//! becomes a `Text` token.

use std::fmt::{Display, Formatter, Result as FmtResult};

use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::ast::{LineIndex, Position, Span};
use super::error::ParseError;

/// The marker that starts a sub-template section.
pub const SUBTEMPLATES_MARKER: &str = "Subtemplates:";

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Subtemplates,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pound,
    Identifier,
    Colon,
    MethodName,
    Comment,
    Newline,
    Spaces,
    Apostrophe,
    Quote,
    Dot,
    Comma,
    Escape,
    Text,
}

impl TokenKind {
    /// The upper-case category name used in token traces.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Subtemplates => "SUBTEMPLATES",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::LParen => "LP",
            TokenKind::RParen => "RP",
            TokenKind::Pound => "POUND",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Colon => "COLON",
            TokenKind::MethodName => "METHODNAME",
            TokenKind::Comment => "COMMENT",
            TokenKind::Newline => "NL",
            TokenKind::Spaces => "SPACES",
            TokenKind::Apostrophe => "APOSTROPHE",
            TokenKind::Quote => "QUOTE",
            TokenKind::Dot => "DOT",
            TokenKind::Comma => "COMMA",
            TokenKind::Escape => "ESCAPE",
            TokenKind::Text => "TEXT",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// A token with its source text and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
    pub position: Position,
}

/// Tokenize a template.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let index = LineIndex::new(input);
    let mut remaining = input;
    let mut tokens = Vec::new();
    let mut line_has_content = false;

    while !remaining.is_empty() {
        let start = input.len() - remaining.len();
        let kind = next_token(&mut remaining, line_has_content).unwrap_or_else(|_| {
            // Every alternative failed without consuming: take one char.
            let mut chars = remaining.chars();
            chars.next();
            remaining = chars.as_str();
            TokenKind::Text
        });
        let end = input.len() - remaining.len();
        match kind {
            TokenKind::Newline => line_has_content = false,
            TokenKind::Spaces => {}
            _ => line_has_content = true,
        }
        tokens.push(Token {
            kind,
            text: &input[start..end],
            span: Span::new(start, end),
            position: index.position(start),
        });
    }
    tokens
}

/// Parse the next token. Line-start forms are only tried before any
/// non-blank content on the current line.
fn next_token(input: &mut &str, line_has_content: bool) -> ModalResult<TokenKind> {
    if !line_has_content {
        let line_start: ModalResult<TokenKind> = alt((
            SUBTEMPLATES_MARKER.value(TokenKind::Subtemplates),
            line_comment.value(TokenKind::Comment),
        ))
        .parse_next(input);
        if line_start.is_ok() {
            return line_start;
        }
    }
    alt((
        newline.value(TokenKind::Newline),
        spaces.value(TokenKind::Spaces),
        escape.value(TokenKind::Escape),
        word,
        punctuation,
        other_text.value(TokenKind::Text),
        any.value(TokenKind::Text),
    ))
    .parse_next(input)
}

fn newline<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    alt(("\r\n", "\n")).parse_next(input)
}

fn spaces<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., [' ', '\t']).parse_next(input)
}

/// A line comment: `//` through the end of the line (newline excluded).
fn line_comment<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ("//", take_while(0.., |c: char| c != '\n'))
        .take()
        .parse_next(input)
}

/// A backslash and the character it escapes.
fn escape<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ('\\', any).take().parse_next(input)
}

/// An identifier, or a method name when directly followed by `(`.
fn word(input: &mut &str) -> ModalResult<TokenKind> {
    (
        opt(one_of(['@', '$'])),
        one_of(is_ident_start),
        take_while(0.., is_ident_cont),
    )
        .void()
        .parse_next(input)?;
    if input.starts_with('(') {
        Ok(TokenKind::MethodName)
    } else {
        Ok(TokenKind::Identifier)
    }
}

fn punctuation(input: &mut &str) -> ModalResult<TokenKind> {
    any.verify_map(|c: char| match c {
        '{' => Some(TokenKind::LBrace),
        '}' => Some(TokenKind::RBrace),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        '#' => Some(TokenKind::Pound),
        ':' => Some(TokenKind::Colon),
        '\'' => Some(TokenKind::Apostrophe),
        '"' => Some(TokenKind::Quote),
        '.' => Some(TokenKind::Dot),
        ',' => Some(TokenKind::Comma),
        _ => None,
    })
    .parse_next(input)
}

fn other_text<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| !is_special(c)).parse_next(input)
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '{' | '}'
            | '['
            | ']'
            | '('
            | ')'
            | '#'
            | ':'
            | '\''
            | '"'
            | '.'
            | ','
            | '\\'
            | '@'
            | '$'
            | ' '
            | '\t'
            | '\n'
            | '\r'
    ) || is_ident_start(c)
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_cont(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Inside braces or parentheses: quotes delimit strings.
    Expression,
    /// Inside brackets: quotes are ordinary text.
    Text,
}

/// Opening token kinds and what closes them.
fn closer(kind: TokenKind) -> Option<(TokenKind, Mode, &'static str)> {
    match kind {
        TokenKind::LBrace => Some((TokenKind::RBrace, Mode::Expression, "brace")),
        TokenKind::LBracket => Some((TokenKind::RBracket, Mode::Text, "bracket")),
        TokenKind::LParen => Some((TokenKind::RParen, Mode::Expression, "parenthesis")),
        _ => None,
    }
}

/// Find the index of the token closing the delimiter at `open`.
///
/// Nested braces, brackets and parentheses are matched recursively. In
/// expression mode apostrophes and quotes delimit strings whose content is
/// skipped; in bracketed text they are ordinary characters, as are
/// parentheses.
pub fn matching_close(tokens: &[Token<'_>], open: usize) -> Result<usize, ParseError> {
    let Some(first) = tokens.get(open).and_then(|t| closer(t.kind)) else {
        let span = tokens.get(open).map(|t| t.span).unwrap_or_default();
        return Err(ParseError::Syntax {
            span,
            message: "expected an opening delimiter".to_string(),
        });
    };
    let mut stack = vec![(first, open)];
    let mut i = open + 1;

    while let Some(token) = tokens.get(i) {
        let Some(&((expected, mode, name), _)) = stack.last() else {
            break;
        };
        match token.kind {
            TokenKind::Apostrophe | TokenKind::Quote if mode == Mode::Expression => {
                let quote = token.kind;
                match tokens[i + 1..].iter().position(|t| t.kind == quote) {
                    Some(n) => i += n + 1,
                    None => {
                        return Err(ParseError::Unclosed {
                            span: token.span,
                            expected: if quote == TokenKind::Quote {
                                "quote"
                            } else {
                                "apostrophe"
                            },
                        });
                    }
                }
            }
            TokenKind::LParen | TokenKind::RParen if mode == Mode::Text => {}
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => {
                if let Some(next) = closer(token.kind) {
                    stack.push((next, i));
                }
            }
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                if token.kind != expected {
                    return Err(ParseError::Mismatched {
                        span: token.span,
                        found: token.text.to_string(),
                        expected: name,
                    });
                }
                stack.pop();
                if stack.is_empty() {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    let (span, expected) = stack
        .last()
        .map(|&((_, _, name), at)| (tokens[at].span, name))
        .unwrap_or((Span::default(), "delimiter"));
    Err(ParseError::Unclosed { span, expected })
}

/// Render a token stream as one `KIND 'text' line:column` entry per line.
pub fn token_trace(tokens: &[Token<'_>]) -> String {
    tokens
        .iter()
        .map(|t| {
            format!(
                "{} {:?} {}:{}",
                t.kind, t.text, t.position.line, t.position.column
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn expression_tokens() {
        assert_eq!(
            kinds("{a.Trim()}"),
            vec![
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::MethodName,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn marker_and_comment_only_at_line_start() {
        let tokens = tokenize("x Subtemplates:\n  // note\nSubtemplates:");
        let found: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Subtemplates | TokenKind::Comment))
            .map(|t| (t.kind, t.position.line))
            .collect();
        assert_eq!(
            found,
            vec![(TokenKind::Comment, 2), (TokenKind::Subtemplates, 3)]
        );
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = tokenize("ab\n {x}");
        let brace = tokens.iter().find(|t| t.kind == TokenKind::LBrace).unwrap();
        assert_eq!((brace.position.line, brace.position.column), (2, 2));
        assert_eq!(brace.span, Span::new(4, 5));
    }

    #[test]
    fn matching_close_skips_strings_in_expressions() {
        let tokens = tokenize("{a.Replace('}', ')')} tail");
        let close = matching_close(&tokens, 0).unwrap();
        assert_eq!(tokens[close].span.start, 20);
    }

    #[test]
    fn apostrophes_in_bracket_text_are_plain() {
        let tokens = tokenize("{x:[don't (stop]}");
        let close = matching_close(&tokens, 0).unwrap();
        assert_eq!(close, tokens.len() - 1);
    }

    #[test]
    fn unclosed_and_mismatched() {
        let tokens = tokenize("{a:[b}");
        assert!(matches!(
            matching_close(&tokens, 0),
            Err(ParseError::Mismatched { expected: "bracket", .. })
        ));
        let tokens = tokenize("{a");
        assert!(matches!(
            matching_close(&tokens, 0),
            Err(ParseError::Unclosed {
                expected: "brace",
                ..
            })
        ));
    }
}
