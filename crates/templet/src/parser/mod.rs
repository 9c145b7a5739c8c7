//! Template tokenizer, parser and sub-template extractor.
//!
//! The parser produces an AST that the interpreter evaluates and that
//! external tooling can inspect.

pub mod ast;
mod check;
pub mod error;
pub mod lexer;
pub mod subtemplates;
mod template;

pub use ast::*;
pub use check::check_document;
pub use error::{LocatedError, ParseError};
pub use lexer::{SUBTEMPLATES_MARKER, Token, TokenKind, matching_close, token_trace, tokenize};
pub use subtemplates::{Extraction, SubtemplateMap, SubtemplateRecord, extract, extract_fetched};
pub use template::{Parsed, parse_subtemplate_body, parse_template};
