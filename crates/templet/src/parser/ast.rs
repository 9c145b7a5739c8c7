//! Public AST types for templates.
//!
//! These types are public to enable external tooling. Spans are byte ranges
//! into the text that was parsed; [`LineIndex`] maps them to line/column.

use serde::Serialize;

use crate::data::Scalar;

/// A byte range into the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A 1-based line/column position plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl Position {
    /// The first character of a document.
    pub const START: Position = Position {
        line: 1,
        column: 1,
        offset: 0,
    };

    /// Re-express a position relative to text that starts at `origin`.
    ///
    /// Positions on the first line are shifted by the origin's column; later
    /// lines only by its line.
    pub fn shifted(self, origin: Position) -> Position {
        if self.line == 1 {
            Position {
                line: origin.line,
                column: origin.column + self.column - 1,
                offset: origin.offset + self.offset,
            }
        } else {
            Position {
                line: origin.line + self.line - 1,
                column: self.column,
                offset: origin.offset + self.offset,
            }
        }
    }
}

/// Maps byte offsets of one text to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    text: String,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            text: text.to_string(),
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(offset - line_start, |s| s.chars().count())
            + 1;
        Position {
            line,
            column,
            offset,
        }
    }
}

/// A parsed template: a sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// A node of a template body.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal text, escapes already resolved.
    Text(String),
    /// An auto-numbered bullet `{.}` and the rest of its line.
    Bullet(Vec<Node>),
    /// An expression in braces.
    Expression(Expr),
    /// A malformed construct, rendered as a visible error.
    Error(String),
}

/// An expression inside braces.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Dotted lookup path: `a.b`, `^`, `*`, `$var`.
    Path(String),
    /// Meta key `@` or `@.Name`.
    Meta(Option<String>),
    /// Quoted string or number literal.
    Literal(Scalar),
    /// Inline JSON object literal, parsed lazily.
    Json(String),
    /// Bracketed template `[ ... ]`.
    Template(Template),
    /// Sub-template reference `#Name`.
    Subtemplate(String),
    /// `context: body`, or `context:: body` when aggregated.
    ContextSwitch {
        context: Box<Expr>,
        body: Box<Expr>,
        aggregate: bool,
    },
    /// A target followed by a chain of method calls.
    Invocation {
        target: Box<Expr>,
        calls: Vec<MethodCall>,
    },
    /// `predicate -> then : otherwise`.
    Conditional {
        predicate: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Comparison {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
}

/// A method call in a chain: `.Name(args)` or `.@Name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

impl MethodCall {
    /// Annotation calls start with `@` and modify the annotation set.
    pub fn is_annotation(&self) -> bool {
        self.name.starts_with('@')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_positions() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.position(0), Position::START);
        let p = index.position(4);
        assert_eq!((p.line, p.column), (2, 2));
        let end = index.position(6);
        assert_eq!((end.line, end.column), (3, 1));
    }

    #[test]
    fn shifted_positions() {
        let origin = Position {
            line: 10,
            column: 5,
            offset: 100,
        };
        let first = Position {
            line: 1,
            column: 3,
            offset: 2,
        };
        assert_eq!(first.shifted(origin).column, 7);
        let later = Position {
            line: 2,
            column: 3,
            offset: 9,
        };
        let shifted = later.shifted(origin);
        assert_eq!((shifted.line, shifted.column, shifted.offset), (11, 3, 109));
    }
}
