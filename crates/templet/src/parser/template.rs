//! Template parser using winnow.
//!
//! Parses template text into an AST. Handles:
//! - Literal text with `\{ \} \[ \] \\` escapes and `//` comment lines
//! - Bullets `{.}` capturing the rest of their line
//! - Expressions in braces: paths, literals, bracketed templates, sub-template
//!   references, method chains, context switches, conditionals and logic
//!
//! Parsing is error tolerant. A malformed expression becomes an
//! [`NodeKind::Error`] node spanning its braces, the error is collected, and
//! parsing resumes after the matching closing brace.

use std::cell::RefCell;
use std::mem;

use serde_json::Number;
use winnow::combinator::{alt, not, opt, peek, preceded, separated, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::ast::*;
use super::error::ParseError;
use super::lexer::{is_ident_cont, is_ident_start, matching_close, tokenize};
use crate::data::Scalar;

/// A parsed tree with the errors found while parsing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub tree: T,
    pub errors: Vec<ParseError>,
}

/// Parse a template document.
pub fn parse_template(input: &str) -> Parsed<Template> {
    let parser = TemplateParser::new(input);
    let mut remaining = input;
    let tree = parser.body(&mut remaining, Stop::DOCUMENT);
    Parsed {
        tree,
        errors: parser.errors.into_inner(),
    }
}

/// Parse a sub-template body: a bracketed template optionally followed by
/// method calls, e.g. `[{.} {name}].@BulletStyle('I.')`.
///
/// The result is a template holding a single expression node.
pub fn parse_subtemplate_body<'s>(input: &'s str) -> Parsed<Template> {
    let parser = TemplateParser::new(input);
    let mut remaining = input;
    let parsed = (ws, |i: &mut &'s str| parser.postfix(i), ws).parse_next(&mut remaining);
    let node = match parsed {
        Ok((_, expr, _)) if remaining.is_empty() => Node {
            span: expr.span,
            kind: NodeKind::Expression(expr),
        },
        _ => {
            let error = ParseError::Syntax {
                span: Span::new(0, input.len()),
                message: "invalid sub-template body".to_string(),
            };
            let node = Node {
                kind: NodeKind::Error(error.to_string()),
                span: error.span(),
            };
            parser.errors.borrow_mut().push(error);
            node
        }
    };
    Parsed {
        tree: Template { nodes: vec![node] },
        errors: parser.errors.into_inner(),
    }
}

/// What terminates a run of template text.
#[derive(Debug, Clone, Copy)]
struct Stop {
    /// Stop at an unmatched `]`.
    bracket: bool,
    /// Stop before a newline.
    line: bool,
}

impl Stop {
    const DOCUMENT: Stop = Stop {
        bracket: false,
        line: false,
    };
    const BRACKET: Stop = Stop {
        bracket: true,
        line: false,
    };
}

struct TemplateParser<'s> {
    source: &'s str,
    errors: RefCell<Vec<ParseError>>,
}

impl<'s> TemplateParser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            errors: RefCell::new(Vec::new()),
        }
    }

    fn offset(&self, input: &str) -> usize {
        self.source.len() - input.len()
    }

    fn span_from(&self, start: usize, input: &str) -> Span {
        Span::new(start, self.offset(input))
    }

    // =========================================================================
    // Text mode
    // =========================================================================

    /// Parse literal text, bullets and expressions until `stop` applies.
    fn body(&self, input: &mut &'s str, stop: Stop) -> Template {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut text_start = self.offset(input);
        let mut depth = 0usize;
        let mut line_start = !stop.bracket && !stop.line;

        while let Some(c) = input.chars().next() {
            if line_start && skip_comment_line(input) {
                continue;
            }
            line_start = false;
            if text.is_empty() {
                text_start = self.offset(input);
            }
            match c {
                '\n' if stop.line => break,
                ']' if stop.bracket && depth == 0 => break,
                '[' if stop.bracket => {
                    depth += 1;
                    text.push(c);
                    *input = &input[1..];
                }
                ']' if stop.bracket => {
                    depth -= 1;
                    text.push(c);
                    *input = &input[1..];
                }
                '\\' => {
                    *input = &input[1..];
                    match input.chars().next() {
                        Some(next @ ('{' | '}' | '[' | ']' | '\\')) => {
                            text.push(next);
                            *input = &input[1..];
                        }
                        _ => text.push('\\'),
                    }
                }
                '{' => {
                    flush_text(&mut nodes, &mut text, text_start, self.offset(input));
                    let node = if input.starts_with("{.}") {
                        self.bullet(input, stop)
                    } else {
                        self.expression_node(input)
                    };
                    nodes.push(node);
                }
                '\n' => {
                    text.push(c);
                    *input = &input[1..];
                    line_start = true;
                }
                _ => {
                    text.push(c);
                    *input = &input[c.len_utf8()..];
                }
            }
        }
        flush_text(&mut nodes, &mut text, text_start, self.offset(input));
        Template { nodes }
    }

    /// Parse `{.}` and the rest of its line.
    fn bullet(&self, input: &mut &'s str, stop: Stop) -> Node {
        let start = self.offset(input);
        *input = &input[3..];
        let children = self.body(
            input,
            Stop {
                bracket: stop.bracket,
                line: true,
            },
        );
        Node {
            kind: NodeKind::Bullet(children.nodes),
            span: self.span_from(start, input),
        }
    }

    /// Parse `{ expr }`, recovering to the matching brace on failure.
    fn expression_node(&self, input: &mut &'s str) -> Node {
        let start = self.offset(input);
        let checkpoint = *input;
        let errors_before = self.errors.borrow().len();

        let parsed = (('{', ws), |i: &mut &'s str| self.expr(i), (ws, '}')).parse_next(input);
        if let Ok((_, expr, _)) = parsed {
            return Node {
                kind: NodeKind::Expression(expr),
                span: self.span_from(start, input),
            };
        }

        *input = checkpoint;
        self.errors.borrow_mut().truncate(errors_before);
        let tokens = tokenize(input);
        let (end, error) = match matching_close(&tokens, 0) {
            Ok(close) => {
                let end = tokens[close].span.end;
                let content = input[1..end - 1].trim();
                let error = ParseError::Syntax {
                    span: Span::new(start, start + end),
                    message: format!("invalid expression '{content}'"),
                };
                (end, error)
            }
            Err(err) => (input.len(), err.offset_by(start)),
        };
        *input = &input[end..];
        let node = Node {
            kind: NodeKind::Error(error.to_string()),
            span: Span::new(start, start + end),
        };
        self.errors.borrow_mut().push(error);
        node
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// `logical ( -> operand ( : operand )? )?`
    fn expr(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let predicate = self.logical(input)?;
        let checkpoint = *input;
        ws(input)?;
        if opt("->").parse_next(input)?.is_none() {
            *input = checkpoint;
            return Ok(predicate);
        }
        ws(input)?;
        let then = self.operand(input)?;
        let checkpoint = *input;
        ws(input)?;
        let otherwise = if opt(':').parse_next(input)?.is_some() {
            ws(input)?;
            Some(Box::new(self.operand(input)?))
        } else {
            *input = checkpoint;
            None
        };
        Ok(Expr {
            kind: ExprKind::Conditional {
                predicate: Box::new(predicate),
                then: Box::new(then),
                otherwise,
            },
            span: self.span_from(start, input),
        })
    }

    /// Comparisons joined by `&` / `|`, left associative.
    fn logical(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let mut lhs = self.comparison(input)?;
        loop {
            let checkpoint = *input;
            ws(input)?;
            let op = opt(alt((
                alt(("&&", "&")).value(LogicalOp::And),
                alt(("||", "|")).value(LogicalOp::Or),
            )))
            .parse_next(input)?;
            let Some(op) = op else {
                *input = checkpoint;
                break;
            };
            ws(input)?;
            let rhs = self.comparison(input)?;
            lhs = Expr {
                kind: ExprKind::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span: self.span_from(start, input),
            };
        }
        Ok(lhs)
    }

    fn comparison(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let lhs = self.unary(input)?;
        let checkpoint = *input;
        ws(input)?;
        let Some(op) = opt(compare_op).parse_next(input)? else {
            *input = checkpoint;
            return Ok(lhs);
        };
        ws(input)?;
        let rhs = self.unary(input)?;
        Ok(Expr {
            kind: ExprKind::Comparison {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span: self.span_from(start, input),
        })
    }

    fn unary(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        if opt(terminated('!', ws)).parse_next(input)?.is_some() {
            let inner = self.unary(input)?;
            return Ok(Expr {
                kind: ExprKind::Not(Box::new(inner)),
                span: self.span_from(start, input),
            });
        }
        self.operand(input)
    }

    /// A postfix expression, optionally used as the context of a switch:
    /// `context: body` or `context:: body`. The colon must directly follow
    /// the context.
    fn operand(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let context = self.postfix(input)?;
        let aggregate = if let Some(rest) = input.strip_prefix("::") {
            *input = rest;
            true
        } else if let Some(rest) = input.strip_prefix(':') {
            *input = rest;
            false
        } else {
            return Ok(context);
        };
        ws(input)?;
        let body = self.operand(input)?;
        Ok(Expr {
            kind: ExprKind::ContextSwitch {
                context: Box::new(context),
                body: Box::new(body),
                aggregate,
            },
            span: self.span_from(start, input),
        })
    }

    /// A primary followed by `.Method(args)` calls.
    fn postfix(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let target = self.primary(input)?;
        let mut calls = Vec::new();
        while let Some(call) =
            opt(preceded('.', |i: &mut &'s str| self.method_call(i))).parse_next(input)?
        {
            calls.push(call);
        }
        if calls.is_empty() {
            return Ok(target);
        }
        let span = self.span_from(start, input);
        let kind = match target.kind {
            ExprKind::Invocation {
                target: inner,
                calls: mut leading,
            } => {
                leading.extend(calls);
                ExprKind::Invocation {
                    target: inner,
                    calls: leading,
                }
            }
            other => ExprKind::Invocation {
                target: Box::new(Expr {
                    kind: other,
                    span: target.span,
                }),
                calls,
            },
        };
        Ok(Expr { kind, span })
    }

    fn method_call(&self, input: &mut &'s str) -> ModalResult<MethodCall> {
        let start = self.offset(input);
        let name = method_name.parse_next(input)?;
        '('.parse_next(input)?;
        ws(input)?;
        let args: Vec<Expr> =
            separated(0.., |i: &mut &'s str| self.expr(i), (ws, ',', ws)).parse_next(input)?;
        ws(input)?;
        ')'.parse_next(input)?;
        Ok(MethodCall {
            name: name.to_string(),
            args,
            span: self.span_from(start, input),
        })
    }

    fn primary(&self, input: &mut &'s str) -> ModalResult<Expr> {
        let start = self.offset(input);
        let Some(first) = input.chars().next() else {
            return Err(backtrack());
        };
        let kind = match first {
            '(' => {
                ('(', ws).parse_next(input)?;
                let inner = self.expr(input)?;
                (ws, ')').parse_next(input)?;
                inner.kind
            }
            '[' => ExprKind::Template(self.bracket_template(input)?),
            '#' => {
                let name = preceded('#', identifier).parse_next(input)?;
                ExprKind::Subtemplate(name.to_string())
            }
            '\'' | '"' => ExprKind::Literal(Scalar::Text(string_literal(input)?)),
            '{' => ExprKind::Json(json_literal(input)?.to_string()),
            '-' | '0'..='9' => ExprKind::Literal(number(input)?),
            _ => {
                if let Some(call) = opt(|i: &mut &'s str| self.method_call(i)).parse_next(input)? {
                    // A bare call targets the current context.
                    ExprKind::Invocation {
                        target: Box::new(Expr {
                            kind: ExprKind::Path("*".to_string()),
                            span: Span::new(start, start),
                        }),
                        calls: vec![call],
                    }
                } else if first == '@' {
                    let name = preceded('@', opt(preceded('.', identifier))).parse_next(input)?;
                    ExprKind::Meta(name.map(ToString::to_string))
                } else {
                    ExprKind::Path(path(input)?)
                }
            }
        };
        Ok(Expr {
            kind,
            span: self.span_from(start, input),
        })
    }

    /// `[ body ]`, trimming a leading newline and a trailing blank line.
    fn bracket_template(&self, input: &mut &'s str) -> ModalResult<Template> {
        '['.parse_next(input)?;
        let body = self.body(input, Stop::BRACKET);
        ']'.parse_next(input)?;
        Ok(trim_bracket_body(body))
    }
}

fn backtrack() -> ErrMode<ContextError> {
    ErrMode::Backtrack(ContextError::new())
}

fn flush_text(nodes: &mut Vec<Node>, text: &mut String, start: usize, end: usize) {
    if !text.is_empty() {
        nodes.push(Node {
            kind: NodeKind::Text(mem::take(text)),
            span: Span::new(start, end),
        });
    }
}

/// Skip a line whose first non-blank characters are `//`, newline included.
fn skip_comment_line(input: &mut &str) -> bool {
    let rest = input.trim_start_matches([' ', '\t']);
    if !rest.starts_with("//") {
        return false;
    }
    let skip = rest.find('\n').map_or(rest.len(), |i| i + 1);
    let consumed = input.len() - rest.len() + skip;
    *input = &input[consumed..];
    true
}

fn trim_bracket_body(mut body: Template) -> Template {
    if let Some(Node {
        kind: NodeKind::Text(text),
        ..
    }) = body.nodes.first_mut()
    {
        if let Some(rest) = text
            .strip_prefix("\r\n")
            .or_else(|| text.strip_prefix('\n'))
        {
            *text = rest.to_string();
        }
    }
    if let Some(Node {
        kind: NodeKind::Text(text),
        ..
    }) = body.nodes.last_mut()
    {
        let blank_tail = text.trim_end_matches([' ', '\t']);
        if let Some(rest) = blank_tail.strip_suffix('\n') {
            let rest = rest.strip_suffix('\r').unwrap_or(rest);
            *text = rest.to_string();
        }
    }
    body.nodes
        .retain(|node| !matches!(&node.kind, NodeKind::Text(text) if text.is_empty()));
    body
}

/// Optional whitespace, newlines included.
fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., char::is_whitespace)
        .void()
        .parse_next(input)
}

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(is_ident_start), take_while(0.., is_ident_cont))
        .take()
        .parse_next(input)
}

/// A method name (`Name` or `@Name`) directly followed by `(`.
fn method_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    terminated((opt('@'), identifier).take(), peek('('))
        .parse_next(input)
}

fn path_segment<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    alt(("^", "*", (opt('$'), identifier).take())).parse_next(input)
}

/// A dotted path. A segment followed by `(` is a method call and ends the
/// path.
fn path(input: &mut &str) -> ModalResult<String> {
    let mut path = path_segment.parse_next(input)?.to_string();
    while let Some(segment) =
        opt(terminated(preceded('.', path_segment), not('('))).parse_next(input)?
    {
        path.push('.');
        path.push_str(segment);
    }
    Ok(path)
}

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    alt((
        "!=".value(CompareOp::Ne),
        "<=".value(CompareOp::Le),
        ">=".value(CompareOp::Ge),
        "==".value(CompareOp::Eq),
        "=".value(CompareOp::Eq),
        "<".value(CompareOp::Lt),
        ">".value(CompareOp::Gt),
    ))
    .parse_next(input)
}

/// A quoted string with `\n`, `\t` and backslash escapes.
fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['\'', '"']).parse_next(input)?;
    let mut out = String::new();
    loop {
        match any.parse_next(input)? {
            c if c == quote => return Ok(out),
            '\\' => {
                let escaped = any.parse_next(input)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            c => out.push(c),
        }
    }
}

fn number(input: &mut &str) -> ModalResult<Scalar> {
    let text = (
        opt('-'),
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(1.., |c: char| c.is_ascii_digit()))),
    )
        .take()
        .parse_next(input)?;
    Ok(text
        .parse::<Number>()
        .map_or_else(|_| Scalar::Text(text.to_string()), Scalar::Number))
}

/// An inline JSON object, found by matching its closing brace.
fn json_literal<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    let tokens = tokenize(input);
    let close = matching_close(&tokens, 0).map_err(|_| backtrack())?;
    let end = tokens[close].span.end;
    let (literal, rest) = input.split_at(end);
    *input = rest;
    Ok(literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_expr(input: &str) -> ExprKind {
        let parsed = parse_template(input);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        match parsed.tree.nodes.as_slice() {
            [Node {
                kind: NodeKind::Expression(expr),
                ..
            }] => expr.kind.clone(),
            other => panic!("expected one expression, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_one_node() {
        let parsed = parse_template("hello");
        assert_eq!(
            parsed.tree.nodes,
            vec![Node {
                kind: NodeKind::Text("hello".into()),
                span: Span::new(0, 5),
            }]
        );
    }

    #[test]
    fn escapes_and_comments() {
        let parsed = parse_template("a\\{b\\}\n  // gone\nc");
        assert_eq!(
            parsed.tree.nodes[0].kind,
            NodeKind::Text("a{b}\nc".into())
        );
    }

    #[test]
    fn path_then_methods() {
        let kind = single_expr("{person.name.ToUpper().Substr(0, 2)}");
        let ExprKind::Invocation { target, calls } = kind else {
            panic!("expected invocation");
        };
        assert_eq!(target.kind, ExprKind::Path("person.name".into()));
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ToUpper", "Substr"]);
        assert_eq!(calls[1].args.len(), 2);
    }

    #[test]
    fn context_switch_with_bracket_body() {
        let kind = single_expr("{items:[{.} {name}]}");
        let ExprKind::ContextSwitch {
            context,
            body,
            aggregate,
        } = kind
        else {
            panic!("expected context switch");
        };
        assert!(!aggregate);
        assert_eq!(context.kind, ExprKind::Path("items".into()));
        let ExprKind::Template(template) = body.kind else {
            panic!("expected template body");
        };
        assert!(matches!(
            &template.nodes[0].kind,
            NodeKind::Bullet(children) if children.len() == 2
        ));
    }

    #[test]
    fn aggregate_switch_and_subtemplate() {
        let kind = single_expr("{items::#Summary}");
        assert!(matches!(
            kind,
            ExprKind::ContextSwitch { aggregate: true, ref body, .. }
                if body.kind == ExprKind::Subtemplate("Summary".into())
        ));
    }

    #[test]
    fn conditional_with_else() {
        let kind = single_expr("{age >= 18 & member -> 'adult' : [minor]}");
        let ExprKind::Conditional {
            predicate,
            otherwise,
            ..
        } = kind
        else {
            panic!("expected conditional");
        };
        assert!(matches!(
            predicate.kind,
            ExprKind::Logical {
                op: LogicalOp::And,
                ..
            }
        ));
        assert!(otherwise.is_some());
    }

    #[test]
    fn bare_annotation_call_targets_self() {
        let kind = single_expr("{@MissingValue('?')}");
        let ExprKind::Invocation { target, calls } = kind else {
            panic!("expected invocation");
        };
        assert_eq!(target.kind, ExprKind::Path("*".into()));
        assert!(calls[0].is_annotation());
    }

    #[test]
    fn meta_keys() {
        assert_eq!(single_expr("{@}"), ExprKind::Meta(None));
        assert_eq!(
            single_expr("{@.DateFormat}"),
            ExprKind::Meta(Some("DateFormat".into()))
        );
    }

    #[test]
    fn json_literal_context() {
        let kind = single_expr(r#"{{"a": "}"}:[{a}]}"#);
        let ExprKind::ContextSwitch { context, .. } = kind else {
            panic!("expected context switch");
        };
        assert_eq!(context.kind, ExprKind::Json(r#"{"a": "}"}"#.into()));
    }

    #[test]
    fn bracket_body_trims_outer_newlines() {
        let kind = single_expr("{x:[\nline\n  ]}");
        let ExprKind::ContextSwitch { body, .. } = kind else {
            panic!("expected context switch");
        };
        let ExprKind::Template(template) = body.kind else {
            panic!("expected template");
        };
        assert_eq!(template.nodes[0].kind, NodeKind::Text("line".into()));
    }

    #[test]
    fn malformed_expression_recovers() {
        let parsed = parse_template("a {b +} c {d}");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].span(), Span::new(2, 7));
        assert!(matches!(parsed.tree.nodes[1].kind, NodeKind::Error(_)));
        assert!(matches!(
            parsed.tree.nodes.last().map(|n| &n.kind),
            Some(NodeKind::Expression(_))
        ));
    }

    #[test]
    fn unclosed_brace_is_reported() {
        let parsed = parse_template("text {oops");
        assert!(matches!(
            parsed.errors.as_slice(),
            [ParseError::Unclosed {
                expected: "brace",
                ..
            }]
        ));
    }

    #[test]
    fn subtemplate_body_with_suffix() {
        let parsed = parse_subtemplate_body("[{name}].@DefaultIndent(2)");
        assert!(parsed.errors.is_empty());
        let NodeKind::Expression(expr) = &parsed.tree.nodes[0].kind else {
            panic!("expected expression");
        };
        assert!(matches!(&expr.kind, ExprKind::Invocation { calls, .. } if calls.len() == 1));
    }
}
