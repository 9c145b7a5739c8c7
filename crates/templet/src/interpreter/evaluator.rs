//! Template evaluation engine.
//!
//! Walks a parsed template against a data context and produces a tree of
//! [`Value`]s. Evaluation never fails as a whole: local problems are
//! recorded as positioned errors, the failing node evaluates to
//! [`Value::Error`], and the walk continues.

use std::collections::HashSet;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use super::annotations::Annotations;
use super::cache::{CachedTemplate, FetchState, TemplateCache};
use super::error::{DebugEntry, ErrorKind, MethodError, TemplateError, compute_suggestions};
use super::methods::{MethodId, encode, parse_date};
use super::registry::HostRegistry;
use super::value::Value;
use crate::compose::render;
use crate::data::{Entry, Scalar, TemplateData, is_numeric_literal};
use crate::parser::{
    CompareOp, Expr, ExprKind, LocatedError, LogicalOp, MethodCall, Node, NodeKind, Position,
    Span, SubtemplateMap, SubtemplateRecord, Template, extract_fetched, token_trace, tokenize,
};

/// Default limit on nested sub-template invocations.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Everything one evaluation pass produced.
#[derive(Debug)]
pub struct Evaluation {
    pub value: Value,
    pub errors: Vec<TemplateError>,
    pub debug_log: Vec<DebugEntry>,
    /// Remote locations that were needed but are not available yet.
    pub pending: Vec<String>,
}

/// Where the text being evaluated sits in the document, for error positions.
struct Origin {
    template: Rc<CachedTemplate>,
    position: Position,
}

/// The outcome of resolving the context of a context switch.
enum ContextTarget {
    Data(TemplateData),
    Missing(String),
    Loading(String),
    /// A remote context failed to load; the body runs against an empty
    /// context.
    Failed,
    Error(Value),
}

/// Evaluation state for one pass over a document.
pub struct Evaluator<'s> {
    pub(super) cache: &'s TemplateCache,
    pub(super) host: &'s HostRegistry,
    max_depth: usize,
    pub(super) annotations: Annotations,
    pub(super) context: TemplateData,
    /// Position of the current element when broadcasting over a list.
    pub(super) position: Option<usize>,
    /// Evaluate the next bracketed template once, even under a list context.
    no_broadcast: bool,
    source: String,
    document: SubtemplateMap,
    scopes: Vec<SubtemplateMap>,
    origins: Vec<Origin>,
    depth: usize,
    suppress_missing: usize,
    errors: Vec<TemplateError>,
    debug_log: Vec<DebugEntry>,
    pending: Vec<String>,
    reported: HashSet<String>,
}

impl<'s> Evaluator<'s> {
    pub fn new(
        cache: &'s TemplateCache,
        host: &'s HostRegistry,
        annotations: Annotations,
        data: TemplateData,
    ) -> Self {
        Self {
            cache,
            host,
            max_depth: DEFAULT_MAX_DEPTH,
            annotations,
            context: data,
            position: None,
            no_broadcast: false,
            source: String::new(),
            document: SubtemplateMap::new(),
            scopes: Vec::new(),
            origins: Vec::new(),
            depth: 0,
            suppress_missing: 0,
            errors: Vec::new(),
            debug_log: Vec::new(),
            pending: Vec::new(),
            reported: HashSet::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluate a document whose sub-template section was already extracted.
    ///
    /// `source` is the residual document text, `subtemplates` the extracted
    /// map.
    pub fn evaluate(mut self, source: &str, subtemplates: SubtemplateMap) -> Evaluation {
        let document = self.cache.document(source);
        self.source = source.to_string();
        self.document = subtemplates;
        for error in &document.errors {
            let located = LocatedError::locate(error.clone(), &document.index, Position::START);
            self.errors.push(located.into());
        }
        self.origins.push(Origin {
            template: Rc::clone(&document),
            position: Position::START,
        });
        let value = self.eval_template(&document.tree);
        debug!(
            errors = self.errors.len(),
            pending = self.pending.len(),
            "evaluation pass finished"
        );
        Evaluation {
            value,
            errors: self.errors,
            debug_log: self.debug_log,
            pending: self.pending,
        }
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    /// Record an error at `span` of the text being evaluated and return the
    /// value the failing node renders as.
    pub(super) fn error_at(
        &mut self,
        span: Span,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Value {
        let message = message.into();
        let (start, end) = match self.origins.last() {
            Some(origin) => (
                origin.template.index.position(span.start).shifted(origin.position),
                origin.template.index.position(span.end).shifted(origin.position),
            ),
            None => (Position::START, Position::START),
        };
        debug!(line = start.line, column = start.column, %message, "template error");
        self.errors.push(TemplateError {
            kind,
            start,
            end,
            message: message.clone(),
        });
        Value::Error(message)
    }

    /// Drop errors recorded since `from`, except loading errors.
    fn rollback_errors(&mut self, from: usize) {
        let mut recent = self.errors.split_off(from);
        recent.retain(|error| error.kind == ErrorKind::Loading);
        self.errors.extend(recent);
    }

    /// Append to the user-visible debug log if `level` is enabled.
    pub(super) fn log(&mut self, level: u8, text: impl Into<String>) {
        if level <= self.annotations.debug_level {
            let text = text.into();
            trace!(level, %text, "debug log");
            self.debug_log.push(DebugEntry { level, text });
        }
    }

    /// Run `f` with `context` installed, restoring the previous context.
    pub(super) fn with_context<T>(
        &mut self,
        context: TemplateData,
        position: Option<usize>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved_context = mem::replace(&mut self.context, context);
        let saved_position = self.position;
        if position.is_some() {
            self.position = position;
        }
        let result = f(self);
        self.context = saved_context;
        self.position = saved_position;
        result
    }

    /// The fetch state of `url`, requesting it if needed.
    pub(super) fn fetch(&mut self, url: &str) -> FetchState {
        let state = self.cache.fetch_state(url).unwrap_or_else(|| {
            self.cache.request(url);
            FetchState::Pending
        });
        if state == FetchState::Pending && !self.pending.iter().any(|p| p == url) {
            debug!(url, "waiting for remote content");
            self.pending.push(url.to_string());
        }
        state
    }

    /// The fallback for a missing key, unless missing values are suppressed.
    pub(super) fn fallback(&self, key: &str) -> Option<String> {
        if self.suppress_missing > 0 {
            return None;
        }
        self.annotations
            .missing_value
            .as_ref()
            .map(|text| text.replace("{key}", key))
    }

    pub(super) fn missing(&mut self, key: &str) -> Value {
        self.log(1, format!("missing value for '{key}'"));
        Value::Missing {
            key: key.to_string(),
            fallback: self.fallback(key),
        }
    }

    // =========================================================================
    // Templates and nodes
    // =========================================================================

    pub(super) fn eval_template(&mut self, template: &Template) -> Value {
        let values = template
            .nodes
            .iter()
            .map(|node| self.eval_node(node))
            .collect();
        Value::Seq(values).flatten()
    }

    fn eval_node(&mut self, node: &Node) -> Value {
        match &node.kind {
            NodeKind::Text(text) => Value::text(text.clone()),
            NodeKind::Bullet(children) => Value::Bullet {
                children: children.iter().map(|child| self.eval_node(child)).collect(),
                default_indent: self.annotations.default_indent,
                styles: self.annotations.bullet_styles.clone(),
                mode: self.annotations.bullet_mode,
            },
            NodeKind::Expression(expr) => self.eval_expr(expr),
            NodeKind::Error(message) => Value::Error(message.clone()),
        }
    }

    /// A bracketed template runs once per element under a list context.
    fn eval_bracket(&mut self, template: &Template) -> Value {
        let once = mem::take(&mut self.no_broadcast);
        if once || !self.context.is_list() {
            return self.eval_template(template);
        }
        let values = self
            .context
            .elements()
            .into_iter()
            .enumerate()
            .map(|(i, element)| {
                self.with_context(element, Some(i), |ev| ev.eval_template(template))
            })
            .collect();
        Value::Aggregate(values)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub(super) fn eval_expr(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Path(path) => self.resolve_path(path),
            ExprKind::Meta(name) => self.meta(name.as_deref(), expr.span),
            ExprKind::Literal(scalar) => Value::Scalar(scalar.clone()),
            ExprKind::Json(text) => match self.json_context(text, expr.span) {
                ContextTarget::Data(node) => Value::Data(node),
                ContextTarget::Error(value) => value,
                ContextTarget::Missing(_) | ContextTarget::Loading(_) | ContextTarget::Failed => {
                    Value::empty()
                }
            },
            ExprKind::Template(template) => self.eval_bracket(template),
            ExprKind::Subtemplate(name) => self.invoke_subtemplate(name, expr.span),
            ExprKind::ContextSwitch {
                context,
                body,
                aggregate,
            } => self.switch_context(context, body, *aggregate),
            ExprKind::Invocation { target, calls } => self.invoke_methods(target, calls),
            ExprKind::Conditional {
                predicate,
                then,
                otherwise,
            } => {
                if self.test(predicate) {
                    self.eval_expr(then)
                } else {
                    otherwise
                        .as_ref()
                        .map_or_else(Value::empty, |otherwise| self.eval_expr(otherwise))
                }
            }
            ExprKind::Logical { .. } | ExprKind::Comparison { .. } | ExprKind::Not(_) => {
                Value::bool(self.test(expr))
            }
        }
    }

    // =========================================================================
    // Identifier resolution
    // =========================================================================

    fn resolve_path(&mut self, path: &str) -> Value {
        if let Some(name) = self.annotations.value_function.clone() {
            if let Some(function) = self.host.value_function(&name) {
                if let Some(value) = function(path, &self.context) {
                    return value;
                }
            }
        }
        match self.lookup(path) {
            None => self.missing(path),
            Some(Entry::Scalar(scalar)) => self.scalar_value(path, scalar),
            Some(Entry::Node(node)) if node.is_scalar_list() => Value::List(
                node.elements()
                    .into_iter()
                    .filter_map(|element| element.wrapped_scalar())
                    .map(|scalar| self.scalar_value(path, scalar))
                    .collect(),
            ),
            Some(Entry::Node(node)) => match node.wrapped_scalar() {
                Some(scalar) => self.scalar_value(path, scalar),
                None => Value::Data(node),
            },
        }
    }

    /// Look a dotted path up in the current context. `$` bindings are
    /// searched for in the context and its ancestors.
    pub(super) fn lookup(&self, path: &str) -> Option<Entry> {
        if !path.starts_with('$') {
            return self.context.get_value(path);
        }
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        let mut scope = Some(self.context.clone());
        while let Some(node) = scope {
            if let Some(entry) = node.get(first) {
                return match rest {
                    None => Some(entry),
                    Some(rest) => entry.as_node()?.get_value(rest),
                };
            }
            scope = node.parent();
        }
        None
    }

    /// Apply date detection, encoding and multi-line handling to a scalar
    /// found under `key`.
    fn scalar_value(&self, key: &str, scalar: Scalar) -> Value {
        if let Some(test) = &self.annotations.date_test {
            if test.is_match(key) {
                if let Some(instant) = parse_date(&scalar.as_text()) {
                    return Value::Date {
                        instant,
                        original: scalar.to_string(),
                        format: self.annotations.date_format.clone(),
                        mode: self.annotations.date_format_mode,
                    };
                }
            }
        }
        match scalar {
            Scalar::Text(text) => {
                let text = match self.annotations.encoding {
                    Some(encoding) => encode(encoding, &text),
                    None => text,
                };
                if text.contains('\n') {
                    Value::Multiline {
                        text,
                        style: self.annotations.multiline_style.unwrap_or_default(),
                    }
                } else {
                    Value::text(text)
                }
            }
            other => Value::Scalar(other),
        }
    }

    fn meta(&mut self, name: Option<&str>, span: Span) -> Value {
        match name {
            None => Value::text(self.annotations.describe()),
            Some("Tokens") => Value::text(token_trace(&tokenize(&self.source))),
            Some("Tree") => match self.origins.first() {
                Some(origin) => Value::text(format!("{:#?}", origin.template.tree)),
                None => Value::empty(),
            },
            Some(name) => match self.annotations.get(name) {
                Some(value) => Value::text(value),
                None if Annotations::NAMES.contains(&name) => self.missing(&format!("@.{name}")),
                None => self.error_at(
                    span,
                    ErrorKind::General,
                    format!("unknown meta key '@.{name}'"),
                ),
            },
        }
    }

    // =========================================================================
    // Context switches
    // =========================================================================

    fn switch_context(&mut self, context: &Expr, body: &Expr, aggregate: bool) -> Value {
        let errors_before = self.errors.len();
        match self.resolve_context(context) {
            ContextTarget::Data(node) => {
                self.rollback_errors(errors_before);
                self.with_context(node, None, |ev| {
                    ev.no_broadcast = aggregate;
                    let value = ev.eval_expr(body);
                    ev.no_broadcast = false;
                    value
                })
            }
            ContextTarget::Missing(key) => self.missing(&key),
            ContextTarget::Loading(url) => Value::text(format!("loading {url}…")),
            ContextTarget::Failed => {
                self.with_context(TemplateData::dictionary(), None, |ev| ev.eval_expr(body))
            }
            ContextTarget::Error(value) => value,
        }
    }

    fn resolve_context(&mut self, expr: &Expr) -> ContextTarget {
        match &expr.kind {
            ExprKind::Json(text) => self.json_context(text, expr.span),
            ExprKind::Path(path) => match self.lookup(path) {
                Some(Entry::Node(node)) => ContextTarget::Data(node),
                Some(Entry::Scalar(scalar)) => self.scalar_context(scalar, expr.span),
                None => ContextTarget::Missing(path.clone()),
            },
            _ => match self.eval_expr(expr) {
                Value::Data(node) => ContextTarget::Data(node),
                Value::Scalar(scalar) => self.scalar_context(scalar, expr.span),
                Value::Missing { key, .. } => ContextTarget::Missing(key),
                Value::Error(message) => ContextTarget::Error(Value::Error(message)),
                Value::Null => ContextTarget::Missing(String::new()),
                value @ (Value::Aggregate(_) | Value::List(_)) => {
                    let elements = value
                        .items()
                        .unwrap_or_default()
                        .iter()
                        .map(value_to_node)
                        .collect();
                    let list = TemplateData::list_of(elements);
                    if list.parent().is_none() {
                        list.set_parent(Some(&self.context));
                    }
                    ContextTarget::Data(list)
                }
                other => self.scalar_context(Scalar::Text(render(&other)), expr.span),
            },
        }
    }

    fn scalar_context(&mut self, scalar: Scalar, span: Span) -> ContextTarget {
        let text = scalar.as_text().into_owned();
        if is_remote(&text) {
            return self.remote_context(&text, span);
        }
        let node = TemplateData::wrap_scalar(scalar);
        node.set_parent(Some(&self.context));
        ContextTarget::Data(node)
    }

    fn json_context(&mut self, text: &str, span: Span) -> ContextTarget {
        match TemplateData::parse(text) {
            Ok(node) => {
                node.set_parent(Some(&self.context));
                ContextTarget::Data(node)
            }
            Err(error) => {
                ContextTarget::Error(self.error_at(span, ErrorKind::General, error.to_string()))
            }
        }
    }

    fn remote_context(&mut self, url: &str, span: Span) -> ContextTarget {
        match self.fetch(url) {
            FetchState::Ready(text) => match TemplateData::parse(&text) {
                Ok(node) => {
                    node.set_parent(Some(&self.context));
                    ContextTarget::Data(node)
                }
                Err(error) => {
                    self.error_at(
                        span,
                        ErrorKind::Loading,
                        format!("invalid data from '{url}': {error}"),
                    );
                    ContextTarget::Failed
                }
            },
            FetchState::Failed(message) => {
                self.error_at(span, ErrorKind::Loading, message);
                ContextTarget::Failed
            }
            FetchState::Pending => ContextTarget::Loading(url.to_string()),
        }
    }

    // =========================================================================
    // Sub-templates
    // =========================================================================

    fn invoke_subtemplate(&mut self, name: &str, span: Span) -> Value {
        if self.depth >= self.max_depth {
            return self.error_at(
                span,
                ErrorKind::General,
                format!("too many levels of recursion (#{name})"),
            );
        }
        let record = match self.find_subtemplate(name, span) {
            Ok(record) => record,
            Err(value) => return value,
        };
        let body = self.cache.body(&record.raw);
        if self.reported.insert(record.raw.clone()) {
            for error in &body.errors {
                let located = LocatedError::locate(error.clone(), &body.index, record.origin);
                self.errors.push(located.into());
            }
        }

        self.depth += 1;
        self.scopes.push(record.nested.clone());
        self.origins.push(Origin {
            template: Rc::clone(&body),
            position: record.origin,
        });
        trace!(name, depth = self.depth, "invoking sub-template");
        let value = self.eval_template(&body.tree);
        self.origins.pop();
        self.scopes.pop();
        self.depth -= 1;
        value
    }

    /// Local scopes innermost first, then the document, then the remote
    /// `/subtemplate/<name>` location.
    fn find_subtemplate(&mut self, name: &str, span: Span) -> Result<Rc<SubtemplateRecord>, Value> {
        let local = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.document.get(name));
        if let Some(record) = local {
            return Ok(Rc::clone(record));
        }

        let url = format!("/subtemplate/{name}");
        match self.fetch(&url) {
            FetchState::Ready(text) => match extract_fetched(name, &text) {
                Ok((record, errors)) => {
                    if self.reported.insert(url) {
                        self.errors.extend(errors.into_iter().map(TemplateError::from));
                    }
                    Ok(Rc::new(record))
                }
                Err(located) => Err(self.error_at(
                    span,
                    ErrorKind::Loading,
                    format!("invalid sub-template #{name}: {}", located.error),
                )),
            },
            FetchState::Failed(message) => Err(self.error_at(
                span,
                ErrorKind::Loading,
                format!("sub-template #{name} could not be loaded: {message}"),
            )),
            FetchState::Pending => Err(Value::text(format!("loading {url}…"))),
        }
    }

    // =========================================================================
    // Method invocation
    // =========================================================================

    /// Apply annotations, evaluate the target, then apply methods in order.
    /// The annotation set is restored afterwards.
    fn invoke_methods(&mut self, target: &Expr, calls: &[MethodCall]) -> Value {
        let saved = self.annotations.clone();
        let mut loading = None;
        for call in calls.iter().filter(|call| call.is_annotation()) {
            match self.apply_annotation(call) {
                Ok(None) => {}
                Ok(Some(url)) => {
                    loading.get_or_insert(url);
                }
                Err(error) => {
                    self.error_at(call.span, ErrorKind::General, error.to_string());
                }
            }
        }
        if let Some(url) = loading {
            self.annotations = saved;
            return Value::text(format!("loading {url}…"));
        }
        let mut value = self.eval_expr(target);
        for call in calls.iter().filter(|call| !call.is_annotation()) {
            value = self.apply_method(value, call);
        }
        self.annotations = saved;
        value
    }

    fn apply_method(&mut self, target: Value, call: &MethodCall) -> Value {
        let result = match self.host.method(&call.name) {
            Some(method) => {
                let args = self.eval_args(call);
                method(&target, &args)
            }
            None => match MethodId::from_name(&call.name) {
                Some(id) if !id.is_annotation() => self.call_builtin(id, target, call),
                _ => Err(self.unknown_method(&call.name)),
            },
        };
        result.unwrap_or_else(|error| {
            self.error_at(call.span, ErrorKind::General, error.to_string())
        })
    }

    pub(super) fn unknown_method(&self, name: &str) -> MethodError {
        let mut available: Vec<&str> = MethodId::ALL.iter().map(|id| id.name()).collect();
        available.extend(self.host.method_names());
        MethodError::UnknownMethod {
            name: name.to_string(),
            suggestions: compute_suggestions(name, &available),
        }
    }

    pub(super) fn eval_args(&mut self, call: &MethodCall) -> Vec<Value> {
        call.args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Evaluate `expr` as a predicate. Missing fallbacks are suppressed and
    /// `&`/`|` short-circuit.
    pub(super) fn test(&mut self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Logical {
                op: LogicalOp::And,
                lhs,
                rhs,
            } => self.test(lhs) && self.test(rhs),
            ExprKind::Logical {
                op: LogicalOp::Or,
                lhs,
                rhs,
            } => self.test(lhs) || self.test(rhs),
            ExprKind::Not(inner) => !self.test(inner),
            ExprKind::Comparison { op, lhs, rhs } => {
                let lhs = self.eval_predicate_operand(lhs);
                let rhs = self.eval_predicate_operand(rhs);
                compare(*op, &lhs, &rhs)
            }
            _ => {
                let value = self.eval_predicate_operand(expr);
                self.truthy(&value)
            }
        }
    }

    fn eval_predicate_operand(&mut self, expr: &Expr) -> Value {
        self.suppress_missing += 1;
        let value = self.eval_expr(expr);
        self.suppress_missing -= 1;
        value
    }

    /// Truthiness: not missing, null or an error, not empty, and not
    /// matching the falsy pattern.
    pub(super) fn truthy(&self, value: &Value) -> bool {
        match value {
            Value::Missing { .. } | Value::Null | Value::Error(_) => false,
            Value::Scalar(Scalar::Bool(flag)) => *flag,
            Value::Data(node) => node.count() > 0,
            Value::Aggregate(items) | Value::List(items) => !items.is_empty(),
            other => {
                let text = render(other);
                !text.is_empty() && !self.annotations.is_falsy(&text)
            }
        }
    }
}

/// Compare two values. Numeric when both sides are numeric literals,
/// textual otherwise. A missing side only equals another missing side and
/// never orders.
fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match (lhs.is_missing(), rhs.is_missing()) {
        (true, true) => return op == CompareOp::Eq,
        (true, false) | (false, true) => return op == CompareOp::Ne,
        (false, false) => {}
    }
    let (left, right) = (render(lhs), render(rhs));
    let ordering = if is_numeric_literal(&left) && is_numeric_literal(&right) {
        let parse = |text: &str| text.trim().parse::<f64>().unwrap_or_default();
        parse(&left).partial_cmp(&parse(&right))
    } else {
        Some(left.cmp(&right))
    };
    let Some(ordering) = ordering else {
        return op == CompareOp::Ne;
    };
    match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Ge => ordering.is_ge(),
    }
}

/// Contexts given as strings starting with `http` or `/` are fetched.
fn is_remote(text: &str) -> bool {
    text.starts_with("http") || text.starts_with('/')
}

/// A data node for a value, wrapping scalars.
pub(super) fn value_to_node(value: &Value) -> TemplateData {
    match value {
        Value::Data(node) => node.clone(),
        Value::Scalar(scalar) => TemplateData::wrap_scalar(scalar.clone()),
        other => TemplateData::wrap_scalar(Scalar::Text(render(other))),
    }
}
