//! Structural operations over lists and data nodes.

use std::collections::BTreeMap;

use regex::Regex;

use super::{invalid, text};
use crate::compose::render;
use crate::data::{Entry, Scalar, TemplateData};
use crate::interpreter::error::MethodError;
use crate::interpreter::evaluator::{Evaluator, value_to_node};
use crate::interpreter::value::Value;
use crate::parser::{Expr, ExprKind, MethodCall};

/// `Count()`: elements of a list, 1 for a single value, 0 when missing.
pub(super) fn count(value: &Value) -> Value {
    let n = match value {
        Value::Missing { .. } | Value::Null => 0,
        Value::Error(_) => return value.clone(),
        Value::List(items) | Value::Aggregate(items) => items.len(),
        Value::Data(node) if node.is_list() => node.count(),
        _ => 1,
    };
    Value::Scalar(Scalar::count(n))
}

/// `Join(separator, last)`: the non-empty element texts, with `last`
/// before the final one.
pub(super) fn join(value: &Value, separator: &str, last: &str) -> Value {
    let Some(items) = value.items() else {
        return value.clone();
    };
    let texts: Vec<String> = items
        .iter()
        .map(render)
        .filter(|text| !text.is_empty())
        .collect();
    let joined = match texts.split_last() {
        None => String::new(),
        Some((only, [])) => only.clone(),
        Some((final_text, init)) => format!("{}{last}{final_text}", init.join(separator)),
    };
    Value::text(joined)
}

/// `Index(n)`: the element at `n`, counting from the end when negative.
pub(super) fn element_at(value: &Value, n: i64) -> Option<Value> {
    let items = value.items().unwrap_or_else(|| vec![value.clone()]);
    let len = i64::try_from(items.len()).ok()?;
    let index = if n < 0 { len + n } else { n };
    usize::try_from(index)
        .ok()
        .and_then(|index| items.get(index).cloned())
}

/// `ToJson(indent)`: JSON text of the value, `null` when missing.
pub(super) fn to_json(value: &Value, indent: usize) -> Value {
    let node = match value {
        Value::Missing { .. } | Value::Null => return Value::text("null"),
        Value::Error(_) => return value.clone(),
        Value::Data(node) => node.clone(),
        Value::List(items) | Value::Aggregate(items) => {
            TemplateData::list_of(items.iter().map(value_to_node).collect())
        }
        other => value_to_node(other),
    };
    Value::text(node.to_canonical_text(indent))
}

/// A list result as a value. Lists of scalars become [`Value::List`].
fn list_value(node: TemplateData) -> Value {
    if node.is_list() && node.is_scalar_list() {
        Value::List(
            node.elements()
                .iter()
                .filter_map(TemplateData::wrapped_scalar)
                .map(Value::Scalar)
                .collect(),
        )
    } else {
        Value::from_node(node)
    }
}

fn entry_value(entry: Option<Entry>) -> Value {
    match entry {
        Some(Entry::Scalar(scalar)) => Value::Scalar(scalar),
        Some(Entry::Node(node)) => Value::from_node(node),
        None => Value::empty(),
    }
}

/// Add the bindings an element does not define itself. Returns the keys
/// that were added.
fn inject(element: &TemplateData, bindings: &[(String, Entry)]) -> Vec<String> {
    let mut injected = Vec::new();
    for (key, entry) in bindings {
        if element.is_list() || element.get(key).is_some() {
            continue;
        }
        let entry = match entry {
            Entry::Node(node) => Entry::Node(node.duplicate()),
            Entry::Scalar(scalar) => Entry::Scalar(scalar.clone()),
        };
        element.add(key.clone(), entry);
        injected.push(key.clone());
    }
    injected
}

#[derive(Default)]
struct OrderOptions {
    descending: bool,
    unique: bool,
}

impl Evaluator<'_> {
    /// `$`-prefixed entries of the context and its ancestors, innermost
    /// first.
    fn bindings(&self) -> Vec<(String, Entry)> {
        let mut found: Vec<(String, Entry)> = Vec::new();
        let mut scope = Some(self.context.clone());
        while let Some(node) = scope {
            for key in node.keys() {
                if !key.starts_with('$') || found.iter().any(|(seen, _)| *seen == key) {
                    continue;
                }
                if let Some(entry) = node.get(&key) {
                    found.push((key, entry));
                }
            }
            scope = node.parent();
        }
        found
    }

    /// The elements a structural method iterates over, and the node the
    /// result list is attached to.
    fn elements_of(&self, target: &Value) -> (Vec<TemplateData>, TemplateData) {
        match target {
            Value::Data(node) => (
                node.elements(),
                node.parent().unwrap_or_else(|| self.context.clone()),
            ),
            Value::List(items) | Value::Aggregate(items) => (
                items.iter().map(value_to_node).collect(),
                self.context.clone(),
            ),
            other => (vec![value_to_node(other)], self.context.clone()),
        }
    }

    /// Run `f` with `element` as context and the caller's bindings
    /// injected, removing them again afterwards.
    fn with_element<T>(
        &mut self,
        element: &TemplateData,
        position: usize,
        bindings: &[(String, Entry)],
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let injected = inject(element, bindings);
        let result = self.with_context(element.clone(), Some(position), f);
        for key in &injected {
            element.remove(key);
        }
        result
    }

    /// The sort or group key of the current element. A string argument
    /// names a path; anything else is evaluated.
    fn element_key(&mut self, key: &Expr) -> Value {
        match &key.kind {
            ExprKind::Literal(Scalar::Text(path)) => entry_value(self.lookup(path)),
            _ => self.eval_expr(key),
        }
    }

    /// Evaluate the key for every element: `(key value, element)` pairs.
    fn keyed_elements(&mut self, target: &Value, key: &Expr) -> Vec<(Value, TemplateData)> {
        let (elements, _) = self.elements_of(target);
        let bindings = self.bindings();
        elements
            .into_iter()
            .enumerate()
            .map(|(i, element)| {
                let value = self.with_element(&element, i, &bindings, |ev| ev.element_key(key));
                (value, element)
            })
            .collect()
    }

    /// `Where(predicate)`: copies of the elements for which the predicate
    /// holds.
    pub(super) fn filter(&mut self, target: Value, predicate: &Expr) -> Value {
        match target {
            Value::Missing { .. } => {
                return Value::Data(TemplateData::adopt_list(Vec::new(), Some(&self.context)));
            }
            Value::Error(_) | Value::Null => return target,
            _ => {}
        }
        let (elements, parent) = self.elements_of(&target);
        let bindings = self.bindings();
        let mut kept = Vec::new();
        for (i, element) in elements.iter().enumerate() {
            if self.with_element(element, i, &bindings, |ev| ev.test(predicate)) {
                kept.push(element.duplicate());
            }
        }
        list_value(TemplateData::adopt_list(kept, Some(&parent)))
    }

    /// `OrderBy(key, 'descending', 'unique')`: elements bucketed by key
    /// text in ascending order.
    pub(super) fn order_by(
        &mut self,
        target: Value,
        call: &MethodCall,
    ) -> Result<Value, MethodError> {
        if target.is_passthrough() {
            return Ok(target);
        }
        let mut options = OrderOptions::default();
        for i in 1..call.args.len() {
            let option = self.arg_text(call, i).unwrap_or_default();
            match option.to_ascii_lowercase().as_str() {
                "descending" => options.descending = true,
                "ascending" => options.descending = false,
                "unique" => options.unique = true,
                _ => return Err(invalid(call, format!("unknown option '{option}'"))),
            }
        }

        let (_, parent) = self.elements_of(&target);
        let mut buckets: BTreeMap<String, Vec<TemplateData>> = BTreeMap::new();
        for (key, element) in self.keyed_elements(&target, &call.args[0]) {
            let bucket = buckets.entry(render(&key)).or_default();
            if !options.unique || bucket.is_empty() {
                bucket.push(element.duplicate());
            }
        }
        let ordered: Vec<TemplateData> = if options.descending {
            buckets.into_values().rev().flatten().collect()
        } else {
            buckets.into_values().flatten().collect()
        };
        Ok(list_value(TemplateData::adopt_list(ordered, Some(&parent))))
    }

    /// `GroupBy(key, alias)`: one dictionary per distinct key, holding the
    /// key and the members under `alias`.
    pub(super) fn group_by(
        &mut self,
        target: Value,
        call: &MethodCall,
    ) -> Result<Value, MethodError> {
        if target.is_passthrough() {
            return Ok(target);
        }
        let key_expr = &call.args[0];
        let alias = self.arg_text(call, 1).unwrap_or_else(|| "group".to_string());
        if alias.is_empty() {
            return Err(invalid(call, "the group name is empty"));
        }
        let key_name = match &key_expr.kind {
            ExprKind::Literal(Scalar::Text(path)) | ExprKind::Path(path) => path
                .rsplit('.')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or("key")
                .to_string(),
            _ => "key".to_string(),
        };

        let (_, parent) = self.elements_of(&target);
        let mut buckets: BTreeMap<String, (Scalar, Vec<TemplateData>)> = BTreeMap::new();
        for (key, element) in self.keyed_elements(&target, key_expr) {
            let text = render(&key);
            let scalar = match key {
                Value::Scalar(scalar) => scalar,
                _ => Scalar::Text(text.clone()),
            };
            buckets
                .entry(text)
                .or_insert_with(|| (scalar, Vec::new()))
                .1
                .push(element.duplicate());
        }

        let groups = buckets
            .into_values()
            .map(|(key, members)| {
                let group = TemplateData::dictionary();
                group.add(key_name.clone(), Entry::Scalar(key));
                group.add(alias.clone(), Entry::Node(TemplateData::adopt_list(members, None)));
                group
            })
            .collect();
        Ok(Value::from_node(TemplateData::adopt_list(groups, Some(&parent))))
    }

    /// `Assert()` deletes the line when the target is falsy.
    /// `Assert(expected, message)` fails when the target text differs.
    pub(super) fn assert(
        &mut self,
        target: Value,
        call: &MethodCall,
    ) -> Result<Value, MethodError> {
        let Some(expected) = self.arg_text(call, 0) else {
            return Ok(if self.truthy(&target) {
                Value::empty()
            } else {
                Value::Null
            });
        };
        let actual = render(&target);
        if actual == expected {
            return Ok(Value::empty());
        }
        let message = self
            .arg_text(call, 1)
            .unwrap_or_else(|| format!("assertion failed: expected '{expected}', got '{actual}'"));
        Err(MethodError::AssertionFailed { message })
    }

    /// `Matches(pattern…)`: whether the text matches any pattern.
    pub(super) fn matches(
        &mut self,
        target: Value,
        call: &MethodCall,
    ) -> Result<Value, MethodError> {
        if target.is_missing() {
            return Ok(Value::bool(false));
        }
        let mut patterns = Vec::with_capacity(call.args.len());
        for i in 0..call.args.len() {
            let pattern = self.arg_text(call, i).unwrap_or_default();
            let regex = Regex::new(&pattern)
                .map_err(|error| invalid(call, format!("invalid pattern '{pattern}': {error}")))?;
            patterns.push(regex);
        }
        Ok(text::map_text(target, &|s| {
            Value::bool(patterns.iter().any(|regex| regex.is_match(s)))
        }))
    }

    /// `Case(v1, r1, v2, r2, …, default)`: the result paired with the first
    /// value equal to the target text. Results are evaluated lazily.
    pub(super) fn case(&mut self, target: &Value, call: &MethodCall) -> Value {
        let text = render(target);
        for (i, candidate) in call.args.iter().enumerate().step_by(2) {
            let Some(result) = call.args.get(i + 1) else {
                return self.eval_expr(candidate);
            };
            let candidate = self.eval_expr(candidate);
            if render(&candidate) == text {
                return self.eval_expr(result);
            }
        }
        Value::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::text(*s)).collect())
    }

    #[test]
    fn count_rules() {
        assert_eq!(count(&texts(&["a", "b"])), Value::Scalar(Scalar::count(2)));
        let missing = Value::Missing {
            key: "x".to_string(),
            fallback: None,
        };
        assert_eq!(count(&missing), Value::Scalar(Scalar::count(0)));
        let dictionary = TemplateData::parse(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(count(&Value::Data(dictionary)), Value::Scalar(Scalar::count(1)));
    }

    #[test]
    fn join_uses_last_separator() {
        let list = texts(&["a", "b", "c"]);
        assert_eq!(join(&list, ", ", " and "), Value::text("a, b and c"));
        assert_eq!(join(&texts(&["a"]), ", ", " and "), Value::text("a"));
        assert_eq!(join(&texts(&["a", "", "b"]), "-", "-"), Value::text("a-b"));
    }

    #[test]
    fn element_at_counts_from_either_end() {
        let list = texts(&["a", "b", "c"]);
        assert_eq!(element_at(&list, 0), Some(Value::text("a")));
        assert_eq!(element_at(&list, -1), Some(Value::text("c")));
        assert_eq!(element_at(&list, 3), None);
        assert_eq!(element_at(&list, -4), None);
    }

    #[test]
    fn to_json_of_values() {
        let missing = Value::Missing {
            key: "x".to_string(),
            fallback: None,
        };
        assert_eq!(to_json(&missing, 0), Value::text("null"));
        assert_eq!(to_json(&texts(&["a", "b"]), 0), Value::text(r#"["a","b"]"#));
        let data = TemplateData::parse(r#"{"a": [1, 2]}"#).unwrap();
        insta::assert_snapshot!(render(&to_json(&Value::Data(data), 2)), @r#"
        {
          "a": [
            1,
            2
          ]
        }
        "#);
    }
}
