//! Semi-structured data model used as the evaluation context.
//!
//! A [`TemplateData`] node is either a dictionary of named entries or a list
//! of nodes. Nodes are reference counted and keep a weak link to their
//! parent so that `^` lookups can walk outwards without owning anything.
//!
//! Construction from JSON enforces the model's invariants:
//! - `null` values and empty arrays are dropped from dictionaries
//! - single-element arrays collapse to their sole element
//! - scalar list elements are wrapped in a dictionary keyed `_`

mod scalar;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub use scalar::{Scalar, is_numeric_literal};

/// Key used for the wrapper dictionary around scalar list elements.
pub const SCALAR_KEY: &str = "_";

/// Errors produced while building data from text.
#[derive(Debug, Error)]
pub enum DataError {
    /// The text is not a valid JSON literal.
    #[error("invalid literal at {line}:{column}: {message}")]
    InvalidLiteral {
        line: usize,
        column: usize,
        message: String,
    },
}

/// An entry of a data dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Scalar(Scalar),
    Node(TemplateData),
}

impl Entry {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Entry::Scalar(s) => Some(s),
            Entry::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&TemplateData> {
        match self {
            Entry::Node(n) => Some(n),
            Entry::Scalar(_) => None,
        }
    }

    /// Wrap this entry as a standalone node (scalars become `_` wrappers).
    pub fn into_node(self) -> TemplateData {
        match self {
            Entry::Node(n) => n,
            Entry::Scalar(s) => TemplateData::wrap_scalar(s),
        }
    }
}

impl From<Scalar> for Entry {
    fn from(s: Scalar) -> Self {
        Entry::Scalar(s)
    }
}

impl From<TemplateData> for Entry {
    fn from(n: TemplateData) -> Self {
        Entry::Node(n)
    }
}

enum Body {
    Dictionary(IndexMap<String, Entry>),
    List(Vec<TemplateData>),
}

struct DataNode {
    parent: RefCell<Weak<DataNode>>,
    body: RefCell<Body>,
}

/// One node of the evaluation context.
///
/// Cloning a `TemplateData` handle aliases the same node; use
/// [`TemplateData::duplicate`] for an independent structural copy.
///
/// # Example
///
/// ```
/// use templet::TemplateData;
///
/// let data = TemplateData::parse(r#"{"people": [{"name": "Ann"}, {"name": "Bo"}]}"#).unwrap();
/// let names = data.get_value("people.name").unwrap();
/// assert_eq!(names.into_node().count(), 2);
/// ```
#[derive(Clone)]
pub struct TemplateData(Rc<DataNode>);

impl TemplateData {
    fn from_body(body: Body) -> Self {
        TemplateData(Rc::new(DataNode {
            parent: RefCell::new(Weak::new()),
            body: RefCell::new(body),
        }))
    }

    /// An empty dictionary node.
    pub fn dictionary() -> Self {
        Self::from_body(Body::Dictionary(IndexMap::new()))
    }

    /// A dictionary holding a single scalar under `_`.
    pub fn wrap_scalar(scalar: Scalar) -> Self {
        let node = Self::dictionary();
        node.add(SCALAR_KEY, Entry::Scalar(scalar));
        node
    }

    /// A list view over existing nodes. The elements keep their own parents.
    ///
    /// A single element collapses to that element.
    pub fn list_of(mut elements: Vec<TemplateData>) -> Self {
        if elements.len() == 1 {
            return elements.remove(0);
        }
        Self::from_body(Body::List(elements))
    }

    /// A list that adopts freshly built elements as its children.
    ///
    /// A single element collapses to that element, which is then parented
    /// to `parent`.
    pub fn adopt_list(elements: Vec<TemplateData>, parent: Option<&TemplateData>) -> Self {
        let list = Self::list_of(elements);
        if list.is_list() {
            for element in list.elements() {
                element.set_parent(Some(&list));
            }
        }
        list.set_parent(parent);
        list
    }

    /// Parse JSON text into a node.
    pub fn parse(text: &str) -> Result<Self, DataError> {
        let json: JsonValue =
            serde_json::from_str(text).map_err(|e| DataError::InvalidLiteral {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            })?;
        Ok(Self::from_json(&json))
    }

    /// Build a node from JSON, applying the construction invariants.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Object(map) => {
                let node = Self::dictionary();
                for (key, value) in map {
                    if let Some(entry) = Self::entry_from_json(value) {
                        node.add(key, entry);
                    }
                }
                node
            }
            JsonValue::Array(items) => {
                let elements: Vec<TemplateData> = items
                    .iter()
                    .filter_map(Self::entry_from_json)
                    .map(Entry::into_node)
                    .collect();
                Self::adopt_list(elements, None)
            }
            JsonValue::Null => Self::dictionary(),
            JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => {
                Scalar::from_json(json).map_or_else(Self::dictionary, Self::wrap_scalar)
            }
        }
    }

    /// Convert a JSON value to a dictionary entry, or `None` when it is
    /// dropped (null, empty array, array of nulls).
    fn entry_from_json(value: &JsonValue) -> Option<Entry> {
        match value {
            JsonValue::Null => None,
            JsonValue::Array(items) => {
                let kept: Vec<&JsonValue> = items.iter().filter(|v| !v.is_null()).collect();
                match kept.as_slice() {
                    [] => None,
                    [only] => Self::entry_from_json(only),
                    _ => Some(Entry::Node(Self::from_json(value))),
                }
            }
            JsonValue::Object(_) => Some(Entry::Node(Self::from_json(value))),
            JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => {
                Scalar::from_json(value).map(Entry::Scalar)
            }
        }
    }

    // =========================================================================
    // Structure
    // =========================================================================

    pub fn is_list(&self) -> bool {
        matches!(&*self.0.body.borrow(), Body::List(_))
    }

    /// True when both handles point at the same node.
    pub fn ptr_eq(&self, other: &TemplateData) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The direct parent node, if any.
    pub fn parent(&self) -> Option<TemplateData> {
        self.0.parent.borrow().upgrade().map(TemplateData)
    }

    pub fn set_parent(&self, parent: Option<&TemplateData>) {
        *self.0.parent.borrow_mut() = parent.map_or_else(Weak::new, |p| Rc::downgrade(&p.0));
    }

    /// The enclosing scope for `^`: the parent, skipping list nodes.
    pub fn scope_parent(&self) -> Option<TemplateData> {
        let mut current = self.parent();
        while let Some(node) = current {
            if !node.is_list() {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    /// List elements; a dictionary yields itself as the only element.
    pub fn elements(&self) -> Vec<TemplateData> {
        match &*self.0.body.borrow() {
            Body::List(items) => items.clone(),
            Body::Dictionary(_) => vec![self.clone()],
        }
    }

    /// Dictionary keys in insertion order (empty for lists).
    pub fn keys(&self) -> Vec<String> {
        match &*self.0.body.borrow() {
            Body::Dictionary(map) => map.keys().cloned().collect(),
            Body::List(_) => Vec::new(),
        }
    }

    /// Number of list elements, or number of dictionary keys.
    pub fn count(&self) -> usize {
        match &*self.0.body.borrow() {
            Body::Dictionary(map) => map.len(),
            Body::List(items) => items.len(),
        }
    }

    /// True iff this is a list whose every element is a `_` scalar wrapper.
    pub fn is_scalar_list(&self) -> bool {
        match &*self.0.body.borrow() {
            Body::List(items) => items.iter().all(|item| item.wrapped_scalar().is_some()),
            Body::Dictionary(_) => false,
        }
    }

    /// The scalar held by a `_` wrapper dictionary.
    pub fn wrapped_scalar(&self) -> Option<Scalar> {
        match &*self.0.body.borrow() {
            Body::Dictionary(map) if map.len() == 1 => {
                map.get(SCALAR_KEY).and_then(Entry::as_scalar).cloned()
            }
            Body::Dictionary(_) | Body::List(_) => None,
        }
    }

    /// Insert or replace a dictionary entry. Nested nodes are re-parented
    /// to this node. Has no effect on lists.
    pub fn add(&self, key: impl Into<String>, entry: Entry) {
        if let Entry::Node(child) = &entry {
            child.set_parent(Some(self));
        }
        if let Body::Dictionary(map) = &mut *self.0.body.borrow_mut() {
            map.insert(key.into(), entry);
        }
    }

    /// Remove a dictionary entry, returning it.
    pub fn remove(&self, key: &str) -> Option<Entry> {
        match &mut *self.0.body.borrow_mut() {
            Body::Dictionary(map) => map.shift_remove(key),
            Body::List(_) => None,
        }
    }

    /// Direct dictionary lookup of one key.
    pub fn get(&self, key: &str) -> Option<Entry> {
        match &*self.0.body.borrow() {
            Body::Dictionary(map) => map.get(key).cloned(),
            Body::List(_) => None,
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolve a dotted key against this node.
    ///
    /// `*` names this node and `^` the enclosing scope (this node at the
    /// root). On a list, a path whose first segment misses is evaluated
    /// against every element and the hits are re-aggregated.
    pub fn get_value(&self, dotted_key: &str) -> Option<Entry> {
        let segments: Vec<&str> = dotted_key.split('.').collect();
        self.resolve_path(&segments)
    }

    fn resolve_path(&self, segments: &[&str]) -> Option<Entry> {
        let (first, rest) = segments.split_first()?;
        let hit = self.get(first).or_else(|| match *first {
            "*" => Some(Entry::Node(self.clone())),
            "^" => Some(Entry::Node(
                self.scope_parent().unwrap_or_else(|| self.clone()),
            )),
            _ => None,
        });
        match hit {
            Some(entry) if rest.is_empty() => Some(entry),
            Some(Entry::Node(node)) => node.resolve_path(rest),
            Some(Entry::Scalar(_)) => None,
            None if self.is_list() => self.project(segments),
            None => None,
        }
    }

    fn project(&self, segments: &[&str]) -> Option<Entry> {
        let mut hits: Vec<Entry> = self
            .elements()
            .iter()
            .filter_map(|element| element.resolve_path(segments))
            .collect();
        match hits.len() {
            0 => None,
            1 => hits.pop(),
            _ => {
                let nodes = hits.into_iter().map(Entry::into_node).collect();
                let list = Self::list_of(nodes);
                list.set_parent(Some(self));
                Some(Entry::Node(list))
            }
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Convert to JSON. A node reached a second time becomes `null`.
    pub fn to_json(&self) -> JsonValue {
        let mut seen = HashSet::new();
        self.to_json_tracked(&mut seen)
    }

    fn to_json_tracked(&self, seen: &mut HashSet<*const DataNode>) -> JsonValue {
        if !seen.insert(Rc::as_ptr(&self.0)) {
            return JsonValue::Null;
        }
        if let Some(scalar) = self.wrapped_scalar() {
            return scalar.to_json();
        }
        match &*self.0.body.borrow() {
            Body::Dictionary(map) => {
                let mut object = Map::new();
                for (key, entry) in map {
                    let value = match entry {
                        Entry::Scalar(s) => s.to_json(),
                        Entry::Node(n) => n.to_json_tracked(seen),
                    };
                    object.insert(key.clone(), value);
                }
                JsonValue::Object(object)
            }
            Body::List(items) => {
                JsonValue::Array(items.iter().map(|i| i.to_json_tracked(seen)).collect())
            }
        }
    }

    /// Serialize to JSON text; `indent` spaces per level, `0` for compact.
    pub fn to_canonical_text(&self, indent: usize) -> String {
        let json = self.to_json();
        if indent == 0 {
            return json.to_string();
        }
        let pad = " ".repeat(indent);
        let mut out = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(pad.as_bytes()));
        match json.serialize(&mut serializer) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => json.to_string(),
        }
    }

    /// An independent structural copy (serialize, then reparse).
    pub fn duplicate(&self) -> TemplateData {
        Self::from_json(&self.to_json())
    }
}

impl Debug for TemplateData {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "TemplateData({})", self.to_canonical_text(0))
    }
}

/// Structural equality.
impl PartialEq for TemplateData {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.to_json() == other.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_nulls_and_empty_arrays() {
        let data = TemplateData::from_json(&json!({"a": null, "b": [], "c": 1}));
        assert_eq!(data.keys(), vec!["c".to_string()]);
    }

    #[test]
    fn single_element_array_collapses() {
        let data = TemplateData::from_json(&json!({"tags": ["x"], "people": [{"n": 1}]}));
        assert_eq!(data.get("tags"), Some(Entry::Scalar("x".into())));
        let people = data.get("people").unwrap().into_node();
        assert!(!people.is_list());
        assert_eq!(people.get_value("n"), Some(Entry::Scalar(1.into())));
    }

    #[test]
    fn scalar_lists_are_wrapped() {
        let data = TemplateData::from_json(&json!({"tags": ["x", "y"]}));
        let tags = data.get("tags").unwrap().into_node();
        assert!(tags.is_scalar_list());
        assert_eq!(tags.count(), 2);
        assert_eq!(data.to_json(), json!({"tags": ["x", "y"]}));
    }

    #[test]
    fn caret_walks_to_enclosing_dictionary() {
        let data = TemplateData::from_json(&json!({"title": "T", "items": [{"n": 1}, {"n": 2}]}));
        let items = data.get("items").unwrap().into_node();
        let first = items.elements().remove(0);
        assert_eq!(first.get_value("^.title"), Some(Entry::Scalar("T".into())));
        // At the root `^` is the node itself.
        assert_eq!(data.get_value("^.title"), Some(Entry::Scalar("T".into())));
        assert_eq!(first.get_value("*.n"), Some(Entry::Scalar(1.into())));
    }

    #[test]
    fn list_projection_aggregates_hits() {
        let data = TemplateData::from_json(&json!([{"a": 1}, {"b": 2}, {"a": 3}]));
        let hits = data.get_value("a").unwrap().into_node();
        assert_eq!(hits.to_json(), json!([1, 3]));
        assert_eq!(data.get_value("b"), Some(Entry::Scalar(2.into())));
        assert_eq!(data.get_value("zzz"), None);
    }

    #[test]
    fn repeated_node_serializes_as_null() {
        let root = TemplateData::dictionary();
        let child = TemplateData::wrap_scalar("v".into());
        child.add("k", Entry::Scalar(1.into()));
        root.add("first", Entry::Node(child.clone()));
        root.add("second", Entry::Node(child));
        assert_eq!(
            root.to_json(),
            json!({"first": {"_": "v", "k": 1}, "second": null})
        );
    }

    #[test]
    fn cycle_does_not_loop() {
        let root = TemplateData::dictionary();
        let child = TemplateData::dictionary();
        root.add("child", Entry::Node(child.clone()));
        child.add("back", Entry::Node(root.clone()));
        assert_eq!(root.to_canonical_text(0), r#"{"child":{"back":null}}"#);
    }

    #[test]
    fn duplicate_is_independent() {
        let data = TemplateData::from_json(&json!({"a": 1}));
        let copy = data.duplicate();
        copy.add("b", Entry::Scalar(2.into()));
        assert_eq!(data.keys(), vec!["a".to_string()]);
        assert_eq!(copy.count(), 2);
    }

    #[test]
    fn invalid_literal_is_typed_error() {
        let err = TemplateData::parse("{oops").unwrap_err();
        assert!(err.to_string().starts_with("invalid literal"));
    }
}
