//! Intermediate evaluation results.

use chrono::{DateTime, FixedOffset};

use super::annotations::{BulletMode, DateFormatMode, MultilineStyle};
use crate::data::{Scalar, TemplateData};

/// The result of evaluating a template node.
///
/// Composition turns a tree of values into text; see [`crate::compose`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    /// A data node: a dictionary or a list of dictionaries.
    Data(TemplateData),
    /// An unresolved lookup. Renders as the fallback, or nothing.
    Missing {
        key: String,
        fallback: Option<String>,
    },
    Date {
        instant: DateTime<FixedOffset>,
        original: String,
        format: Option<String>,
        mode: DateFormatMode,
    },
    /// An auto-numbered marker and the rest of its line.
    Bullet {
        children: Vec<Value>,
        default_indent: usize,
        styles: Option<Vec<String>>,
        mode: BulletMode,
    },
    Multiline {
        text: String,
        style: MultilineStyle,
    },
    /// One value per element of a list context.
    Aggregate(Vec<Value>),
    /// The elements of a scalar list.
    List(Vec<Value>),
    /// Segments of a template, rendered inline one after another.
    Seq(Vec<Value>),
    /// Deletes the line it is rendered on.
    Null,
    /// A local failure, rendered as `ERROR: message`.
    Error(String),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Value {
        Value::Scalar(Scalar::Text(text.into()))
    }

    pub fn empty() -> Value {
        Value::text("")
    }

    pub fn bool(value: bool) -> Value {
        Value::Scalar(Scalar::Bool(value))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing { .. })
    }

    /// Missing values and errors pass through most methods unchanged.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Value::Missing { .. } | Value::Error(_) | Value::Null)
    }

    /// A single-segment sequence is its segment.
    pub fn flatten(self) -> Value {
        match self {
            Value::Seq(mut items) if items.len() == 1 => items.remove(0).flatten(),
            other => other,
        }
    }

    /// The element values of list-like values, or `None` for single values.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Aggregate(items) | Value::List(items) => Some(items.clone()),
            Value::Data(node) if node.is_list() => {
                Some(node.elements().into_iter().map(Value::from_node).collect())
            }
            _ => None,
        }
    }

    /// A value for a data node: its scalar when it wraps one.
    pub fn from_node(node: TemplateData) -> Value {
        match node.wrapped_scalar() {
            Some(scalar) => Value::Scalar(scalar),
            None => Value::Data(node),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::text(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::text(text)
    }
}
