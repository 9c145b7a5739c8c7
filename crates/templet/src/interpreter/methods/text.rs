//! String operations. Positions and widths count grapheme clusters.

use icu_casemap::CaseMapper;
use icu_locale_core::langid;
use unicode_segmentation::UnicodeSegmentation;

use crate::compose::render;
use crate::interpreter::value::Value;

/// Apply `f` to the text of `value`, element-wise over lists. Missing values,
/// errors and nulls pass through.
pub(super) fn map_text(value: Value, f: &dyn Fn(&str) -> Value) -> Value {
    match value {
        Value::Missing { .. } | Value::Error(_) | Value::Null => value,
        Value::List(items) => {
            Value::List(items.into_iter().map(|item| map_text(item, f)).collect())
        }
        Value::Aggregate(items) => {
            Value::Aggregate(items.into_iter().map(|item| map_text(item, f)).collect())
        }
        Value::Data(node) if node.is_list() => Value::List(
            node.elements()
                .into_iter()
                .map(|element| map_text(Value::from_node(element), f))
                .collect(),
        ),
        other => f(&render(&other)),
    }
}

pub(super) fn to_upper(text: &str) -> String {
    CaseMapper::new()
        .uppercase_to_string(text, &langid!("und"))
        .to_string()
}

pub(super) fn to_lower(text: &str) -> String {
    CaseMapper::new()
        .lowercase_to_string(text, &langid!("und"))
        .to_string()
}

/// Graphemes from `start`, at most `length` of them. Out-of-range requests
/// yield what is available.
pub(super) fn substr(text: &str, start: i64, length: Option<i64>) -> String {
    let start = usize::try_from(start).unwrap_or_default();
    let graphemes = text.graphemes(true).skip(start);
    match length {
        Some(length) => graphemes
            .take(usize::try_from(length).unwrap_or_default())
            .collect(),
        None => graphemes.collect(),
    }
}

fn grapheme_count(text: &str) -> i64 {
    i64::try_from(text.graphemes(true).count()).unwrap_or(i64::MAX)
}

/// Grapheme index of the first match, or -1.
pub(super) fn index_of(text: &str, needle: &str) -> i64 {
    text.find(needle)
        .map_or(-1, |byte| grapheme_count(&text[..byte]))
}

/// Grapheme index just past the first match, or -1.
pub(super) fn end_index_of(text: &str, needle: &str) -> i64 {
    text.find(needle)
        .map_or(-1, |byte| grapheme_count(&text[..byte + needle.len()]))
}

/// Grapheme index of the last match, or -1.
pub(super) fn last_index_of(text: &str, needle: &str) -> i64 {
    text.rfind(needle)
        .map_or(-1, |byte| grapheme_count(&text[..byte]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Side {
    Left,
    Right,
    Center,
}

impl Side {
    pub(super) fn parse(text: &str) -> Option<Side> {
        match text {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            "center" => Some(Side::Center),
            _ => None,
        }
    }
}

/// Pad `text` to `width` graphemes. The text itself is never cut; the pad
/// string repeats and is truncated to fit.
pub(super) fn align(text: &str, width: usize, side: Side, pad: &str) -> String {
    let length = text.graphemes(true).count();
    if length >= width || pad.is_empty() {
        return text.to_string();
    }
    let fill = width - length;
    let padding = |n: usize| -> String { pad.graphemes(true).cycle().take(n).collect() };
    match side {
        Side::Left => format!("{text}{}", padding(fill)),
        Side::Right => format!("{}{text}", padding(fill)),
        Side::Center => {
            let before = fill.div_euclid(2);
            format!("{}{text}{}", padding(before), padding(fill - before))
        }
    }
}
