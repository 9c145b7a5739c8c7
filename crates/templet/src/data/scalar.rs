use std::borrow::Cow;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde_json::{Number, Value as JsonValue};

/// A leaf value stored in a data dictionary.
///
/// # Example
///
/// ```
/// use templet::Scalar;
///
/// let count: Scalar = 3.into();
/// assert_eq!(count.to_string(), "3");
/// assert!(Scalar::from("3").is_numeric());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A text value.
    Text(String),
    /// A JSON number, kept in its original representation.
    Number(Number),
    /// A boolean.
    Bool(bool),
}

impl Scalar {
    /// Convert a JSON leaf into a scalar. Objects, arrays and null yield `None`.
    pub fn from_json(value: &JsonValue) -> Option<Scalar> {
        match value {
            JsonValue::String(s) => Some(Scalar::Text(s.clone())),
            JsonValue::Number(n) => Some(Scalar::Number(n.clone())),
            JsonValue::Bool(b) => Some(Scalar::Bool(*b)),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Scalar::Text(s) => JsonValue::String(s.clone()),
            Scalar::Number(n) => JsonValue::Number(n.clone()),
            Scalar::Bool(b) => JsonValue::Bool(*b),
        }
    }

    /// The text form used for output, comparisons and bucketing.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s),
            Scalar::Number(n) => Cow::Owned(n.to_string()),
            Scalar::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }

    /// A count or position as a number.
    pub fn count(n: usize) -> Scalar {
        Scalar::Number((n as u64).into())
    }

    /// True when the text form matches the numeric-literal pattern.
    pub fn is_numeric(&self) -> bool {
        match self {
            Scalar::Number(_) => true,
            Scalar::Text(s) => is_numeric_literal(s),
            Scalar::Bool(_) => false,
        }
    }

    /// The numeric value, if the text form is a numeric literal.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            Scalar::Text(s) if is_numeric_literal(s) => s.trim().parse().ok(),
            Scalar::Text(_) | Scalar::Bool(_) => None,
        }
    }
}

/// Matches `-?digits(.digits)?` with optional surrounding blanks.
pub fn is_numeric_literal(text: &str) -> bool {
    let text = text.trim();
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    all_digits(whole) && fraction.is_none_or(all_digits)
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        match Number::from_f64(n) {
            Some(number) => Scalar::Number(number),
            None => Scalar::Text(n.to_string()),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literal_pattern() {
        assert!(is_numeric_literal("42"));
        assert!(is_numeric_literal("-3.5"));
        assert!(is_numeric_literal(" 7 "));
        assert!(!is_numeric_literal("3."));
        assert!(!is_numeric_literal(".5"));
        assert!(!is_numeric_literal("1e5"));
        assert!(!is_numeric_literal(""));
    }

    #[test]
    fn text_form_of_numbers_and_bools() {
        assert_eq!(Scalar::from(12).as_text(), "12");
        assert_eq!(Scalar::from(true).as_text(), "true");
        assert_eq!(Scalar::from("9").as_f64(), Some(9.0));
    }
}
