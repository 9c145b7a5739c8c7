//! Date recognition and formatting.
//!
//! Format strings use moment-style tokens (`YYYY-MM-DD HH:mm`), translated
//! to chrono's strftime syntax. Text inside `[...]` is literal.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

use crate::compose::render;
use crate::interpreter::annotations::DateFormatMode;
use crate::interpreter::value::Value;

const DATE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Moment tokens, longest first so that `MMMM` wins over `MM`.
const TOKENS: [(&str, &str); 21] = [
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("DD", "%d"),
    ("D", "%-d"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("A", "%p"),
    ("a", "%P"),
    ("Z", "%:z"),
];

/// Recognise RFC 3339 timestamps, ISO-like date-times (taken as UTC) and
/// plain `YYYY-MM-DD` dates.
pub fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant);
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Render a date. Without a format the original text is kept.
pub fn format_date(
    instant: &DateTime<FixedOffset>,
    original: &str,
    format: Option<&str>,
    mode: DateFormatMode,
) -> String {
    let Some(format) = format else {
        return original.to_string();
    };
    let pattern = moment_to_strftime(format);
    match mode {
        DateFormatMode::Original => instant.format(&pattern).to_string(),
        DateFormatMode::Utc => instant.with_timezone(&Utc).format(&pattern).to_string(),
        DateFormatMode::Local => instant.with_timezone(&Local).format(&pattern).to_string(),
    }
}

/// `ToDate([format])`: turn text into a date value, element-wise over lists.
pub(super) fn to_date(
    target: Value,
    format: Option<String>,
    mode: DateFormatMode,
) -> Result<Value, String> {
    match target {
        Value::Missing { .. } | Value::Error(_) | Value::Null => Ok(target),
        Value::Date {
            instant, original, ..
        } => Ok(Value::Date {
            instant,
            original,
            format,
            mode,
        }),
        Value::List(items) => items
            .into_iter()
            .map(|item| to_date(item, format.clone(), mode))
            .collect::<Result<_, _>>()
            .map(Value::List),
        Value::Aggregate(items) => items
            .into_iter()
            .map(|item| to_date(item, format.clone(), mode))
            .collect::<Result<_, _>>()
            .map(Value::Aggregate),
        other => {
            let text = render(&other);
            let instant = parse_date(&text).ok_or_else(|| format!("'{text}' is not a date"))?;
            Ok(Value::Date {
                instant,
                original: text,
                format,
                mode,
            })
        }
    }
}

fn moment_to_strftime(format: &str) -> String {
    let mut out = String::new();
    let mut rest = format;
    while let Some(c) = rest.chars().next() {
        if c == '[' {
            let literal_end = rest.find(']').unwrap_or(rest.len());
            out.push_str(&rest[1..literal_end].replace('%', "%%"));
            rest = rest.get(literal_end + 1..).unwrap_or_default();
            continue;
        }
        if let Some((token, spec)) = TOKENS.iter().find(|(token, _)| rest.starts_with(token)) {
            out.push_str(spec);
            rest = &rest[token.len()..];
            continue;
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}
