//! Built-in method dispatch.
//!
//! Method names are case-sensitive. Host methods registered in a
//! [`HostRegistry`](crate::HostRegistry) are consulted first; everything else
//! resolves through [`MethodId`], whose [`MethodId::ALL`] table lists every
//! built-in.

mod annotate;
mod dates;
mod encoding;
mod structure;
mod text;

use super::annotations::Encoding;
use super::error::MethodError;
use super::evaluator::Evaluator;
use super::value::Value;
use crate::compose::render;
use crate::data::Scalar;
use crate::parser::MethodCall;

pub use dates::{format_date, parse_date};
pub use encoding::encode;

/// Every built-in method and annotation setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodId {
    ToUpper,
    ToLower,
    Trim,
    Substr,
    IndexOf,
    EndIndexOf,
    LastIndexOf,
    StartsWith,
    EndsWith,
    Contains,
    Replace,
    Align,
    EncodeFor,
    Count,
    Where,
    OrderBy,
    GroupBy,
    Join,
    Index,
    IfMissing,
    ToJson,
    ToDate,
    Assert,
    Matches,
    Case,
    Compose,
    Include,
    MissingValue,
    ValueFunction,
    BulletMode,
    DateFormat,
    DefaultIndent,
    DateTest,
    BulletStyle,
    EncodeDataFor,
    Falsy,
    Debug,
    MultilineStyle,
}

impl MethodId {
    pub const ALL: [MethodId; 38] = [
        MethodId::ToUpper,
        MethodId::ToLower,
        MethodId::Trim,
        MethodId::Substr,
        MethodId::IndexOf,
        MethodId::EndIndexOf,
        MethodId::LastIndexOf,
        MethodId::StartsWith,
        MethodId::EndsWith,
        MethodId::Contains,
        MethodId::Replace,
        MethodId::Align,
        MethodId::EncodeFor,
        MethodId::Count,
        MethodId::Where,
        MethodId::OrderBy,
        MethodId::GroupBy,
        MethodId::Join,
        MethodId::Index,
        MethodId::IfMissing,
        MethodId::ToJson,
        MethodId::ToDate,
        MethodId::Assert,
        MethodId::Matches,
        MethodId::Case,
        MethodId::Compose,
        MethodId::Include,
        MethodId::MissingValue,
        MethodId::ValueFunction,
        MethodId::BulletMode,
        MethodId::DateFormat,
        MethodId::DefaultIndent,
        MethodId::DateTest,
        MethodId::BulletStyle,
        MethodId::EncodeDataFor,
        MethodId::Falsy,
        MethodId::Debug,
        MethodId::MultilineStyle,
    ];

    /// The name as written in templates. Annotation setters start with `@`.
    pub fn name(self) -> &'static str {
        match self {
            MethodId::ToUpper => "ToUpper",
            MethodId::ToLower => "ToLower",
            MethodId::Trim => "Trim",
            MethodId::Substr => "Substr",
            MethodId::IndexOf => "IndexOf",
            MethodId::EndIndexOf => "EndIndexOf",
            MethodId::LastIndexOf => "LastIndexOf",
            MethodId::StartsWith => "StartsWith",
            MethodId::EndsWith => "EndsWith",
            MethodId::Contains => "Contains",
            MethodId::Replace => "Replace",
            MethodId::Align => "Align",
            MethodId::EncodeFor => "EncodeFor",
            MethodId::Count => "Count",
            MethodId::Where => "Where",
            MethodId::OrderBy => "OrderBy",
            MethodId::GroupBy => "GroupBy",
            MethodId::Join => "Join",
            MethodId::Index => "Index",
            MethodId::IfMissing => "IfMissing",
            MethodId::ToJson => "ToJson",
            MethodId::ToDate => "ToDate",
            MethodId::Assert => "Assert",
            MethodId::Matches => "Matches",
            MethodId::Case => "Case",
            MethodId::Compose => "Compose",
            MethodId::Include => "@Include",
            MethodId::MissingValue => "@MissingValue",
            MethodId::ValueFunction => "@ValueFunction",
            MethodId::BulletMode => "@BulletMode",
            MethodId::DateFormat => "@DateFormat",
            MethodId::DefaultIndent => "@DefaultIndent",
            MethodId::DateTest => "@DateTest",
            MethodId::BulletStyle => "@BulletStyle",
            MethodId::EncodeDataFor => "@EncodeDataFor",
            MethodId::Falsy => "@Falsy",
            MethodId::Debug => "@Debug",
            MethodId::MultilineStyle => "@MultilineStyle",
        }
    }

    pub fn from_name(name: &str) -> Option<MethodId> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    pub fn is_annotation(self) -> bool {
        self.name().starts_with('@')
    }
}

/// Fail unless `call` has between `min` and `max` arguments (`None`: no
/// upper bound).
fn check_arity(call: &MethodCall, min: usize, max: Option<usize>) -> Result<(), MethodError> {
    check_count(&call.name, call.args.len(), min, max)
}

fn check_count(name: &str, got: usize, min: usize, max: Option<usize>) -> Result<(), MethodError> {
    if got >= min && max.is_none_or(|max| got <= max) {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(MethodError::Arity {
        name: name.to_string(),
        expected,
        got,
    })
}

fn invalid(call: &MethodCall, message: impl Into<String>) -> MethodError {
    MethodError::InvalidArgument {
        name: call.name.clone(),
        message: message.into(),
    }
}

impl Evaluator<'_> {
    /// The composed text of argument `i`, if present.
    fn arg_text(&mut self, call: &MethodCall, i: usize) -> Option<String> {
        let arg = call.args.get(i)?;
        let value = self.eval_expr(arg);
        Some(render(&value))
    }

    /// Argument `i` as an integer, if present.
    fn arg_int(&mut self, call: &MethodCall, i: usize) -> Result<Option<i64>, MethodError> {
        let Some(text) = self.arg_text(call, i) else {
            return Ok(None);
        };
        text.trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(call, format!("expected an integer, got '{text}'")))
    }

    /// Evaluate a built-in method on `target`.
    pub(super) fn call_builtin(
        &mut self,
        id: MethodId,
        target: Value,
        call: &MethodCall,
    ) -> Result<Value, MethodError> {
        match id {
            MethodId::ToUpper => {
                check_arity(call, 0, Some(0))?;
                Ok(text::map_text(target, &|s| Value::text(text::to_upper(s))))
            }
            MethodId::ToLower => {
                check_arity(call, 0, Some(0))?;
                Ok(text::map_text(target, &|s| Value::text(text::to_lower(s))))
            }
            MethodId::Trim => {
                check_arity(call, 0, Some(0))?;
                Ok(text::map_text(target, &|s| Value::text(s.trim())))
            }
            MethodId::Substr => {
                check_arity(call, 1, Some(2))?;
                let start = self.arg_int(call, 0)?.unwrap_or_default();
                let length = self.arg_int(call, 1)?;
                Ok(text::map_text(target, &|s| {
                    Value::text(text::substr(s, start, length))
                }))
            }
            MethodId::IndexOf | MethodId::EndIndexOf | MethodId::LastIndexOf => {
                check_arity(call, 1, Some(1))?;
                let needle = self.arg_text(call, 0).unwrap_or_default();
                Ok(text::map_text(target, &|s| {
                    let index = match id {
                        MethodId::IndexOf => text::index_of(s, &needle),
                        MethodId::LastIndexOf => text::last_index_of(s, &needle),
                        _ => text::end_index_of(s, &needle),
                    };
                    Value::Scalar(index.into())
                }))
            }
            MethodId::StartsWith | MethodId::EndsWith | MethodId::Contains => {
                check_arity(call, 1, Some(1))?;
                let needle = self.arg_text(call, 0).unwrap_or_default();
                Ok(text::map_text(target, &|s| {
                    Value::bool(match id {
                        MethodId::StartsWith => s.starts_with(needle.as_str()),
                        MethodId::EndsWith => s.ends_with(needle.as_str()),
                        _ => s.contains(needle.as_str()),
                    })
                }))
            }
            MethodId::Replace => {
                check_arity(call, 2, Some(2))?;
                let from = self.arg_text(call, 0).unwrap_or_default();
                let to = self.arg_text(call, 1).unwrap_or_default();
                if from.is_empty() {
                    return Err(invalid(call, "the text to replace is empty"));
                }
                Ok(text::map_text(target, &|s| Value::text(s.replace(&from, &to))))
            }
            MethodId::Align => {
                check_arity(call, 1, Some(3))?;
                let width = self.arg_int(call, 0)?.unwrap_or_default();
                let side = match self.arg_text(call, 1) {
                    None => text::Side::Left,
                    Some(side) => text::Side::parse(&side)
                        .ok_or_else(|| invalid(call, format!("unknown alignment '{side}'")))?,
                };
                let pad = self.arg_text(call, 2).unwrap_or_else(|| " ".to_string());
                let width = usize::try_from(width).unwrap_or_default();
                Ok(text::map_text(target, &|s| {
                    Value::text(text::align(s, width, side, &pad))
                }))
            }
            MethodId::EncodeFor => {
                check_arity(call, 1, Some(1))?;
                let kind = self.arg_text(call, 0).unwrap_or_default();
                let encoding = Encoding::parse(&kind)
                    .ok_or_else(|| invalid(call, format!("unknown encoding '{kind}'")))?;
                Ok(text::map_text(target, &|s| Value::text(encode(encoding, s))))
            }
            MethodId::Count => {
                check_arity(call, 0, Some(0))?;
                Ok(structure::count(&target))
            }
            MethodId::Where => {
                check_arity(call, 1, Some(1))?;
                Ok(self.filter(target, &call.args[0]))
            }
            MethodId::OrderBy => {
                check_arity(call, 1, Some(3))?;
                self.order_by(target, call)
            }
            MethodId::GroupBy => {
                check_arity(call, 1, Some(2))?;
                self.group_by(target, call)
            }
            MethodId::Join => {
                check_arity(call, 0, Some(2))?;
                let separator = self.arg_text(call, 0).unwrap_or_else(|| ", ".to_string());
                let last = self.arg_text(call, 1).unwrap_or_else(|| separator.clone());
                Ok(structure::join(&target, &separator, &last))
            }
            MethodId::Index => {
                check_arity(call, 0, Some(1))?;
                match self.arg_int(call, 0)? {
                    None => Ok(self.position.map_or_else(
                        || self.missing("Index()"),
                        |position| Value::Scalar(Scalar::count(position + 1)),
                    )),
                    Some(n) => Ok(structure::element_at(&target, n)
                        .unwrap_or_else(|| self.missing(&format!("Index({n})")))),
                }
            }
            MethodId::IfMissing => {
                check_arity(call, 1, Some(1))?;
                if target.is_missing() {
                    Ok(self.eval_expr(&call.args[0]))
                } else {
                    Ok(target)
                }
            }
            MethodId::ToJson => {
                check_arity(call, 0, Some(1))?;
                let indent = self.arg_int(call, 0)?.unwrap_or_default();
                Ok(structure::to_json(&target, usize::try_from(indent).unwrap_or_default()))
            }
            MethodId::ToDate => {
                check_arity(call, 0, Some(1))?;
                let format = self
                    .arg_text(call, 0)
                    .or_else(|| self.annotations.date_format.clone());
                dates::to_date(target, format, self.annotations.date_format_mode)
                    .map_err(|message| invalid(call, message))
            }
            MethodId::Assert => {
                check_arity(call, 0, Some(2))?;
                self.assert(target, call)
            }
            MethodId::Matches => {
                check_arity(call, 1, None)?;
                self.matches(target, call)
            }
            MethodId::Case => {
                check_arity(call, 2, None)?;
                Ok(self.case(&target, call))
            }
            MethodId::Compose => {
                check_arity(call, 0, Some(0))?;
                Ok(if target.is_passthrough() {
                    target
                } else {
                    Value::text(render(&target))
                })
            }
            MethodId::Include
            | MethodId::MissingValue
            | MethodId::ValueFunction
            | MethodId::BulletMode
            | MethodId::DateFormat
            | MethodId::DefaultIndent
            | MethodId::DateTest
            | MethodId::BulletStyle
            | MethodId::EncodeDataFor
            | MethodId::Falsy
            | MethodId::Debug
            | MethodId::MultilineStyle => Err(self.unknown_method(&call.name)),
        }
    }
}
