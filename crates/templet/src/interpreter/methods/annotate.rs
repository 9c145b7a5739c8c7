//! Annotation setters (`.@Name(args)`).

use regex::Regex;
use tracing::trace;

use super::{MethodId, check_count};
use crate::compose::render;
use crate::data::{Entry, TemplateData};
use crate::interpreter::annotations::{BulletMode, DateFormatMode, Encoding, MultilineStyle};
use crate::interpreter::cache::FetchState;
use crate::interpreter::error::MethodError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::value::Value;
use crate::parser::{Expr, MethodCall};

fn invalid_value(id: MethodId, message: impl Into<String>) -> MethodError {
    MethodError::InvalidArgument {
        name: id.name().to_string(),
        message: message.into(),
    }
}

fn pattern(id: MethodId, text: &str) -> Result<Regex, MethodError> {
    Regex::new(text)
        .map_err(|error| invalid_value(id, format!("invalid pattern '{text}': {error}")))
}

/// The argument texts of an `@Include` entry: a scalar, or the scalars of
/// a list.
fn entry_args(entry: &Entry) -> Vec<String> {
    match entry {
        Entry::Scalar(scalar) => vec![scalar.as_text().into_owned()],
        Entry::Node(node) => node
            .elements()
            .iter()
            .filter_map(TemplateData::wrapped_scalar)
            .map(|scalar| scalar.as_text().into_owned())
            .collect(),
    }
}

impl Evaluator<'_> {
    /// Apply one annotation call to the current annotation set.
    ///
    /// Returns the location an `@Include` is still waiting for, if any.
    pub(in crate::interpreter) fn apply_annotation(
        &mut self,
        call: &MethodCall,
    ) -> Result<Option<String>, MethodError> {
        let id = MethodId::from_name(&call.name)
            .filter(|id| id.is_annotation())
            .ok_or_else(|| self.unknown_method(&call.name))?;
        if id == MethodId::Include {
            check_count(id.name(), call.args.len(), 1, Some(1))?;
            return self.include(&call.args[0]);
        }
        let args: Vec<String> = (0..call.args.len())
            .filter_map(|i| self.arg_text(call, i))
            .collect();
        self.set_annotation(id, &args).map(|()| None)
    }

    /// `@Include(context)`: apply every `Name: args` entry of a dictionary.
    fn include(&mut self, arg: &Expr) -> Result<Option<String>, MethodError> {
        let node = match self.eval_expr(arg) {
            Value::Data(node) => node,
            Value::Missing { .. } => return Ok(None),
            other => {
                let location = render(&other);
                match self.fetch(&location) {
                    FetchState::Ready(text) => TemplateData::parse(&text)
                        .map_err(|error| invalid_value(MethodId::Include, error.to_string()))?,
                    FetchState::Pending => return Ok(Some(location)),
                    FetchState::Failed(message) => {
                        return Err(invalid_value(MethodId::Include, message));
                    }
                }
            }
        };

        let mut first_error = None;
        for key in node.keys() {
            let Some(entry) = node.get(&key) else {
                continue;
            };
            let name = format!("@{}", key.trim_start_matches('@'));
            let result = match MethodId::from_name(&name) {
                Some(id) if id.is_annotation() && id != MethodId::Include => {
                    self.set_annotation(id, &entry_args(&entry))
                }
                _ => Err(self.unknown_method(&name)),
            };
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(None), Err)
    }

    fn set_annotation(&mut self, id: MethodId, args: &[String]) -> Result<(), MethodError> {
        trace!(annotation = id.name(), ?args, "setting annotation");
        let name = id.name();
        let first = args.first().map(String::as_str).unwrap_or_default();
        match id {
            MethodId::MissingValue => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.missing_value = Some(first.to_string());
            }
            MethodId::ValueFunction => {
                check_count(name, args.len(), 1, Some(1))?;
                if self.host.value_function(first).is_none() {
                    return Err(invalid_value(id, format!("no value function named '{first}'")));
                }
                self.annotations.value_function = Some(first.to_string());
            }
            MethodId::BulletMode => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.bullet_mode = BulletMode::parse(first)
                    .ok_or_else(|| invalid_value(id, format!("unknown bullet mode '{first}'")))?;
            }
            MethodId::DateFormat => {
                check_count(name, args.len(), 1, Some(2))?;
                if let Some(mode) = args.get(1) {
                    self.annotations.date_format_mode = DateFormatMode::parse(mode)
                        .ok_or_else(|| invalid_value(id, format!("unknown date mode '{mode}'")))?;
                }
                self.annotations.date_format = Some(first.to_string());
            }
            MethodId::DefaultIndent => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.default_indent = first
                    .trim()
                    .parse()
                    .map_err(|_| invalid_value(id, format!("expected a width, got '{first}'")))?;
            }
            MethodId::DateTest => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.date_test = Some(pattern(id, first)?);
            }
            MethodId::BulletStyle => {
                check_count(name, args.len(), 1, None)?;
                self.annotations.bullet_styles = Some(args.to_vec());
            }
            MethodId::EncodeDataFor => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.encoding = if first == "none" {
                    None
                } else {
                    Some(Encoding::parse(first).ok_or_else(|| {
                        invalid_value(id, format!("unknown encoding '{first}'"))
                    })?)
                };
            }
            MethodId::Falsy => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.falsy = Some(pattern(id, first)?);
            }
            MethodId::Debug => {
                check_count(name, args.len(), 1, Some(1))?;
                self.annotations.debug_level = first
                    .trim()
                    .parse()
                    .map_err(|_| invalid_value(id, format!("expected a level, got '{first}'")))?;
            }
            MethodId::MultilineStyle => {
                check_count(name, args.len(), 1, None)?;
                let style = MultilineStyle::from_flags(args)
                    .map_err(|message| invalid_value(id, message))?;
                self.annotations.multiline_style = Some(style);
            }
            _ => return Err(self.unknown_method(name)),
        }
        Ok(())
    }
}
