//! Host extension points: custom methods and value functions.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use super::error::MethodError;
use super::value::Value;
use crate::data::TemplateData;

/// A host method: receives the target value and the evaluated arguments.
pub type HostMethod = Rc<dyn Fn(&Value, &[Value]) -> Result<Value, MethodError>>;

/// A value function: given a lookup key and the current context, returns a
/// value to use instead of the data lookup, or `None` to fall through.
pub type ValueFunction = Rc<dyn Fn(&str, &TemplateData) -> Option<Value>>;

/// Methods and value functions supplied by the host application.
///
/// Host methods are consulted before the built-in table, so a host can
/// override any built-in method by name. Value functions are selected with
/// the `@ValueFunction(name)` annotation.
///
/// # Example
///
/// ```
/// use templet::{HostRegistry, Value};
///
/// let mut host = HostRegistry::new();
/// host.register_method("Shout", |target, _args| {
///     Ok(Value::text(format!("{}!", templet::compose::render(target))))
/// });
/// assert!(host.method("Shout").is_some());
/// ```
#[derive(Clone, Default)]
pub struct HostRegistry {
    methods: HashMap<String, HostMethod>,
    value_functions: HashMap<String, ValueFunction>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_method(
        &mut self,
        name: impl Into<String>,
        method: impl Fn(&Value, &[Value]) -> Result<Value, MethodError> + 'static,
    ) {
        self.methods.insert(name.into(), Rc::new(method));
    }

    pub fn register_value_function(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&str, &TemplateData) -> Option<Value> + 'static,
    ) {
        self.value_functions.insert(name.into(), Rc::new(function));
    }

    pub fn method(&self, name: &str) -> Option<HostMethod> {
        self.methods.get(name).cloned()
    }

    pub fn value_function(&self, name: &str) -> Option<ValueFunction> {
        self.value_functions.get(name).cloned()
    }

    /// Names of registered host methods, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Debug for HostRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut functions: Vec<&str> = self.value_functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        f.debug_struct("HostRegistry")
            .field("methods", &self.method_names())
            .field("value_functions", &functions)
            .finish()
    }
}
