use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Caller-supplied variables for one render.
///
/// The evaluator only reads from a `Context`; `set` and loop bindings
/// live in the evaluator's own scopes, so one context can back any
/// number of renders.
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder form of [`Context::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        self.insert(name, value);
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.insert(name, value);
    }

    /// Bind a host function. Referenced as a bare variable it is called
    /// with no arguments; `name(a, b)` passes the arguments through.
    pub fn set_callable<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Value::callable(f));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Build a context from a JSON object; each top-level key becomes a
    /// variable.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(entries) => Ok(Self {
                vars: entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            other => Err(Error::eval(format!(
                "context must be a JSON object, got {}",
                Value::from_json(other).type_name()
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
