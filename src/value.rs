//! Runtime value model shared by the evaluator and the filter library.
//!
//! Values are dynamically typed. Coercions used by the operators live
//! here so that every operator and filter agrees on them:
//! - [`Value::is_truthy`] for `if`, `&&`, `||`, `!`.
//! - [`Value::to_number`] for arithmetic and relational operators.
//! - `Display` for `~`, `join` and output tags.
//! - [`Value::loose_eq`] for `==` / `!=`.
//! - [`Value::natural_cmp`] for `sort`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Result;

/// Order-preserving, unique-keyed mapping. Iteration order is insertion
/// order and is observable from templates.
pub type Mapping = IndexMap<String, Value>;

type CallableFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A host-supplied function bound into the context.
#[derive(Clone)]
pub struct Callable(Arc<CallableFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Callable(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.0)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A template runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Mapping(Mapping),
    Callable(Callable),
}

impl Value {
    /// Wrap a closure as a callable value.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Callable(Callable::new(f))
    }

    /// Name of the value kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Mapping(_) => "mapping",
            Value::Callable(_) => "callable",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null`, `false`, `0`, `NaN`, `""` and empty collections are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Mapping(m) => !m.is_empty(),
            Value::Callable(_) => true,
        }
    }

    /// Numeric coercion. Blank strings are `0`, non-numeric strings are
    /// `NaN`; collections go through their string form.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) | Value::Mapping(_) => string_to_number(&self.to_string()),
            Value::Callable(_) => f64::NAN,
        }
    }

    /// Number of characters, elements, or keys. `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            Value::Mapping(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Look up `key` in an array or mapping. Array indices may be given as
    /// integral numbers or as canonical integer strings.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Mapping(m) => m.get(key.to_string().as_str()),
            Value::Array(a) => index_of(key).and_then(|i| a.get(i)),
            _ => None,
        }
    }

    /// Loose equality. Same kinds compare structurally; numbers, strings
    /// and booleans meet on numbers; collections against scalars compare
    /// through their string form; `null` only equals `null`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_eq(other),
            (_, Value::Bool(_)) => self.loose_eq(&Value::Number(other.to_number())),
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Callable(_), _) | (_, Value::Callable(_)) => false,
            (
                Value::Array(_) | Value::Mapping(_),
                Value::Array(_) | Value::Mapping(_),
            ) => self == other,
            (Value::Array(_) | Value::Mapping(_), _) => {
                Value::String(self.to_string()).loose_eq(other)
            }
            (_, Value::Array(_) | Value::Mapping(_)) => {
                self.loose_eq(&Value::String(other.to_string()))
            }
        }
    }

    /// Natural ordering used by `sort`: numbers and numeric strings
    /// compare numerically and come before everything else, which
    /// compares lexicographically by string form.
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        match (SortKey::of(self), SortKey::of(other)) {
            (SortKey::Numeric(a), SortKey::Numeric(b)) => match a.partial_cmp(&b) {
                Some(ord) => ord,
                None => a.is_nan().cmp(&b.is_nan()),
            },
            (SortKey::Numeric(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Numeric(_)) => Ordering::Greater,
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(&b),
        }
    }

    /// Build a value from parsed JSON. Object order is kept.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Mapping(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Integral numbers stay integral; `NaN`, infinities
    /// and callables become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Callable(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Mapping(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

enum SortKey {
    Numeric(f64),
    Text(String),
}

impl SortKey {
    fn of(value: &Value) -> SortKey {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => SortKey::Numeric(value.to_number()),
            Value::String(s) => match parse_number(s) {
                Some(n) => SortKey::Numeric(n),
                None => SortKey::Text(s.clone()),
            },
            _ => SortKey::Text(value.to_string()),
        }
    }
}

/// Parse a decimal number literal, allowing surrounding whitespace.
/// Rejects the words Rust's float parser accepts (`inf`, `nan`).
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty()
        || !t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    t.parse().ok()
}

fn string_to_number(s: &str) -> f64 {
    if s.trim().is_empty() {
        return 0.0;
    }
    parse_number(s).unwrap_or(f64::NAN)
}

/// Canonical integer key: `"0"`, `"17"`, but not `"01"` or `"-1"`.
pub(crate) fn integer_key(key: &str) -> Option<usize> {
    let n: usize = key.parse().ok()?;
    (n.to_string() == key).then_some(n)
}

fn index_of(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        Value::String(s) => integer_key(s),
        _ => None,
    }
}

/// Shortest round-trip decimal form of a number: no trailing zeros,
/// plain notation for magnitudes in `[1e-6, 1e21)`, exponent notation
/// outside that range.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. `1.2345e3`.
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let e = point - 1;
        let sign = if e >= 0 { '+' } else { '-' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", e.abs())
        } else {
            format!("{first}.{rest}e{sign}{}", e.abs())
        }
    };

    if n < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Callable(_) => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => write_joined(f, items.iter()),
            Value::Mapping(m) => write_joined(f, m.values()),
        }
    }
}

fn write_joined<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_number!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Mapping(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}
