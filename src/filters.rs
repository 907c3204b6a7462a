//! Built-in filter catalog.
//!
//! Every filter is a plain function of `(input, args)`; the table is a
//! `const` slice so renders share it without synchronization.

use crate::config::Config;
use crate::date;
use crate::error::{Error, Result};
use crate::value::{integer_key, Mapping, Value};

pub type FilterFn = fn(Value, &[Value], &Config) -> Result<Value>;

const FILTERS: &[(&str, FilterFn)] = &[
    ("upper", upper),
    ("lower", lower),
    ("capitalize", capitalize),
    ("title", title),
    ("length", length),
    ("sort", sort),
    ("reverse", reverse),
    ("keys", keys),
    ("merge", merge),
    ("join", join),
    ("default", default),
    ("url_encode", url_encode),
    ("json_encode", json_encode),
    ("date", date_filter),
];

pub fn lookup(name: &str) -> Option<FilterFn> {
    FILTERS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Names of all built-in filters, in catalog order.
pub fn names() -> impl Iterator<Item = &'static str> {
    FILTERS.iter().map(|(n, _)| *n)
}

pub fn apply(name: &str, input: Value, args: &[Value], config: &Config) -> Result<Value> {
    let filter = lookup(name).ok_or_else(|| Error::UnknownFilter(name.to_string()))?;
    filter(input, args, config)
}

fn type_error(filter: &str, expected: &str, got: &Value) -> Error {
    Error::eval(format!("{filter} expects {expected}, got {}", got.type_name()))
}

fn upper(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    Ok(Value::String(input.to_string().to_ascii_uppercase()))
}

fn lower(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    Ok(Value::String(input.to_string().to_ascii_lowercase()))
}

fn capitalize(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    let s = input.to_string();
    let mut chars = s.chars();
    Ok(Value::String(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }))
}

fn title(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    let mut out = String::new();
    let mut at_word_start = true;
    for c in input.to_string().chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    Ok(Value::String(out))
}

fn length(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    input
        .len()
        .map(Value::from)
        .ok_or_else(|| type_error("length", "a string, array or mapping", &input))
}

fn sort(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    match input {
        Value::Array(mut items) => {
            items.sort_by(Value::natural_cmp);
            Ok(Value::Array(items))
        }
        Value::Mapping(m) => {
            let mut entries: Vec<(String, Value)> = m.into_iter().collect();
            entries.sort_by(|(_, a), (_, b)| a.natural_cmp(b));
            Ok(Value::Mapping(entries.into_iter().collect()))
        }
        other => Err(type_error("sort", "an array or mapping", &other)),
    }
}

fn reverse(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    match input {
        Value::Array(mut items) => {
            items.reverse();
            Ok(Value::Array(items))
        }
        Value::Mapping(m) => Ok(Value::Mapping(m.into_iter().rev().collect())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(type_error("reverse", "an array, mapping or string", &other)),
    }
}

fn keys(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    match input {
        Value::Array(items) => Ok(Value::Array(
            (0..items.len()).map(|i| Value::String(i.to_string())).collect(),
        )),
        Value::Mapping(m) => Ok(Value::Array(m.into_keys().map(Value::String).collect())),
        other => Err(type_error("keys", "an array or mapping", &other)),
    }
}

/// Fold the arguments into the input. Mapping entries overwrite by key;
/// array elements are appended under fresh integer keys one past the
/// largest integer key present. The result is an array only when the
/// final keys are exactly `0..n` in order.
fn merge(input: Value, args: &[Value], _: &Config) -> Result<Value> {
    let mut acc: Mapping = match input {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        other => return Err(type_error("merge", "an array or mapping", &other)),
    };

    for arg in args {
        match arg {
            Value::Mapping(m) => {
                for (k, v) in m {
                    acc.insert(k.clone(), v.clone());
                }
            }
            Value::Array(items) => {
                let mut next = acc
                    .keys()
                    .filter_map(|k| integer_key(k))
                    .max()
                    .map_or(0, |max| max + 1);
                for item in items {
                    acc.insert(next.to_string(), item.clone());
                    next += 1;
                }
            }
            Value::Null => {}
            other => return Err(type_error("merge", "array or mapping arguments", other)),
        }
    }

    let is_list = acc
        .keys()
        .enumerate()
        .all(|(i, k)| integer_key(k) == Some(i));
    Ok(if is_list {
        Value::Array(acc.into_values().collect())
    } else {
        Value::Mapping(acc)
    })
}

fn join(input: Value, args: &[Value], _: &Config) -> Result<Value> {
    let separator = args.first().map(ToString::to_string).unwrap_or_default();
    let parts: Vec<String> = match input {
        Value::Array(items) => items.iter().map(ToString::to_string).collect(),
        Value::Mapping(m) => m.values().map(ToString::to_string).collect(),
        other => return Ok(Value::String(other.to_string())),
    };
    Ok(Value::String(parts.join(&separator)))
}

fn default(input: Value, args: &[Value], _: &Config) -> Result<Value> {
    let empty = match &input {
        Value::String(s) => s.is_empty(),
        other => other.is_null(),
    };
    if empty {
        Ok(args.first().cloned().unwrap_or_default())
    } else {
        Ok(input)
    }
}

fn url_encode(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    Ok(Value::String(urlencoding::encode(&input.to_string()).into_owned()))
}

fn json_encode(input: Value, _: &[Value], _: &Config) -> Result<Value> {
    serde_json::to_string(&input.to_json())
        .map(Value::String)
        .map_err(|e| Error::eval(format!("json_encode failed: {e}")))
}

fn date_filter(input: Value, args: &[Value], config: &Config) -> Result<Value> {
    let format = match args.first() {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    };
    let timezone = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    };
    date::format_date(&input, format.as_deref(), timezone.as_deref(), config).map(Value::String)
}
