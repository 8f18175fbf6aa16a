//! Attribute value coercion
//!
//! Tag payloads in a playlist are untyped text. [`coerce`] turns a payload
//! into a [`Value`] by trying, in order:
//!
//! 1. integer
//! 2. float
//! 3. boolean (`YES` / `NO`, case-insensitive)
//! 4. map of `KEY=VALUE` pairs
//! 5. list of two or more comma-separated items
//! 6. the raw text
//!
//! The first interpretation that succeeds wins, so `"42"` is always an
//! integer and a payload without commas never becomes a one-element list.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix carried by extension tags, stripped from normalized names
pub const EXTENSION_PREFIX: &str = "#EXT-X-";

/// A coerced attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when the value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// First positional item: the head of a list, otherwise the value itself
    pub fn first(&self) -> Option<&Value> {
        match self {
            Value::List(items) => items.first(),
            other => Some(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", if *b { "YES" } else { "NO" }),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Coerce a raw payload string into a typed value. Never fails.
pub fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }

    if let Some(b) = coerce_bool(trimmed) {
        return Value::Boolean(b);
    }

    if let Some(map) = coerce_map(raw) {
        return Value::Map(map);
    }

    if let Some(items) = coerce_list(raw) {
        return Value::List(items);
    }

    Value::Text(raw.to_string())
}

fn coerce_bool(trimmed: &str) -> Option<bool> {
    if trimmed.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        None
    }
}

/// Every top-level segment must be a single `KEY=VALUE` pair. An empty
/// payload has no segments and yields an empty map.
fn coerce_map(raw: &str) -> Option<BTreeMap<String, Value>> {
    let mut map = BTreeMap::new();
    for segment in split(raw, ',') {
        if segment.matches('=').count() != 1 {
            return None;
        }
        let (key, value) = segment.split_once('=')?;
        map.insert(normalize_key(key), coerce(value));
    }
    Some(map)
}

fn coerce_list(raw: &str) -> Option<Vec<Value>> {
    let segments: Vec<&str> = split(raw, ',').collect();
    if segments.len() > 1 {
        Some(segments.into_iter().map(coerce).collect())
    } else {
        None
    }
}

/// Normalize a tag or attribute name: drop the `#EXT-X-` prefix, turn `-`
/// into `_` and lowercase, so `#EXT-X-TARGETDURATION` becomes
/// `targetduration` and `AVERAGE-BANDWIDTH` becomes `average_bandwidth`.
pub fn normalize_key(key: &str) -> String {
    key.replace(EXTENSION_PREFIX, "").replace('-', "_").to_lowercase()
}

/// Split `input` on `separator`, ignoring separators inside quotes.
///
/// Any `'` or `"` flips the in-quote flag, whichever quote opened the
/// string. A separator outside quotes always ends a segment, even an empty
/// one, but an empty trailing remainder is not yielded.
pub fn split(input: &str, separator: char) -> QuoteSplit<'_> {
    QuoteSplit {
        input,
        separator,
        pos: 0,
        in_quote: false,
    }
}

/// Lazy iterator returned by [`split`]
#[derive(Debug, Clone)]
pub struct QuoteSplit<'a> {
    input: &'a str,
    separator: char,
    pos: usize,
    in_quote: bool,
}

impl<'a> Iterator for QuoteSplit<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.pos;
        for (offset, c) in self.input[start..].char_indices() {
            if c != self.separator || self.in_quote {
                if c == '\'' || c == '"' {
                    self.in_quote = !self.in_quote;
                }
            } else {
                self.pos = start + offset + c.len_utf8();
                return Some(&self.input[start..start + offset]);
            }
        }

        self.pos = self.input.len();
        if start < self.input.len() {
            Some(&self.input[start..])
        } else {
            None
        }
    }
}
