//! engine::properties
//!
//! Property path expressions over JSON resources, backing the generic
//! `--set`, `--add` and `--remove` arguments.
//!
//! # Paths
//!
//! ```text
//! hardwareProfile.vmSize
//! tags.env
//! networkInterfaces[0].primary
//! networkInterfaces[name=nic1].primary
//! ```
//!
//! Keys are separated by `.`; `[n]` indexes a list (negative counts from the
//! end) and `[key=value]` selects the single list element whose `key` equals
//! `value`. A key that is not found verbatim is retried in camelCase, so
//! `hardware_profile.vm_size` addresses `hardwareProfile.vmSize`.
//!
//! # Values
//!
//! Values are parsed as JSON when possible (`5`, `true`, `{"a": 1}`) and
//! kept as strings otherwise, unless `force_string` is set.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

pub const SET_USAGE: &str = "--set property1.property2=<value>";
pub const ADD_USAGE: &str = "--add property.listProperty <key=value, string or JSON string>";
pub const REMOVE_USAGE: &str =
    "--remove property.list <indexToRemove> OR --remove propertyToRemove";

/// Errors from evaluating a property expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("usage error: {message}. Correct syntax: {usage}")]
    Usage {
        message: String,
        usage: &'static str,
    },

    #[error("invalid property path '{0}'")]
    InvalidPath(String),

    #[error("couldn't find '{part}' in '{parent}'. {hint}")]
    NotFound {
        part: String,
        parent: String,
        hint: String,
    },

    #[error("index {index} doesn't exist on {name}")]
    IndexOutOfRange { index: i64, name: String },

    #[error("non-unique key '{key}' found multiple matches on {name}. Key must be unique.")]
    NonUniqueKey { key: String, name: String },

    #[error("item with value '{value}' doesn't exist for key '{key}' on {name}")]
    NoMatch {
        key: String,
        value: String,
        name: String,
    },

    #[error("'{0}' is not a list")]
    NotAList(String),
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(i64),
    Filter { key: String, value: Value },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Index(i) => write!(f, "[{i}]"),
            Segment::Filter { key, value } => match value {
                Value::String(s) => write!(f, "[{key}={s}]"),
                other => write!(f, "[{key}={other}]"),
            },
        }
    }
}

/// Render a path the way it would be written.
fn render(path: &[Segment]) -> String {
    let mut out = String::new();
    for segment in path {
        if matches!(segment, Segment::Key(_)) && !out.is_empty() {
            out.push('.');
        }
        out.push_str(&segment.to_string());
    }
    if out.is_empty() {
        "root".to_string()
    } else {
        out
    }
}

/// Parse a property path.
pub fn parse_path(expr: &str) -> Result<Vec<Segment>, PropertyError> {
    let invalid = || PropertyError::InvalidPath(expr.to_string());
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut after_dot = false;
    let mut chars = expr.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && (after_dot || segments.is_empty()) {
                    return Err(invalid());
                }
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                after_dot = true;
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(invalid());
                }
                segments.push(parse_bracket(&inner).ok_or_else(invalid)?);
                after_dot = false;
            }
            ']' => return Err(invalid()),
            c => {
                key.push(c);
                after_dot = false;
            }
        }
    }

    if !key.is_empty() {
        segments.push(Segment::Key(key));
    } else if after_dot || segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments)
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    if let Some((key, value)) = inner.split_once('=') {
        if key.is_empty() {
            return None;
        }
        return Some(Segment::Filter {
            key: key.to_string(),
            value: parse_value(value, false),
        });
    }
    inner.trim().parse::<i64>().ok().map(Segment::Index)
}

/// Parse `raw` as JSON unless `force_string`; fall back to a string.
pub fn parse_value(raw: &str, force_string: bool) -> Value {
    if force_string {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Split `path=value` on the first `=` outside brackets.
fn split_key_value(expr: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return (&expr[..i], &expr[i + 1..]),
            _ => {}
        }
    }
    (expr, "")
}

fn to_camel_case(key: &str) -> String {
    let mut parts = key.split('_');
    let mut out = parts.next().unwrap_or_default().to_lowercase();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// The stored spelling of `key` in `map`, trying camelCase as a fallback.
fn resolve_key(map: &Map<String, Value>, key: &str) -> Option<String> {
    if map.contains_key(key) {
        return Some(key.to_string());
    }
    if key.contains('_') {
        let camel = to_camel_case(key);
        if map.contains_key(&camel) {
            return Some(camel);
        }
    }
    None
}

fn not_found(current: &Value, part: &str, parent: &str) -> PropertyError {
    let hint = match current {
        Value::Object(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            format!("Available options: {}", keys.join(", "))
        }
        Value::Array(_) => format!(
            "Available options: index into the collection '{parent}' with [<index>] or [<key=value>]"
        ),
        _ => format!("'{parent}' does not support further indexing."),
    };
    PropertyError::NotFound {
        part: part.to_string(),
        parent: parent.to_string(),
        hint,
    }
}

fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// Position of the single element matching a `[key=value]` filter.
fn filter_position(
    items: &[Value],
    key: &str,
    value: &Value,
    name: &str,
) -> Result<usize, PropertyError> {
    let matches: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| {
            item.as_object()
                .and_then(|map| resolve_key(map, key).and_then(|k| map.get(&k)))
                == Some(value)
        })
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [one] => Ok(*one),
        [] => Err(PropertyError::NoMatch {
            key: key.to_string(),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            name: name.to_string(),
        }),
        _ => Err(PropertyError::NonUniqueKey {
            key: key.to_string(),
            name: name.to_string(),
        }),
    }
}

/// Descend one segment. With `create`, missing or null keys become `{}`.
fn step<'v>(
    current: &'v mut Value,
    segment: &Segment,
    parent: &str,
    create: bool,
) -> Result<&'v mut Value, PropertyError> {
    match segment {
        Segment::Key(key) => {
            if create && current.is_null() {
                *current = Value::Object(Map::new());
            }
            let name = match current.as_object() {
                Some(map) => match resolve_key(map, key) {
                    Some(name) => name,
                    None if create => key.clone(),
                    None => return Err(not_found(current, key, parent)),
                },
                None => return Err(not_found(current, key, parent)),
            };
            match current {
                Value::Object(map) => {
                    let slot = map.entry(name).or_insert(Value::Null);
                    if create && slot.is_null() {
                        *slot = Value::Object(Map::new());
                    }
                    Ok(slot)
                }
                other => Err(not_found(other, key, parent)),
            }
        }
        Segment::Index(index) => {
            let Some(len) = current.as_array().map(Vec::len) else {
                return Err(not_found(current, &segment.to_string(), parent));
            };
            let out_of_range = PropertyError::IndexOutOfRange {
                index: *index,
                name: parent.to_string(),
            };
            let position = normalize(*index, len).ok_or(out_of_range.clone())?;
            current.get_mut(position).ok_or(out_of_range)
        }
        Segment::Filter { key, value } => {
            let position = match current.as_array() {
                Some(items) => filter_position(items, key, value, parent)?,
                None => return Err(not_found(current, &segment.to_string(), parent)),
            };
            current.get_mut(position).ok_or_else(|| PropertyError::NoMatch {
                key: key.clone(),
                value: value.to_string(),
                name: parent.to_string(),
            })
        }
    }
}

fn walk<'v>(
    mut current: &'v mut Value,
    path: &[Segment],
    create: bool,
) -> Result<&'v mut Value, PropertyError> {
    for (i, segment) in path.iter().enumerate() {
        let parent = render(&path[..i]);
        current = step(current, segment, &parent, create)?;
    }
    Ok(current)
}

fn split_last(path: &str) -> Result<(Vec<Segment>, Segment), PropertyError> {
    let mut segments = parse_path(path)?;
    let last = segments
        .pop()
        .ok_or_else(|| PropertyError::InvalidPath(path.to_string()))?;
    Ok((segments, last))
}

/// Apply one `--set path=value` expression.
///
/// Missing intermediate objects are created.
pub fn set_property(
    instance: &mut Value,
    expression: &str,
    force_string: bool,
) -> Result<(), PropertyError> {
    let (key, raw) = split_key_value(expression);
    if key.trim().is_empty() {
        return Err(PropertyError::Usage {
            message: "Empty key in --set".into(),
            usage: SET_USAGE,
        });
    }
    let value = parse_value(raw, force_string);
    let (parents, last) = split_last(key)?;
    let parent_label = render(&parents);
    let target = walk(instance, &parents, true)?;
    if target.is_null() {
        *target = Value::Object(Map::new());
    }

    match last {
        Segment::Key(name) => match target {
            Value::Object(map) => {
                let stored = resolve_key(map, &name).unwrap_or(name);
                map.insert(stored, value);
                Ok(())
            }
            other => Err(not_found(other, &name, &parent_label)),
        },
        Segment::Index(index) => match target {
            Value::Array(items) => {
                let position =
                    normalize(index, items.len()).ok_or_else(|| PropertyError::IndexOutOfRange {
                        index,
                        name: parent_label.clone(),
                    })?;
                items[position] = value;
                Ok(())
            }
            other => Err(not_found(other, &format!("[{index}]"), &parent_label)),
        },
        Segment::Filter { key, value: wanted } => match target {
            Value::Array(items) => {
                let position = filter_position(items, &key, &wanted, &parent_label)?;
                items[position] = value;
                Ok(())
            }
            other => Err(not_found(other, &key, &parent_label)),
        },
    }
}

/// Apply one `--add path item...` group.
///
/// Consecutive `key=value` items are collected into one object; any other
/// item is appended on its own. A missing list is created.
pub fn add_properties(
    instance: &mut Value,
    arguments: &[String],
    force_string: bool,
) -> Result<(), PropertyError> {
    let Some((path, items)) = arguments.split_first() else {
        return Err(PropertyError::Usage {
            message: "--add requires a property path".into(),
            usage: ADD_USAGE,
        });
    };
    if items.is_empty() {
        return Err(PropertyError::Usage {
            message: format!("nothing to add to '{path}'"),
            usage: ADD_USAGE,
        });
    }

    let (parents, last) = split_last(path)?;
    let parent_label = render(&parents);
    let parent = walk(instance, &parents, true)?;
    let target = match &last {
        Segment::Key(key) => {
            if parent.is_null() {
                *parent = Value::Object(Map::new());
            }
            match parent {
                Value::Object(map) => {
                    let stored = resolve_key(map, key).unwrap_or_else(|| key.clone());
                    let slot = map.entry(stored).or_insert(Value::Null);
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    slot
                }
                other => return Err(not_found(other, key, &parent_label)),
            }
        }
        segment => step(parent, segment, &parent_label, false)?,
    };

    let list = target
        .as_array_mut()
        .ok_or_else(|| PropertyError::NotAList(path.clone()))?;

    let mut entry = Map::new();
    for item in items {
        match item.split_once('=') {
            Some((key, value)) => {
                entry.insert(key.to_string(), Value::String(value.to_string()));
            }
            None => {
                if !entry.is_empty() {
                    list.push(Value::Object(std::mem::take(&mut entry)));
                }
                list.push(parse_value(item, force_string));
            }
        }
    }
    if !entry.is_empty() {
        list.push(Value::Object(entry));
    }
    Ok(())
}

/// Apply one `--remove path [index]` group.
///
/// With an index, removes that element from the list at `path`; without,
/// removes the property (or list element) `path` names.
pub fn remove_property(instance: &mut Value, arguments: &[String]) -> Result<(), PropertyError> {
    let usage = |message: String| PropertyError::Usage {
        message,
        usage: REMOVE_USAGE,
    };
    let (path, rest) = match arguments {
        [path] => (path, None),
        [path, index] => (path, Some(index)),
        [] => return Err(usage("--remove requires a property path".into())),
        _ => return Err(usage("too many values for --remove".into())),
    };

    if let Some(index) = rest {
        let index: i64 = index
            .trim()
            .parse()
            .map_err(|_| usage(format!("'{index}' is not a list index")))?;
        let segments = parse_path(path)?;
        let name = render(&segments);
        let list = walk(instance, &segments, false)?
            .as_array_mut()
            .ok_or_else(|| PropertyError::NotAList(path.clone()))?;
        let position = normalize(index, list.len())
            .ok_or(PropertyError::IndexOutOfRange { index, name })?;
        list.remove(position);
        return Ok(());
    }

    let (parents, last) = split_last(path)?;
    let parent_label = render(&parents);
    let parent = walk(instance, &parents, false)?;
    match (last, parent) {
        (Segment::Key(key), Value::Object(map)) => {
            let stored = resolve_key(map, &key);
            match stored {
                Some(stored) => {
                    map.remove(&stored);
                    Ok(())
                }
                None => Err(not_found(&Value::Object(map.clone()), &key, &parent_label)),
            }
        }
        (Segment::Index(index), Value::Array(items)) => {
            let position = normalize(index, items.len()).ok_or(PropertyError::IndexOutOfRange {
                index,
                name: parent_label,
            })?;
            items.remove(position);
            Ok(())
        }
        (Segment::Filter { key, value }, Value::Array(items)) => {
            let position = filter_position(items, &key, &value, &parent_label)?;
            items.remove(position);
            Ok(())
        }
        (segment, other) => Err(not_found(other, &segment.to_string(), &parent_label)),
    }
}
