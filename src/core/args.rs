//! core::args
//!
//! The typed argument set handed to command handlers.
//!
//! # Invariants
//!
//! - The key set is fixed when the set is created from a descriptor; writing
//!   or reading an undeclared key is an error
//! - Every declared key always has a value (possibly [`Value::Absent`])
//! - A set is created per invocation and never shared between dispatches

use std::collections::BTreeMap;

use thiserror::Error;

use super::argument::Value;

/// Errors from argument set access.
#[derive(Debug, Error, PartialEq)]
pub enum ArgumentSetError {
    #[error("argument '{0}' is not declared by this command")]
    UnknownArgument(String),

    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("iterated argument '{name}' has {actual} values, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Materialized arguments for exactly one command invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterializedArgumentSet {
    values: BTreeMap<String, Value>,
    occurrences: Vec<String>,
}

impl MaterializedArgumentSet {
    /// Create a set with the given declared keys, all absent.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: keys.into_iter().map(|k| (k.into(), Value::Absent)).collect(),
            occurrences: Vec::new(),
        }
    }

    /// Assign a declared key.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ArgumentSetError> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ArgumentSetError::UnknownArgument(name.to_string())),
        }
    }

    /// Record that the flag for `name` appeared on the command line.
    pub(crate) fn record_occurrence(&mut self, name: &str) {
        self.occurrences.push(name.to_string());
    }

    /// Destination keys in the order their flags appeared, one entry per
    /// occurrence.
    pub fn occurrences(&self) -> &[String] {
        &self.occurrences
    }

    /// Look up any declared key.
    pub fn get(&self, name: &str) -> Result<&Value, ArgumentSetError> {
        self.values
            .get(name)
            .ok_or_else(|| ArgumentSetError::UnknownArgument(name.to_string()))
    }

    /// Whether a declared key has a non-absent value.
    pub fn is_present(&self, name: &str) -> Result<bool, ArgumentSetError> {
        Ok(!self.get(name)?.is_absent())
    }

    pub fn str(&self, name: &str) -> Result<Option<&str>, ArgumentSetError> {
        match self.get(name)? {
            Value::Absent => Ok(None),
            Value::Str(s) => Ok(Some(s)),
            _ => Err(mismatch(name, "string")),
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, ArgumentSetError> {
        match self.get(name)? {
            Value::Absent => Ok(None),
            Value::Int(i) => Ok(Some(*i)),
            _ => Err(mismatch(name, "integer")),
        }
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, ArgumentSetError> {
        match self.get(name)? {
            Value::Absent => Ok(None),
            other => other
                .as_float()
                .map(Some)
                .ok_or_else(|| mismatch(name, "number")),
        }
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, ArgumentSetError> {
        match self.get(name)? {
            Value::Absent => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            _ => Err(mismatch(name, "boolean")),
        }
    }

    /// A boolean switch; absent reads as `false`.
    pub fn flag(&self, name: &str) -> Result<bool, ArgumentSetError> {
        Ok(self.bool(name)?.unwrap_or(false))
    }

    pub fn list(&self, name: &str) -> Result<Option<&[Value]>, ArgumentSetError> {
        match self.get(name)? {
            Value::Absent => Ok(None),
            Value::List(items) => Ok(Some(items)),
            _ => Err(mismatch(name, "list")),
        }
    }

    /// All string tokens under `name`, flattened; empty when absent.
    pub fn strings(&self, name: &str) -> Result<Vec<String>, ArgumentSetError> {
        Ok(self.get(name)?.to_strings())
    }

    /// Iterate `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Split into one set per element of the iterated arguments.
    ///
    /// Iterated arguments are zipped: the n-th set receives the n-th element
    /// of each. All present iterated arguments must have the same length.
    /// With no present iterated arguments the set is returned unchanged.
    pub fn explode(&self, iterated: &[&str]) -> Result<Vec<Self>, ArgumentSetError> {
        let mut columns: Vec<(&str, &[Value])> = Vec::new();
        for &name in iterated {
            match self.get(name)? {
                Value::Absent => {}
                Value::List(items) => columns.push((name, items)),
                _ => return Err(mismatch(name, "list")),
            }
        }

        let Some(&(_, first)) = columns.first() else {
            return Ok(vec![self.clone()]);
        };
        let rows = first.len();
        for (name, items) in &columns {
            if items.len() != rows {
                return Err(ArgumentSetError::LengthMismatch {
                    name: name.to_string(),
                    expected: rows,
                    actual: items.len(),
                });
            }
        }

        let mut sets = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut set = self.clone();
            for (name, items) in &columns {
                set.set(name, items[row].clone())?;
            }
            sets.push(set);
        }
        Ok(sets)
    }

    /// Render as a JSON object (absent values become `null`).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn mismatch(name: &str, expected: &'static str) -> ArgumentSetError {
    ArgumentSetError::TypeMismatch {
        name: name.to_string(),
        expected,
    }
}
