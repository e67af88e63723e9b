//! core::argument
//!
//! Argument descriptors and materialized values.
//!
//! # Design
//!
//! An [`ArgumentDescriptor`] describes one logical parameter of a command:
//! its surface spellings, value type, whether it is required, its default,
//! its enumerated choices, and what happens when it is given an explicitly
//! blank value. Every capability is chosen when the descriptor is built;
//! a descriptor never changes type afterwards.
//!
//! # Example
//!
//! ```
//! use verbwork::core::argument::{ArgumentDescriptor, BlankBehavior, Value, ValueKind};
//!
//! let size = ArgumentDescriptor::builder("--size")
//!     .default_value(Value::from("Standard_D2"))
//!     .help("The VM size.")
//!     .build()
//!     .unwrap();
//! assert_eq!(size.dest(), "size");
//! assert!(!size.is_required());
//!
//! let password = ArgumentDescriptor::builder("--admin-password")
//!     .blank(BlankBehavior::PromptSecret { message: None, confirm: true })
//!     .build()
//!     .unwrap();
//! assert!(password.is_secret());
//!
//! // Choices only make sense for enum-like arguments.
//! assert!(ArgumentDescriptor::builder("--count")
//!     .kind(ValueKind::Int)
//!     .choices(["1", "2"])
//!     .build()
//!     .is_err());
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::types::{FlagName, TypeError};

/// Errors from descriptor construction.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    #[error("argument '{argument}': {message}")]
    Invalid { argument: String, message: String },

    #[error("flag '{flag}' is declared by both '{first}' and '{second}'")]
    DuplicateFlag {
        flag: String,
        first: String,
        second: String,
    },

    #[error("argument '{0}' is declared more than once")]
    DuplicateArgument(String),

    #[error("argument group '{group}' names unknown argument '{argument}'")]
    UnknownGroupMember { group: String, argument: String },

    #[error("argument '{argument}' belongs to both '{first}' and '{second}'")]
    ConflictingGroups {
        argument: String,
        first: String,
        second: String,
    },
}

impl DescriptorError {
    fn invalid(argument: &str, message: impl Into<String>) -> Self {
        DescriptorError::Invalid {
            argument: argument.to_string(),
            message: message.into(),
        }
    }
}

/// The declared type of an argument's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Bool,
    /// A string restricted to the descriptor's choices.
    Enum,
    /// One or more values of the inner kind.
    List(Box<ValueKind>),
}

impl ValueKind {
    /// Convenience constructor for `List(kind)`.
    pub fn list_of(kind: ValueKind) -> Self {
        ValueKind::List(Box::new(kind))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ValueKind::List(_))
    }

    /// The kind of each individual token (the element kind for lists).
    pub fn scalar(&self) -> &ValueKind {
        match self {
            ValueKind::List(inner) => inner.scalar(),
            other => other,
        }
    }

    /// Short name used in usage text.
    pub fn label(&self) -> String {
        match self {
            ValueKind::String => "STRING".into(),
            ValueKind::Int => "INT".into(),
            ValueKind::Float => "FLOAT".into(),
            ValueKind::Bool => "BOOL".into(),
            ValueKind::Enum => "ENUM".into(),
            ValueKind::List(inner) => format!("{} [...]", inner.label()),
        }
    }
}

/// What to do when a flag is present with an explicitly empty value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlankBehavior {
    /// No fallback; a blank required argument is an error.
    #[default]
    None,
    /// Read one line from the operator.
    PromptPlain { message: Option<String> },
    /// Read a masked value, optionally twice for confirmation.
    PromptSecret {
        message: Option<String>,
        confirm: bool,
    },
}

impl BlankBehavior {
    pub fn prompts(&self) -> bool {
        !matches!(self, BlankBehavior::None)
    }
}

/// A materialized argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Not supplied and no default.
    Absent,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Flatten a list of strings (or a single string) into owned strings.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Value::Absent => Vec::new(),
            Value::List(items) => items.iter().flat_map(Value::to_strings).collect(),
            other => vec![other.to_string()],
        }
    }

    /// Whether this value is a legal instance of `kind`.
    pub fn matches(&self, kind: &ValueKind) -> bool {
        match (self, kind) {
            (Value::Absent, _) => true,
            (Value::Str(_), ValueKind::String | ValueKind::Enum) => true,
            (Value::Int(_), ValueKind::Int) => true,
            (Value::Float(_), ValueKind::Float) => true,
            (Value::Int(_), ValueKind::Float) => true,
            (Value::Bool(_), ValueKind::Bool) => true,
            (Value::List(items), ValueKind::List(inner)) => {
                items.iter().all(|item| item.matches(inner))
            }
            _ => false,
        }
    }

    /// Convert to a JSON value (`Absent` becomes `null`).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent => serde_json::Value::Null,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => Ok(()),
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Shell-completion hook. Given the partial word, returns candidates.
pub type Completer = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Describes one logical parameter of a command.
#[derive(Clone)]
pub struct ArgumentDescriptor {
    names: Vec<FlagName>,
    dest: String,
    kind: ValueKind,
    required: bool,
    default: Option<Value>,
    choices: Option<Vec<String>>,
    blank: BlankBehavior,
    append: bool,
    iterate: bool,
    configured_default: Option<String>,
    help: Option<String>,
    completer: Option<Completer>,
}

impl fmt::Debug for ArgumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentDescriptor")
            .field("names", &self.names)
            .field("dest", &self.dest)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("choices", &self.choices)
            .field("blank", &self.blank)
            .field("append", &self.append)
            .field("iterate", &self.iterate)
            .field("configured_default", &self.configured_default)
            .field("completer", &self.completer.is_some())
            .finish()
    }
}

impl ArgumentDescriptor {
    /// Start building a descriptor whose canonical spelling is `flag`.
    pub fn builder(flag: &str) -> ArgumentBuilder {
        ArgumentBuilder::new(flag)
    }

    /// All surface spellings; the first is canonical.
    pub fn names(&self) -> &[FlagName] {
        &self.names
    }

    /// The canonical flag (`names()[0]`).
    pub fn canonical(&self) -> &FlagName {
        &self.names[0]
    }

    /// Key under which the value appears in the materialized set.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn choices(&self) -> Option<&[String]> {
        self.choices.as_deref()
    }

    pub fn blank(&self) -> &BlankBehavior {
        &self.blank
    }

    /// Repeated occurrences add a new group instead of replacing.
    pub fn is_append(&self) -> bool {
        self.append
    }

    /// The handler is invoked once per element of this list.
    pub fn is_iterated(&self) -> bool {
        self.iterate
    }

    /// Key under `[defaults]` in the config that supplies this argument.
    pub fn configured_default(&self) -> Option<&str> {
        self.configured_default.as_deref()
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn completer(&self) -> Option<&Completer> {
        self.completer.as_ref()
    }

    /// Whether values must be kept out of logs and error messages.
    pub fn is_secret(&self) -> bool {
        matches!(self.blank, BlankBehavior::PromptSecret { .. })
    }

    /// Whether `flag` is one of this argument's spellings.
    pub fn answers_to(&self, flag: &str) -> bool {
        self.names.iter().any(|n| n.as_str() == flag)
    }

    /// Candidate values for completion: choices first, then the completer.
    pub fn candidates(&self, partial: &str) -> Vec<String> {
        if let Some(choices) = &self.choices {
            return choices
                .iter()
                .filter(|c| c.to_lowercase().starts_with(&partial.to_lowercase()))
                .cloned()
                .collect();
        }
        self.completer
            .as_ref()
            .map(|complete| complete(partial))
            .unwrap_or_default()
    }
}

/// Builder for [`ArgumentDescriptor`].
pub struct ArgumentBuilder {
    names: Vec<String>,
    dest: Option<String>,
    kind: ValueKind,
    required: bool,
    default: Option<Value>,
    choices: Option<Vec<String>>,
    blank: BlankBehavior,
    append: bool,
    iterate: bool,
    configured_default: Option<String>,
    help: Option<String>,
    completer: Option<Completer>,
}

impl ArgumentBuilder {
    fn new(flag: &str) -> Self {
        Self {
            names: vec![flag.to_string()],
            dest: None,
            kind: ValueKind::String,
            required: false,
            default: None,
            choices: None,
            blank: BlankBehavior::None,
            append: false,
            iterate: false,
            configured_default: None,
            help: None,
            completer: None,
        }
    }

    /// Add another surface spelling.
    pub fn alias(mut self, flag: &str) -> Self {
        self.names.push(flag.to_string());
        self
    }

    /// Override the destination key (defaults to the canonical flag's dest).
    pub fn dest(mut self, dest: &str) -> Self {
        self.dest = Some(dest.to_string());
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restrict values to a closed set. Implies `ValueKind::Enum` unless the
    /// kind is already a list of enums.
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn blank(mut self, behavior: BlankBehavior) -> Self {
        self.blank = behavior;
        self
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn iterate(mut self) -> Self {
        self.iterate = true;
        self
    }

    pub fn configured_default(mut self, key: &str) -> Self {
        self.configured_default = Some(key.to_string());
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    pub fn completer(mut self, completer: Completer) -> Self {
        self.completer = Some(completer);
        self
    }

    /// Validate and build the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError` when names are malformed or duplicated, or
    /// when capabilities are combined in a way the materializer cannot honor
    /// (choices on a numeric kind, prompting for a list, a default outside
    /// the choices, appending to a scalar).
    pub fn build(self) -> Result<ArgumentDescriptor, DescriptorError> {
        let names = self
            .names
            .into_iter()
            .map(FlagName::new)
            .collect::<Result<Vec<_>, _>>()?;

        let label = names[0].as_str().to_string();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(DescriptorError::invalid(
                    &label,
                    format!("flag '{name}' is listed twice"),
                ));
            }
        }

        let dest = self.dest.unwrap_or_else(|| names[0].dest());
        if dest.is_empty() {
            return Err(DescriptorError::invalid(&label, "destination cannot be empty"));
        }

        let mut kind = self.kind;
        if self.choices.is_some() && kind == ValueKind::String {
            kind = ValueKind::Enum;
        }

        match (&self.choices, kind.scalar()) {
            (None, ValueKind::Enum) => {
                return Err(DescriptorError::invalid(&label, "enum arguments need choices"));
            }
            (Some(choices), ValueKind::Enum) if choices.is_empty() => {
                return Err(DescriptorError::invalid(&label, "choices cannot be empty"));
            }
            (Some(_), scalar) if *scalar != ValueKind::Enum => {
                return Err(DescriptorError::invalid(
                    &label,
                    "choices are only valid for enum arguments",
                ));
            }
            _ => {}
        }

        if (self.append || self.iterate) && !kind.is_list() {
            return Err(DescriptorError::invalid(
                &label,
                "append and iterate require a list argument",
            ));
        }

        if self.blank.prompts() {
            if kind.is_list() || kind == ValueKind::Bool {
                return Err(DescriptorError::invalid(
                    &label,
                    "only scalar non-boolean arguments can prompt",
                ));
            }
            if matches!(self.blank, BlankBehavior::PromptSecret { .. })
                && kind != ValueKind::String
            {
                return Err(DescriptorError::invalid(
                    &label,
                    "secret prompts require a string argument",
                ));
            }
        }

        if let Some(default) = &self.default {
            let stored_kind = if self.append {
                ValueKind::list_of(kind.clone())
            } else {
                kind.clone()
            };
            if !default.matches(&stored_kind) {
                return Err(DescriptorError::invalid(
                    &label,
                    format!("default '{default}' is not a {}", kind.label()),
                ));
            }
            if let Some(choices) = &self.choices {
                for value in default.to_strings() {
                    if !choices.contains(&value) {
                        return Err(DescriptorError::invalid(
                            &label,
                            format!("default '{value}' is not one of the choices"),
                        ));
                    }
                }
            }
        }

        Ok(ArgumentDescriptor {
            names,
            dest,
            kind,
            required: self.required,
            default: self.default,
            choices: self.choices,
            blank: self.blank,
            append: self.append,
            iterate: self.iterate,
            configured_default: self.configured_default,
            help: self.help,
            completer: self.completer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let arg = ArgumentDescriptor::builder("--name")
            .alias("-n")
            .required()
            .build()
            .unwrap();
        assert_eq!(arg.canonical().as_str(), "--name");
        assert_eq!(arg.dest(), "name");
        assert_eq!(arg.kind(), &ValueKind::String);
        assert!(arg.answers_to("-n"));
        assert!(!arg.answers_to("--nam"));
        assert!(arg.is_required());
        assert!(!arg.is_secret());
    }

    #[test]
    fn choices_imply_enum() {
        let arg = ArgumentDescriptor::builder("--sku")
            .choices(["Standard_LRS", "Premium_LRS"])
            .build()
            .unwrap();
        assert_eq!(arg.kind(), &ValueKind::Enum);
        assert_eq!(arg.candidates("prem"), vec!["Premium_LRS".to_string()]);
    }

    #[test]
    fn enum_without_choices_rejected() {
        let err = ArgumentDescriptor::builder("--sku")
            .kind(ValueKind::Enum)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("need choices"));
    }

    #[test]
    fn default_outside_choices_rejected() {
        let err = ArgumentDescriptor::builder("--sku")
            .choices(["a", "b"])
            .default_value(Value::from("c"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not one of the choices"));
    }

    #[test]
    fn default_must_match_kind() {
        assert!(ArgumentDescriptor::builder("--count")
            .kind(ValueKind::Int)
            .default_value(Value::from("three"))
            .build()
            .is_err());
        assert!(ArgumentDescriptor::builder("--ratio")
            .kind(ValueKind::Float)
            .default_value(Value::Int(1))
            .build()
            .is_ok());
    }

    #[test]
    fn append_requires_list() {
        assert!(ArgumentDescriptor::builder("--tag").append().build().is_err());
        assert!(ArgumentDescriptor::builder("--tag")
            .kind(ValueKind::list_of(ValueKind::String))
            .append()
            .build()
            .is_ok());
    }

    #[test]
    fn prompting_lists_rejected() {
        assert!(ArgumentDescriptor::builder("--tags")
            .kind(ValueKind::list_of(ValueKind::String))
            .blank(BlankBehavior::PromptPlain { message: None })
            .build()
            .is_err());
    }

    #[test]
    fn secret_prompt_needs_string() {
        assert!(ArgumentDescriptor::builder("--pin")
            .kind(ValueKind::Int)
            .blank(BlankBehavior::PromptSecret {
                message: None,
                confirm: false
            })
            .build()
            .is_err());
    }

    #[test]
    fn duplicate_alias_rejected() {
        assert!(ArgumentDescriptor::builder("--name")
            .alias("--name")
            .build()
            .is_err());
    }

    #[test]
    fn value_json_and_display() {
        let v = Value::List(vec![Value::from("a"), Value::Int(2), Value::Absent]);
        assert_eq!(v.to_json(), serde_json::json!(["a", 2, null]));
        assert_eq!(Value::List(vec![Value::from("a"), Value::from("b")]).to_string(), "a b");
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
    }

    #[test]
    fn completer_used_without_choices() {
        let arg = ArgumentDescriptor::builder("--location")
            .completer(Arc::new(|partial: &str| {
                ["eastus", "westus"]
                    .iter()
                    .filter(|l| l.starts_with(partial))
                    .map(|l| l.to_string())
                    .collect()
            }))
            .build()
            .unwrap();
        assert_eq!(arg.candidates("we"), vec!["westus".to_string()]);
    }
}
