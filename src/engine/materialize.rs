//! engine::materialize
//!
//! Turns the flag tail of a command line into a typed argument set.
//!
//! # Processing Model
//!
//! A single left-to-right scan. A recognized flag (or `--flag=value`) opens
//! an occurrence; following tokens that are not flags are its values. Each
//! occurrence is converted as soon as it closes, so prompts appear in
//! command-line order:
//!
//! 1. `@file` expansion
//! 2. blank fallback when the value is empty or missing
//! 3. coercion to the declared type, then enum validation
//! 4. merge: lists replace or append, scalars keep the last value
//!
//! After the scan every undeclared-by-the-user argument is filled from the
//! configured defaults, then the declared default, else it is either
//! missing (required) or absent.
//!
//! # Secrets
//!
//! Values of `prompt-secret` arguments never appear in logs or errors.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use super::file_expand::FileExpander;
use crate::core::args::MaterializedArgumentSet;
use crate::core::argument::{ArgumentDescriptor, BlankBehavior, Value, ValueKind};
use crate::core::command::CommandDescriptor;
use crate::core::types::looks_like_flag;
use crate::ui::prompts::{PromptError, Prompter};

/// Placeholder used wherever a secret value would be shown.
pub const REDACTED: &str = "<redacted>";

/// Errors from argument validation. Each names the offending argument.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the following argument is required: {argument}")]
    MissingRequiredArgument { argument: String },

    #[error("invalid value '{value}' for {argument}: {reason}")]
    InvalidArgumentValue {
        argument: String,
        value: String,
        reason: String,
    },

    #[error("argument {argument} cannot be blank")]
    ArgumentCannotBeBlank { argument: String },

    #[error("values entered for {argument} do not match")]
    ConfirmationMismatch { argument: String },

    #[error("unrecognized argument: {token}")]
    UnrecognizedArgument { token: String },

    #[error("could not prompt for {argument}: {message}")]
    PromptFailed { argument: String, message: String },
}

impl ValidationError {
    /// The argument the error is about, when there is one.
    pub fn argument(&self) -> Option<&str> {
        match self {
            ValidationError::MissingRequiredArgument { argument }
            | ValidationError::InvalidArgumentValue { argument, .. }
            | ValidationError::ArgumentCannotBeBlank { argument }
            | ValidationError::ConfirmationMismatch { argument }
            | ValidationError::PromptFailed { argument, .. } => Some(argument),
            ValidationError::UnrecognizedArgument { .. } => None,
        }
    }
}

/// One flag occurrence and the raw values that followed it.
#[derive(Debug)]
struct Occurrence {
    index: usize,
    values: Vec<String>,
}

enum Token<'t> {
    Flag(usize, Option<&'t str>),
    Value,
    Unknown,
}

/// Converts command-line tokens into a [`MaterializedArgumentSet`].
pub struct Materializer<'p> {
    prompter: &'p mut dyn Prompter,
    expander: FileExpander,
    defaults: BTreeMap<String, String>,
}

impl<'p> Materializer<'p> {
    pub fn new(prompter: &'p mut dyn Prompter) -> Self {
        Self {
            prompter,
            expander: FileExpander::default(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn with_file_expander(mut self, expander: FileExpander) -> Self {
        self.expander = expander;
        self
    }

    /// Values for arguments that declare a configured-default key.
    pub fn with_configured_defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Materialize `tokens` against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` encountered, scanning left to
    /// right, then checking missing arguments in declaration order.
    pub fn materialize(
        &mut self,
        descriptor: &CommandDescriptor,
        tokens: &[String],
    ) -> Result<MaterializedArgumentSet, ValidationError> {
        let arguments = descriptor.arguments();
        let mut slots: Vec<Option<Value>> = vec![None; arguments.len()];
        let mut set = descriptor.empty_argument_set();
        let mut open: Option<Occurrence> = None;

        for token in tokens {
            match classify(descriptor, token) {
                Token::Flag(index, inline) => {
                    if let Some(done) = open.take() {
                        self.close(done, arguments, &mut slots, &mut set)?;
                    }
                    open = Some(Occurrence {
                        index,
                        values: inline.map(str::to_string).into_iter().collect(),
                    });
                }
                Token::Value => match open.as_mut() {
                    Some(occurrence) => occurrence.values.push(token.clone()),
                    None => return Err(unrecognized(token)),
                },
                Token::Unknown => return Err(unrecognized(token)),
            }
        }
        if let Some(done) = open.take() {
            self.close(done, arguments, &mut slots, &mut set)?;
        }

        for (arg, slot) in arguments.iter().zip(slots) {
            let value = match slot {
                Some(value) => value,
                None => self.fill_missing(arg)?,
            };
            trace!(argument = arg.dest(), value = %display_value(arg, &value), "materialized");
            set.set(arg.dest(), value)
                .map_err(|e| invalid(arg, "", e.to_string()))?;
        }

        Ok(set)
    }

    fn close(
        &mut self,
        occurrence: Occurrence,
        arguments: &[ArgumentDescriptor],
        slots: &mut [Option<Value>],
        set: &mut MaterializedArgumentSet,
    ) -> Result<(), ValidationError> {
        let arg = &arguments[occurrence.index];
        let mut raw = Vec::with_capacity(occurrence.values.len());
        for value in &occurrence.values {
            let expanded = self
                .expander
                .expand(value)
                .map_err(|e| invalid(arg, value, e.to_string()))?;
            raw.push(expanded);
        }

        let value = self.convert(arg, raw)?;
        let slot = &mut slots[occurrence.index];
        *slot = Some(match (slot.take(), value) {
            (Some(Value::List(mut groups)), group) if arg.is_append() => {
                groups.push(group);
                Value::List(groups)
            }
            (_, group) if arg.is_append() => Value::List(vec![group]),
            (_, value) => value,
        });
        set.record_occurrence(arg.dest());
        Ok(())
    }

    fn convert(&mut self, arg: &ArgumentDescriptor, raw: Vec<String>) -> Result<Value, ValidationError> {
        match arg.kind() {
            ValueKind::Bool => match raw.as_slice() {
                [] => Ok(Value::Bool(true)),
                [one] => coerce(arg, arg.kind(), one),
                [_, extra, ..] => Err(unrecognized(extra)),
            },
            ValueKind::List(inner) => {
                if raw.is_empty() || raw.iter().all(String::is_empty) {
                    if arg.is_required() {
                        return Err(ValidationError::ArgumentCannotBeBlank {
                            argument: label(arg),
                        });
                    }
                    return Ok(Value::List(Vec::new()));
                }
                raw.iter()
                    .map(|item| coerce(arg, inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            kind => match raw.as_slice() {
                [] => self.blank(arg),
                [one] if one.is_empty() => self.blank(arg),
                [one] => coerce(arg, kind, one),
                [_, extra, ..] => Err(unrecognized(extra)),
            },
        }
    }

    /// Fallback for a flag given with an empty value.
    fn blank(&mut self, arg: &ArgumentDescriptor) -> Result<Value, ValidationError> {
        let cannot_be_blank = || ValidationError::ArgumentCannotBeBlank {
            argument: label(arg),
        };

        match arg.blank() {
            BlankBehavior::None => {
                if arg.is_required() {
                    Err(cannot_be_blank())
                } else if *arg.kind() == ValueKind::String {
                    Ok(Value::Str(String::new()))
                } else {
                    Err(invalid(arg, "", format!("expected a {}", arg.kind().label())))
                }
            }
            _ if !self.prompter.is_interactive() => match arg.default() {
                Some(default) => Ok(default.clone()),
                None => Err(cannot_be_blank()),
            },
            BlankBehavior::PromptPlain { message } => {
                let message = message
                    .clone()
                    .unwrap_or_else(|| format!("{}: ", arg.canonical()));
                let answer = self.ask(arg, |p| p.input(&message))?;
                coerce(arg, arg.kind(), &answer)
            }
            BlankBehavior::PromptSecret { message, confirm } => {
                let message = message
                    .clone()
                    .unwrap_or_else(|| format!("{}: ", arg.canonical()));
                let first = self.ask(arg, |p| p.password(&message))?;
                if *confirm {
                    let again = format!("Confirm {}: ", arg.canonical());
                    let second = self.ask(arg, |p| p.password(&again))?;
                    if first != second {
                        return Err(ValidationError::ConfirmationMismatch {
                            argument: label(arg),
                        });
                    }
                }
                Ok(Value::Str(first))
            }
        }
    }

    /// Ask once, and once more if the answer is empty.
    fn ask<F>(&mut self, arg: &ArgumentDescriptor, mut prompt: F) -> Result<String, ValidationError>
    where
        F: FnMut(&mut dyn Prompter) -> Result<String, PromptError>,
    {
        for _ in 0..2 {
            let answer = prompt(&mut *self.prompter).map_err(|e| match e {
                PromptError::NotInteractive => ValidationError::ArgumentCannotBeBlank {
                    argument: label(arg),
                },
                other => ValidationError::PromptFailed {
                    argument: label(arg),
                    message: other.to_string(),
                },
            })?;
            if !answer.is_empty() {
                return Ok(answer);
            }
        }
        Err(ValidationError::ArgumentCannotBeBlank {
            argument: label(arg),
        })
    }

    fn fill_missing(&self, arg: &ArgumentDescriptor) -> Result<Value, ValidationError> {
        if let Some(raw) = arg.configured_default().and_then(|key| self.defaults.get(key)) {
            return configured(arg, raw);
        }
        if let Some(default) = arg.default() {
            return Ok(default.clone());
        }
        if arg.is_required() {
            return Err(ValidationError::MissingRequiredArgument {
                argument: label(arg),
            });
        }
        Ok(Value::Absent)
    }
}

fn classify<'t>(descriptor: &CommandDescriptor, token: &'t str) -> Token<'t> {
    if let Some(index) = descriptor.flag_index(token) {
        return Token::Flag(index, None);
    }
    if !looks_like_flag(token) || token == "-" || is_negative_number(token) {
        return Token::Value;
    }
    if let Some((name, value)) = token.split_once('=') {
        if let Some(index) = descriptor.flag_index(name) {
            return Token::Flag(index, Some(value));
        }
    }
    Token::Unknown
}

fn is_negative_number(token: &str) -> bool {
    token
        .strip_prefix('-')
        .is_some_and(|rest| rest.parse::<f64>().is_ok())
}

/// Coerce a configured-default string to the argument's type.
fn configured(arg: &ArgumentDescriptor, raw: &str) -> Result<Value, ValidationError> {
    match arg.kind() {
        ValueKind::List(inner) => {
            let items = raw
                .split_whitespace()
                .map(|item| coerce(arg, inner, item))
                .collect::<Result<Vec<_>, _>>()?;
            if arg.is_append() {
                Ok(Value::List(vec![Value::List(items)]))
            } else {
                Ok(Value::List(items))
            }
        }
        kind => coerce(arg, kind, raw),
    }
}

/// Convert one raw token to a scalar of `kind`.
fn coerce(arg: &ArgumentDescriptor, kind: &ValueKind, raw: &str) -> Result<Value, ValidationError> {
    match kind {
        ValueKind::String => Ok(Value::Str(raw.to_string())),
        ValueKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid(arg, raw, "expected an integer")),
        ValueKind::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float)
            .ok_or_else(|| invalid(arg, raw, "expected a number")),
        ValueKind::Bool => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| invalid(arg, raw, "expected true or false")),
        ValueKind::Enum => {
            let choices = arg.choices().unwrap_or_default();
            choices
                .iter()
                .find(|choice| choice.eq_ignore_ascii_case(raw))
                .map(|choice| Value::Str(choice.clone()))
                .ok_or_else(|| invalid(arg, raw, format!("allowed values: {}", choices.join(", "))))
        }
        ValueKind::List(inner) => coerce(arg, inner, raw),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn label(arg: &ArgumentDescriptor) -> String {
    arg.canonical().to_string()
}

fn invalid(arg: &ArgumentDescriptor, value: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidArgumentValue {
        argument: label(arg),
        value: if arg.is_secret() {
            REDACTED.to_string()
        } else {
            value.to_string()
        },
        reason: reason.into(),
    }
}

fn unrecognized(token: &str) -> ValidationError {
    ValidationError::UnrecognizedArgument {
        token: token.to_string(),
    }
}

fn display_value(arg: &ArgumentDescriptor, value: &Value) -> String {
    if arg.is_secret() && !value.is_absent() {
        REDACTED.to_string()
    } else {
        format!("{:?}", value)
    }
}
