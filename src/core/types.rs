//! core::types
//!
//! Strong types for command-table concepts.
//!
//! # Types
//!
//! - [`CommandPath`] - Whitespace-delimited group/subgroup/verb chain
//! - [`FlagName`] - A surface flag spelling such as `--name` or `-n`
//!
//! # Validation
//!
//! These types enforce validity at construction time. A path segment that
//! looks like a flag, or a flag that does not, cannot be represented.
//!
//! # Examples
//!
//! ```
//! use verbwork::core::types::{CommandPath, FlagName};
//!
//! let path = CommandPath::parse("vm  disk attach").unwrap();
//! assert_eq!(path.as_str(), "vm disk attach");
//! assert_eq!(path.segments().len(), 3);
//!
//! let flag = FlagName::new("--resource-group").unwrap();
//! assert_eq!(flag.dest(), "resource_group");
//!
//! assert!(CommandPath::parse("   ").is_err());
//! assert!(FlagName::new("name").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid command path: {0}")]
    InvalidCommandPath(String),

    #[error("invalid flag name: {0}")]
    InvalidFlagName(String),
}

/// The prefix character that marks a token as a flag.
pub const FLAG_PREFIX: char = '-';

/// Whether a raw token is flag-shaped.
pub fn looks_like_flag(token: &str) -> bool {
    token.starts_with(FLAG_PREFIX)
}

/// A validated command path.
///
/// A path is an ordered, non-empty sequence of segments. Input is split on
/// any run of whitespace, so `"vm  create"` and `"vm create"` are the same
/// path. Segments keep their registered casing; matching against user input
/// is case-insensitive and handled by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandPath {
    segments: Vec<String>,
}

impl CommandPath {
    /// Parse a whitespace-delimited path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidCommandPath` if the path is empty, a
    /// segment starts with the flag prefix, or a segment contains control
    /// characters.
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        let segments: Vec<String> = path.split_whitespace().map(str::to_string).collect();
        if segments.is_empty() {
            return Err(TypeError::InvalidCommandPath(
                "command path cannot be empty".into(),
            ));
        }
        for segment in &segments {
            if looks_like_flag(segment) {
                return Err(TypeError::InvalidCommandPath(format!(
                    "segment '{segment}' cannot start with '{FLAG_PREFIX}'"
                )));
            }
            if segment.chars().any(|c| c.is_control()) {
                return Err(TypeError::InvalidCommandPath(format!(
                    "segment '{}' contains control characters",
                    segment.escape_debug()
                )));
            }
            if segment.starts_with('@') {
                return Err(TypeError::InvalidCommandPath(format!(
                    "segment '{segment}' cannot start with '@'"
                )));
            }
        }
        Ok(Self { segments })
    }

    /// The path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment (the verb for a leaf command).
    pub fn verb(&self) -> &str {
        // Construction guarantees at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The single-space joined form.
    pub fn as_str(&self) -> String {
        self.segments.join(" ")
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` is a strict prefix of `other`.
    pub fn is_prefix_of(&self, other: &CommandPath) -> bool {
        self.len() < other.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for CommandPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommandPath> for String {
    fn from(path: CommandPath) -> Self {
        path.as_str()
    }
}

/// A validated surface flag spelling.
///
/// Long flags are `--word[-word...]`, short flags are `-x`. Flags cannot
/// contain whitespace or `=` (which separates an inline value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlagName(String);

impl FlagName {
    /// Create a new validated flag name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidFlagName` if the flag is not `--long` or `-s` shaped.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.chars().any(|c| c.is_whitespace() || c == '=') {
            return Err(TypeError::InvalidFlagName(format!(
                "'{name}' cannot contain whitespace or '='"
            )));
        }

        if let Some(long) = name.strip_prefix("--") {
            if long.is_empty() || long.starts_with('-') {
                return Err(TypeError::InvalidFlagName(format!(
                    "'{name}' needs a name after '--'"
                )));
            }
            return Ok(());
        }

        if let Some(short) = name.strip_prefix('-') {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => return Ok(()),
                _ => {
                    return Err(TypeError::InvalidFlagName(format!(
                        "'{name}' must be a single alphanumeric character after '-'"
                    )))
                }
            }
        }

        Err(TypeError::InvalidFlagName(format!(
            "'{name}' must start with '-' or '--'"
        )))
    }

    /// Get the flag as written, including dashes.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a `--long` flag.
    pub fn is_long(&self) -> bool {
        self.0.starts_with("--")
    }

    /// The name without leading dashes (`--vm-size` -> `vm-size`).
    pub fn bare(&self) -> &str {
        self.0.trim_start_matches(FLAG_PREFIX)
    }

    /// The destination key derived from this flag (`--vm-size` -> `vm_size`).
    pub fn dest(&self) -> String {
        self.bare().replace('-', "_")
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FlagName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlagName> for String {
    fn from(flag: FlagName) -> Self {
        flag.0
    }
}
