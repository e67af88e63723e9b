//! engine::file_expand
//!
//! `@file` substitution for argument values.
//!
//! # Grammar
//!
//! A value is a candidate when it is `@path` or `key=@path` (split on the
//! first `=`). The `@` must be the first character of the value part, so
//! `user@example.com` is never a candidate. A candidate whose path cannot
//! be opened is left as the literal string.
//!
//! This is a heuristic: `@handle` is treated as a literal only because no
//! file named `handle` exists. [`FilePrefixPolicy::Strict`] narrows the
//! candidates to values that are unambiguously paths.
//!
//! # Decoding
//!
//! Contents are decoded as UTF-8 with a leading byte-order mark removed.
//! Content is otherwise returned verbatim, including trailing newlines.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Sigil that marks a file reference.
pub const FILE_SIGIL: char = '@';

const BOM: char = '\u{feff}';

/// Which `@` values are treated as file references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilePrefixPolicy {
    /// Any `@path` whose path can be opened.
    #[default]
    Lenient,
    /// Only `@/`, `@./`, `@../` and `@~` forms.
    Strict,
}

/// Errors from reading a file reference that was opened successfully.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("file '{}' is not valid UTF-8 text", .path.display())]
    NotUtf8 { path: PathBuf },

    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Expands `@file` references.
#[derive(Debug, Clone, Default)]
pub struct FileExpander {
    policy: FilePrefixPolicy,
    base: Option<PathBuf>,
}

impl FileExpander {
    pub fn new(policy: FilePrefixPolicy) -> Self {
        Self { policy, base: None }
    }

    /// Resolve relative paths against `dir` instead of the process cwd.
    pub fn relative_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base = Some(dir.into());
        self
    }

    pub fn policy(&self) -> FilePrefixPolicy {
        self.policy
    }

    /// Expand `value` if it is a file reference.
    ///
    /// Returns the value unchanged when it is not a candidate or the file
    /// cannot be opened.
    ///
    /// # Errors
    ///
    /// Returns `ExpandError` if the file opened but its contents could not
    /// be read as UTF-8 text.
    pub fn expand(&self, value: &str) -> Result<String, ExpandError> {
        if let Some(reference) = value.strip_prefix(FILE_SIGIL) {
            return Ok(self.load(reference)?.unwrap_or_else(|| value.to_string()));
        }

        if let Some((key, rest)) = value.split_once('=') {
            if let Some(reference) = rest.strip_prefix(FILE_SIGIL) {
                if let Some(contents) = self.load(reference)? {
                    return Ok(format!("{key}={contents}"));
                }
            }
        }

        Ok(value.to_string())
    }

    fn load(&self, reference: &str) -> Result<Option<String>, ExpandError> {
        if reference.is_empty() || !self.accepts(reference) {
            return Ok(None);
        }

        let path = self.resolve_path(reference);
        if path.is_dir() {
            return Ok(None);
        }
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "not a file reference, using literal");
                return Ok(None);
            }
        };

        let mut bytes = Vec::new();
        if let Err(source) = file.read_to_end(&mut bytes) {
            return Err(ExpandError::Read { path, source });
        }

        let text = String::from_utf8(bytes).map_err(|_| ExpandError::NotUtf8 { path: path.clone() })?;
        debug!(path = %path.display(), bytes = text.len(), "expanded file reference");
        Ok(Some(strip_bom(text)))
    }

    fn accepts(&self, reference: &str) -> bool {
        match self.policy {
            FilePrefixPolicy::Lenient => true,
            FilePrefixPolicy::Strict => ["/", "./", "../", "~"]
                .iter()
                .any(|prefix| reference.starts_with(prefix)),
        }
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        let expanded = expand_home(reference);
        match &self.base {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        }
    }
}

/// Replace a leading `~` with the home directory.
fn expand_home(reference: &str) -> PathBuf {
    let rest = if reference == "~" {
        Some("")
    } else {
        reference.strip_prefix("~/")
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(reference).to_path_buf(),
    }
}

fn strip_bom(text: String) -> String {
    match text.strip_prefix(BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}
