//! ui::prompts
//!
//! The interactive channel used by blank-value fallbacks.
//!
//! # Design
//!
//! Prompting goes through the [`Prompter`] trait so the materializer never
//! touches the terminal directly. Callers check
//! [`Prompter::is_interactive`] before asking; prompting on a
//! non-interactive channel is an error, never a silent default.
//!
//! - [`TerminalPrompter`] reads stdin and masks secrets with `rpassword`
//! - [`ScriptedPrompter`] replays canned answers for tests and embedding

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

/// A source of operator input.
pub trait Prompter {
    /// Whether prompts can be answered. Checked before any prompt is shown.
    fn is_interactive(&self) -> bool;

    /// Read one line of plain text, without the trailing newline.
    fn input(&mut self, message: &str) -> Result<String, PromptError>;

    /// Read one line without echoing it.
    fn password(&mut self, message: &str) -> Result<String, PromptError>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    enabled: bool,
}

impl TerminalPrompter {
    /// `enabled` is the configured interactive setting; the prompter is
    /// only interactive when it is set and stdin is a terminal.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        self.enabled && io::stdin().is_terminal()
    }

    fn input(&mut self, message: &str) -> Result<String, PromptError> {
        if !self.is_interactive() {
            return Err(PromptError::NotInteractive);
        }

        let mut stderr = io::stderr();
        write!(stderr, "{message}").map_err(|e| PromptError::IoError(e.to_string()))?;
        stderr
            .flush()
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PromptError::IoError(e.to_string()))?;
        if read == 0 {
            return Err(PromptError::Cancelled);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn password(&mut self, message: &str) -> Result<String, PromptError> {
        if !self.is_interactive() {
            return Err(PromptError::NotInteractive);
        }
        rpassword::prompt_password(message).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => PromptError::Cancelled,
            _ => PromptError::IoError(e.to_string()),
        })
    }
}

/// Replays a fixed sequence of answers.
///
/// Plain and secret prompts draw from the same queue. Running out of
/// answers reads as the operator cancelling.
///
/// ```
/// use verbwork::ui::prompts::{Prompter, ScriptedPrompter};
///
/// let mut prompter = ScriptedPrompter::new(["abc", "abc"]);
/// assert_eq!(prompter.password("Password: ").unwrap(), "abc");
/// assert_eq!(prompter.password("Confirm: ").unwrap(), "abc");
/// assert!(prompter.password("again: ").is_err());
/// assert_eq!(prompter.asked().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    interactive: bool,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    /// An interactive prompter answering with `answers` in order.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            interactive: true,
            asked: Vec::new(),
        }
    }

    /// A prompter that reports no terminal.
    pub fn non_interactive() -> Self {
        Self::default()
    }

    /// Messages shown so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, message: &str) -> Result<String, PromptError> {
        if !self.interactive {
            return Err(PromptError::NotInteractive);
        }
        self.asked.push(message.to_string());
        self.answers.pop_front().ok_or(PromptError::Cancelled)
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn input(&mut self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }

    fn password(&mut self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }
}
