//! engine::dispatch
//!
//! End-to-end dispatch of one command line.
//!
//! # Flow
//!
//! 1. Walk the tree. If `--help`/`-h` follows the walked path, stop with
//!    [`DispatchOutcome::Help`] for the node reached
//! 2. Resolve the command ([`DispatchError`] on failure)
//! 3. Materialize the flag tail ([`ValidationError`] on failure)
//! 4. Explode iterated arguments into one set per element
//! 5. Invoke the handler once per set
//!
//! Every failure is reported to the [`ErrorSink`] before it is returned.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::file_expand::FileExpander;
use super::materialize::{Materializer, ValidationError};
use super::registry::Registry;
use super::resolve::walk;
use super::{Context, EngineError};
use crate::core::args::{ArgumentSetError, MaterializedArgumentSet};
use crate::core::command::CommandDescriptor;
use crate::core::types::CommandPath;
use crate::ui::prompts::Prompter;

/// Tokens that request help instead of dispatch.
pub const HELP_FLAGS: &[&str] = &["--help", "-h"];

/// Records dispatch failures. Implementations must not fail.
pub trait ErrorSink {
    fn record(&self, command: Option<&CommandPath>, error: &EngineError);
}

/// Records failures as `warn` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn record(&self, command: Option<&CommandPath>, error: &EngineError) {
        let command = command.map(CommandPath::as_str).unwrap_or_default();
        warn!(kind = ?error.kind(), command = %command, error = %error, "command failed");
    }
}

/// What help was requested for.
#[derive(Debug, Clone)]
pub enum HelpTopic {
    /// A group: its path and `(segment, summary)` for each child.
    Group {
        path: String,
        children: Vec<(String, Option<String>)>,
    },
    /// A command's usage.
    Command(Arc<CommandDescriptor>),
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler ran once per exploded argument set.
    Completed {
        path: CommandPath,
        results: Vec<serde_json::Value>,
    },
    /// Help was requested; nothing was invoked.
    Help(HelpTopic),
}

/// Dispatches command lines against a registry.
pub struct Dispatcher<'r> {
    registry: &'r Registry,
    ctx: &'r Context,
    sink: Box<dyn ErrorSink + 'r>,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r Registry, ctx: &'r Context) -> Self {
        Self {
            registry,
            ctx,
            sink: Box::new(TracingErrorSink),
        }
    }

    pub fn with_error_sink(mut self, sink: Box<dyn ErrorSink + 'r>) -> Self {
        self.sink = sink;
        self
    }

    /// Dispatch `argv` (without the program name).
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage as an [`EngineError`].
    pub fn dispatch(
        &self,
        argv: &[String],
        prompter: &mut dyn Prompter,
    ) -> Result<DispatchOutcome, EngineError> {
        if let Some(topic) = self.help_topic(argv) {
            debug!("help requested");
            return Ok(DispatchOutcome::Help(topic));
        }

        let resolution = self
            .registry
            .resolve(argv)
            .map_err(|e| self.report(None, e.into()))?;
        let descriptor = resolution.descriptor;
        let path = descriptor.path().clone();

        let sets = self
            .bind(&descriptor, resolution.remaining, prompter)
            .map_err(|e| self.report(Some(&path), e.into()))?;

        info!(command = %path, invocations = sets.len(), "invoking handler");
        let mut results = Vec::with_capacity(sets.len());
        for set in &sets {
            let result = descriptor
                .invoke(set)
                .map_err(|e| self.report(Some(&path), EngineError::Handler(e)))?;
            results.push(result);
        }

        Ok(DispatchOutcome::Completed { path, results })
    }

    fn bind(
        &self,
        descriptor: &CommandDescriptor,
        tokens: &[String],
        prompter: &mut dyn Prompter,
    ) -> Result<Vec<MaterializedArgumentSet>, ValidationError> {
        let mut expander = FileExpander::new(self.ctx.file_prefix);
        if let Some(cwd) = &self.ctx.cwd {
            expander = expander.relative_to(cwd);
        }

        let set = Materializer::new(prompter)
            .with_file_expander(expander)
            .with_configured_defaults(self.ctx.defaults.clone())
            .materialize(descriptor, tokens)?;

        set.explode(&descriptor.iterated_arguments())
            .map_err(|e| explode_error(descriptor, e))
    }

    fn help_topic(&self, argv: &[String]) -> Option<HelpTopic> {
        let walked = walk(self.registry.root(), argv);
        if !walked
            .remaining
            .iter()
            .any(|token| HELP_FLAGS.contains(&token.as_str()))
        {
            return None;
        }

        let node = walked.node;
        if let Some(descriptor) = node.descriptor() {
            return Some(HelpTopic::Command(descriptor.clone()));
        }
        Some(HelpTopic::Group {
            path: walked.path(),
            children: node
                .children()
                .map(|child| {
                    let summary = child
                        .descriptor()
                        .and_then(|d| d.summary())
                        .map(str::to_string);
                    (child.segment().to_string(), summary)
                })
                .collect(),
        })
    }

    fn report(&self, command: Option<&CommandPath>, error: EngineError) -> EngineError {
        self.sink.record(command, &error);
        error
    }
}

fn explode_error(descriptor: &CommandDescriptor, err: ArgumentSetError) -> ValidationError {
    match err {
        ArgumentSetError::LengthMismatch {
            name,
            expected,
            actual,
        } => ValidationError::InvalidArgumentValue {
            argument: descriptor
                .argument(&name)
                .map(|a| a.canonical().to_string())
                .unwrap_or(name),
            value: format!("{actual} values"),
            reason: format!("iterated arguments must all have {expected} values"),
        },
        other => ValidationError::InvalidArgumentValue {
            argument: String::new(),
            value: String::new(),
            reason: other.to_string(),
        },
    }
}
