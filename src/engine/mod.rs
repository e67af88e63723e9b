//! engine
//!
//! Resolves command lines to handler calls.
//!
//! # Architecture
//!
//! The engine turns a flat registration table into a command tree once at
//! startup, then runs each command line through a fixed pipeline:
//!
//! ```text
//! Resolve -> [Help] -> Materialize -> Explode -> Invoke
//! ```
//!
//! 1. **Resolve**: walk the tree, splitting argv into a command and its flags
//! 2. **Materialize**: bind flags to typed values (`@file`, prompts, defaults)
//! 3. **Explode**: one argument set per element of iterated arguments
//! 4. **Invoke**: call the handler for each set
//!
//! Update commands run the [`update`] protocol inside their handler.
//!
//! # Invariants
//!
//! - The registry is immutable after [`registry::RegistryBuilder::build`]
//! - Each dispatch allocates its own argument sets
//! - No error is retried; every failure surfaces with its [`ErrorKind`]
//!
//! # Example
//!
//! ```
//! use verbwork::core::argument::ArgumentDescriptor;
//! use verbwork::core::command::{handler, CommandDescriptor};
//! use verbwork::engine::dispatch::{DispatchOutcome, Dispatcher};
//! use verbwork::engine::registry::Registry;
//! use verbwork::engine::Context;
//! use verbwork::ui::prompts::ScriptedPrompter;
//!
//! let registry = Registry::builder()
//!     .register(
//!         CommandDescriptor::builder("greet", handler(|args| {
//!             Ok(serde_json::json!(format!("hello {}", args.str("name")?.unwrap_or("world"))))
//!         }))
//!         .argument(ArgumentDescriptor::builder("--name").build().unwrap())
//!         .build()
//!         .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let ctx = Context::default();
//! let argv: Vec<String> = ["greet", "--name", "vw"].iter().map(|s| s.to_string()).collect();
//! let mut prompter = ScriptedPrompter::non_interactive();
//!
//! let dispatcher = Dispatcher::new(&registry, &ctx);
//! let outcome = dispatcher.dispatch(&argv, &mut prompter).unwrap();
//! match outcome {
//!     DispatchOutcome::Completed { results, .. } => assert_eq!(results[0], "hello vw"),
//!     DispatchOutcome::Help(_) => unreachable!(),
//! }
//! ```

pub mod dispatch;
pub mod file_expand;
pub mod materialize;
pub mod properties;
pub mod registry;
pub mod resolve;
pub mod tree;
pub mod update;

pub use dispatch::{DispatchOutcome, Dispatcher, ErrorSink, HelpTopic, TracingErrorSink};
pub use file_expand::{FileExpander, FilePrefixPolicy};
pub use materialize::{Materializer, ValidationError};
pub use registry::{Registry, RegistryBuilder};
pub use resolve::DispatchError;
pub use tree::{BuildError, CommandTreeNode};
pub use update::{FailureKind, FetchError, GenericUpdate, UpdateError, UpdatePhase};

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Execution context for dispatch.
///
/// Contains global settings derived from CLI flags and configuration that
/// affect how arguments are bound.
#[derive(Debug, Clone)]
pub struct Context {
    /// Working directory override. Relative `@file` paths resolve here.
    pub cwd: Option<PathBuf>,
    /// Interactive prompting allowed.
    pub interactive: bool,
    /// Which `@` values are file references.
    pub file_prefix: FilePrefixPolicy,
    /// `[defaults]` table for configured-default arguments.
    pub defaults: BTreeMap<String, String>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            cwd: None,
            interactive: true,
            file_prefix: FilePrefixPolicy::Lenient,
            defaults: BTreeMap::new(),
        }
    }
}

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The command table is inconsistent.
    #[error("invalid command table: {0}")]
    Build(#[from] BuildError),

    /// The command line does not name a command.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An argument failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A generic update failed.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// The handler returned an error.
    #[error(transparent)]
    Handler(anyhow::Error),
}

/// Machine-readable classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DuplicateCommand,
    InvalidCommandTable,
    UnknownCommand,
    IncompleteCommand,
    MissingRequiredArgument,
    InvalidArgumentValue,
    ArgumentCannotBeBlank,
    ConfirmationMismatch,
    UnrecognizedArgument,
    PromptFailed,
    ResourceNotFound,
    FetchFailed,
    PatchRejected,
    PersistFailed,
    Handler,
}

impl ErrorKind {
    /// Process exit code for this kind.
    ///
    /// | code | kinds |
    /// |------|-------|
    /// | 1 | handler errors |
    /// | 2 | dispatch and validation errors |
    /// | 3 | resource not found |
    /// | 4 | other update failures |
    /// | 5 | command table errors |
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Handler => 1,
            ErrorKind::UnknownCommand
            | ErrorKind::IncompleteCommand
            | ErrorKind::MissingRequiredArgument
            | ErrorKind::InvalidArgumentValue
            | ErrorKind::ArgumentCannotBeBlank
            | ErrorKind::ConfirmationMismatch
            | ErrorKind::UnrecognizedArgument
            | ErrorKind::PromptFailed => 2,
            ErrorKind::ResourceNotFound => 3,
            ErrorKind::FetchFailed | ErrorKind::PatchRejected | ErrorKind::PersistFailed => 4,
            ErrorKind::DuplicateCommand | ErrorKind::InvalidCommandTable => 5,
        }
    }
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ResourceNotFound => ErrorKind::ResourceNotFound,
            FailureKind::FetchFailed => ErrorKind::FetchFailed,
            FailureKind::PatchRejected => ErrorKind::PatchRejected,
            FailureKind::PersistFailed => ErrorKind::PersistFailed,
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Build(BuildError::DuplicateCommand(_)) => ErrorKind::DuplicateCommand,
            EngineError::Build(_) => ErrorKind::InvalidCommandTable,
            EngineError::Dispatch(DispatchError::UnknownCommand { .. }) => ErrorKind::UnknownCommand,
            EngineError::Dispatch(DispatchError::IncompleteCommand { .. }) => {
                ErrorKind::IncompleteCommand
            }
            EngineError::Validation(err) => match err {
                ValidationError::MissingRequiredArgument { .. } => {
                    ErrorKind::MissingRequiredArgument
                }
                ValidationError::InvalidArgumentValue { .. } => ErrorKind::InvalidArgumentValue,
                ValidationError::ArgumentCannotBeBlank { .. } => ErrorKind::ArgumentCannotBeBlank,
                ValidationError::ConfirmationMismatch { .. } => ErrorKind::ConfirmationMismatch,
                ValidationError::UnrecognizedArgument { .. } => ErrorKind::UnrecognizedArgument,
                ValidationError::PromptFailed { .. } => ErrorKind::PromptFailed,
            },
            EngineError::Update(err) => err.kind().into(),
            // Update commands run the protocol inside their handler.
            EngineError::Handler(err) => match err.downcast_ref::<UpdateError>() {
                Some(update) => update.kind().into(),
                None => ErrorKind::Handler,
            },
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        let not_found = EngineError::Handler(anyhow::Error::new(UpdateError::ResourceNotFound(
            "vm1".into(),
        )));
        assert_eq!(not_found.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(not_found.exit_code(), 3);

        let rejected = EngineError::Update(UpdateError::PatchRejected {
            argument: "set".into(),
            source: anyhow::anyhow!("bad"),
        });
        assert_eq!(rejected.exit_code(), 4);

        let missing = EngineError::from(ValidationError::MissingRequiredArgument {
            argument: "--name".into(),
        });
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(missing.exit_code(), 2);

        let duplicate = EngineError::from(BuildError::DuplicateCommand("vm create".into()));
        assert_eq!(duplicate.exit_code(), 5);

        let handler = EngineError::Handler(anyhow::anyhow!("quota exceeded"));
        assert_eq!(handler.exit_code(), 1);
    }

    #[test]
    fn transparent_messages() {
        let err = EngineError::from(DispatchError::IncompleteCommand {
            path: "vm".into(),
            children: vec!["create".into(), "delete".into()],
        });
        assert_eq!(
            err.to_string(),
            "'vm' is a command group; choose one of: create, delete"
        );
    }
}
