//! cli::commands
//!
//! The bundled command table.
//!
//! # Architecture
//!
//! Each command module contributes descriptors whose handlers:
//! 1. Read their typed arguments from the materialized set
//! 2. Talk to the [`ResourceStore`]
//! 3. Return the resulting resource as JSON for the CLI to print
//!
//! Handlers never print. `completion` is not a registered command because
//! it needs the finished registry.

mod completion;
mod configure;
mod storage;
mod vm;

pub use completion::{complete_words, completion, completion_command};
pub use configure::ConfigTargets;

use std::sync::Arc;

use anyhow::Context as _;

use crate::core::command::CommandDescriptor;
use crate::engine::registry::Registry;
use crate::engine::update::UpdateError;
use crate::store::ResourceStore;

/// Reserved first token for completion output.
pub const COMPLETION: &str = "completion";

/// All bundled command descriptors.
pub fn command_table(
    store: Arc<dyn ResourceStore>,
    config: ConfigTargets,
) -> anyhow::Result<Vec<CommandDescriptor>> {
    let mut table = vm::commands(store.clone()).context("invalid vm command table")?;
    table.extend(storage::commands(store).context("invalid storage command table")?);
    table.extend(configure::commands(config).context("invalid configure command")?);
    Ok(table)
}

/// Build the registry over `store`.
pub fn registry(store: Arc<dyn ResourceStore>, config: ConfigTargets) -> anyhow::Result<Registry> {
    let registry = Registry::builder()
        .extend(command_table(store, config)?)
        .build()?;
    Ok(registry)
}

/// Error for a resource that does not exist. Maps to the not-found exit code.
pub(crate) fn not_found(kind: &str, name: &str) -> anyhow::Error {
    UpdateError::ResourceNotFound(format!("{kind}/{name}")).into()
}

/// Name argument shared by every command. Required arguments are always
/// present after materialization.
pub(crate) fn name_of(args: &crate::core::args::MaterializedArgumentSet) -> anyhow::Result<String> {
    args.str("name")?
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("--name is required"))
}
