//! engine::registry
//!
//! The frozen command table.
//!
//! A [`Registry`] is assembled once at startup through [`RegistryBuilder`]
//! and then only read. It is passed by reference to the dispatcher; there is
//! no process-wide instance.
//!
//! # Example
//!
//! ```
//! use verbwork::core::command::{handler, CommandDescriptor};
//! use verbwork::engine::registry::Registry;
//!
//! let registry = Registry::builder()
//!     .register(
//!         CommandDescriptor::builder("vm list", handler(|_| Ok(serde_json::json!([]))))
//!             .build()
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.command("VM list").is_some());
//! assert_eq!(registry.len(), 1);
//! ```

use std::sync::Arc;

use super::resolve::{self, DispatchError, Resolution};
use super::tree::{self, BuildError, CommandTreeNode};
use crate::core::command::CommandDescriptor;
use crate::core::types::CommandPath;

/// Collects registrations before the tree is built.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Arc<CommandDescriptor>)>,
}

impl RegistryBuilder {
    /// Register a descriptor under its own path.
    pub fn register(mut self, descriptor: CommandDescriptor) -> Self {
        let key = descriptor.path().as_str();
        self.entries.push((key, Arc::new(descriptor)));
        self
    }

    /// Register under an explicit table key. The key must name the same
    /// path as the descriptor; this is checked by [`Self::build`].
    pub fn register_as(mut self, key: &str, descriptor: Arc<CommandDescriptor>) -> Self {
        self.entries.push((key.to_string(), descriptor));
        self
    }

    /// Register every descriptor from a command table.
    pub fn extend(mut self, descriptors: impl IntoIterator<Item = CommandDescriptor>) -> Self {
        for descriptor in descriptors {
            self = self.register(descriptor);
        }
        self
    }

    /// Build the command tree and freeze the registry.
    pub fn build(self) -> Result<Registry, BuildError> {
        let root = tree::build(
            self.entries
                .iter()
                .map(|(key, descriptor)| (key.as_str(), descriptor.clone())),
        )?;
        Ok(Registry { root })
    }
}

/// An immutable command table.
#[derive(Debug, Clone)]
pub struct Registry {
    root: CommandTreeNode,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn root(&self) -> &CommandTreeNode {
        &self.root
    }

    /// Resolve argv to a command.
    pub fn resolve<'a>(&self, argv: &'a [String]) -> Result<Resolution<'a>, DispatchError> {
        resolve::resolve(&self.root, argv)
    }

    /// Look up a command by its exact path (case-insensitive).
    pub fn command(&self, path: &str) -> Option<&Arc<CommandDescriptor>> {
        let path = CommandPath::parse(path).ok()?;
        self.root.find(&path)?.descriptor()
    }

    /// Every registered command in sorted path order.
    pub fn commands(&self) -> Vec<&Arc<CommandDescriptor>> {
        self.root.descriptors()
    }

    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.root.has_children()
    }
}
