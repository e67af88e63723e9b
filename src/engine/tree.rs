//! engine::tree
//!
//! The command tree and its builder.
//!
//! # Structure
//!
//! Each node is keyed by the lowercase form of its segment so lookups during
//! resolution are case-insensitive, while the node itself keeps the segment
//! as registered for messages. Intermediate group nodes are created on
//! demand and carry no descriptor.
//!
//! # Conflict Policy
//!
//! "Has a descriptor" and "has children" are independent: `vm` may be both a
//! command and the group containing `vm create`. The resolver prefers the
//! longest match, so `vm create` wins over `vm` when both apply.
//!
//! Two registrations that only differ in case under the same parent are
//! rejected at build time. Registering the same path twice is rejected
//! unless both registrations share the same handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::core::command::CommandDescriptor;
use crate::core::types::{CommandPath, TypeError};

/// Errors from tree construction. All of them abort startup.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot register '{key}': {source}")]
    InvalidPath {
        key: String,
        #[source]
        source: TypeError,
    },

    #[error("registration key '{key}' does not match descriptor path '{path}'")]
    PathMismatch { key: String, path: String },

    #[error("command '{0}' is registered twice with different handlers")]
    DuplicateCommand(String),

    #[error("segment '{new}' collides with existing segment '{existing}' under '{parent}'")]
    SegmentCollision {
        existing: String,
        new: String,
        parent: String,
    },
}

/// One node of the command tree.
#[derive(Debug, Clone)]
pub struct CommandTreeNode {
    segment: String,
    children: BTreeMap<String, CommandTreeNode>,
    descriptor: Option<Arc<CommandDescriptor>>,
}

impl CommandTreeNode {
    /// An empty root node.
    pub fn root() -> Self {
        Self::group("")
    }

    fn group(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            children: BTreeMap::new(),
            descriptor: None,
        }
    }

    /// The segment as registered (empty for the root).
    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn descriptor(&self) -> Option<&Arc<CommandDescriptor>> {
        self.descriptor.as_ref()
    }

    /// Whether this node is bound to a command.
    pub fn is_leaf(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Case-insensitive child lookup.
    pub fn child(&self, segment: &str) -> Option<&CommandTreeNode> {
        self.children.get(&segment.to_lowercase())
    }

    /// Children in sorted order.
    pub fn children(&self) -> impl Iterator<Item = &CommandTreeNode> {
        self.children.values()
    }

    /// Registered spellings of the children, sorted.
    pub fn child_segments(&self) -> Vec<String> {
        self.children.values().map(|c| c.segment.clone()).collect()
    }

    /// Walk from this node along `path`, case-insensitively.
    pub fn find(&self, path: &CommandPath) -> Option<&CommandTreeNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Every descriptor in the subtree, in sorted path order.
    pub fn descriptors(&self) -> Vec<&Arc<CommandDescriptor>> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Arc<CommandDescriptor>>) {
        if let Some(descriptor) = &self.descriptor {
            out.push(descriptor);
        }
        for child in self.children.values() {
            child.collect(out);
        }
    }

    /// Number of nodes in the subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.values().map(Self::node_count).sum::<usize>()
    }

    fn insert(&mut self, descriptor: Arc<CommandDescriptor>) -> Result<(), BuildError> {
        let path = descriptor.path().clone();
        let mut node = self;
        let mut parent = String::new();

        for segment in path.segments() {
            let key = segment.to_lowercase();
            if let Some(existing) = node.children.get(&key) {
                if existing.segment != *segment {
                    return Err(BuildError::SegmentCollision {
                        existing: existing.segment.clone(),
                        new: segment.clone(),
                        parent: display_parent(&parent),
                    });
                }
            }
            node = node
                .children
                .entry(key)
                .or_insert_with(|| CommandTreeNode::group(segment));
            if !parent.is_empty() {
                parent.push(' ');
            }
            parent.push_str(segment);
        }

        match &node.descriptor {
            Some(existing) if existing.same_handler(&descriptor) => {
                debug!(path = %path, "ignoring repeated registration with the same handler");
                Ok(())
            }
            Some(_) => Err(BuildError::DuplicateCommand(path.as_str())),
            None => {
                node.descriptor = Some(descriptor);
                Ok(())
            }
        }
    }
}

fn display_parent(parent: &str) -> String {
    if parent.is_empty() {
        "<root>".to_string()
    } else {
        parent.to_string()
    }
}

/// Structural equality: same segments, same shape, same descriptor objects.
impl PartialEq for CommandTreeNode {
    fn eq(&self, other: &Self) -> bool {
        let same_descriptor = match (&self.descriptor, &other.descriptor) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_descriptor && self.segment == other.segment && self.children == other.children
    }
}

/// Build the command tree from a flat `path -> descriptor` table.
///
/// Each key is split on whitespace and must name the same path as the
/// descriptor it maps to.
///
/// # Errors
///
/// See [`BuildError`].
pub fn build<'a, I>(flat: I) -> Result<CommandTreeNode, BuildError>
where
    I: IntoIterator<Item = (&'a str, Arc<CommandDescriptor>)>,
{
    let mut root = CommandTreeNode::root();
    let mut count = 0usize;

    for (key, descriptor) in flat {
        let path = CommandPath::parse(key).map_err(|source| BuildError::InvalidPath {
            key: key.to_string(),
            source,
        })?;
        if path != *descriptor.path() {
            return Err(BuildError::PathMismatch {
                key: path.as_str(),
                path: descriptor.path().as_str(),
            });
        }
        root.insert(descriptor)?;
        count += 1;
    }

    debug!(commands = count, nodes = root.node_count(), "command tree built");
    Ok(root)
}
