//! engine::resolve
//!
//! Token resolution: split argv into a command path and the flag tail.
//!
//! # Algorithm
//!
//! Greedy longest-prefix walk from the root. A token is consumed as a path
//! segment only while it is not flag-shaped and the current node has a
//! matching child (case-insensitive). The node the walk stops on decides
//! the outcome:
//!
//! - node has a descriptor: resolved, every remaining token goes to the
//!   materializer
//! - stopped on an unmatched positional token: `UnknownCommand`, with
//!   near-miss siblings as suggestions
//! - node has children: `IncompleteCommand`
//! - otherwise: `UnknownCommand`

use std::sync::Arc;

use strsim::levenshtein;
use thiserror::Error;
use tracing::debug;

use super::tree::CommandTreeNode;
use crate::core::command::CommandDescriptor;
use crate::core::types::looks_like_flag;

/// Errors from dispatch resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{}", unknown_message(.token, .path, .suggestions))]
    UnknownCommand {
        /// The token that did not match, if any.
        token: Option<String>,
        /// Registered spelling of the path consumed so far.
        path: String,
        /// Valid next segments sharing a prefix with `token`.
        suggestions: Vec<String>,
    },

    #[error("'{}' is a command group; choose one of: {}", display_path(.path), .children.join(", "))]
    IncompleteCommand {
        path: String,
        /// Valid next segments, as registered.
        children: Vec<String>,
    },
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

fn unknown_message(token: &Option<String>, path: &str, suggestions: &[String]) -> String {
    let mut msg = match token {
        Some(token) if path.is_empty() => format!("'{token}' is not a command"),
        Some(token) => format!("'{token}' is not a command under '{path}'"),
        None => format!("'{}' is not a command", display_path(path)),
    };
    if !suggestions.is_empty() {
        msg.push_str(&format!("; did you mean: {}", suggestions.join(", ")));
    }
    msg
}

/// A resolved command and the tokens left for the materializer.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub descriptor: Arc<CommandDescriptor>,
    pub remaining: &'a [String],
}

/// How far a walk got, before deciding the outcome.
#[derive(Debug)]
pub struct Walk<'t, 'a> {
    /// The node the walk stopped on.
    pub node: &'t CommandTreeNode,
    /// Registered spellings of the consumed segments.
    pub consumed: Vec<String>,
    /// Tokens after the consumed path.
    pub remaining: &'a [String],
}

impl Walk<'_, '_> {
    pub fn path(&self) -> String {
        self.consumed.join(" ")
    }
}

/// Walk as far down the tree as `argv` allows.
pub fn walk<'t, 'a>(root: &'t CommandTreeNode, argv: &'a [String]) -> Walk<'t, 'a> {
    let mut node = root;
    let mut consumed = Vec::new();
    let mut i = 0;

    while let Some(token) = argv.get(i) {
        if looks_like_flag(token) {
            break;
        }
        let Some(child) = node.child(token) else {
            break;
        };
        consumed.push(child.segment().to_string());
        node = child;
        i += 1;
    }

    Walk {
        node,
        consumed,
        remaining: &argv[i..],
    }
}

/// Resolve `argv` to a command descriptor.
///
/// # Errors
///
/// Returns `DispatchError` when the tokens do not end on a command.
pub fn resolve<'a>(
    root: &CommandTreeNode,
    argv: &'a [String],
) -> Result<Resolution<'a>, DispatchError> {
    let walk = walk(root, argv);
    let outcome = decide(&walk);
    match &outcome {
        Ok(resolution) => debug!(
            command = %resolution.descriptor.path(),
            remaining = resolution.remaining.len(),
            "resolved command"
        ),
        Err(err) => debug!(error = %err, "resolution failed"),
    }
    outcome
}

fn decide<'a>(walk: &Walk<'_, 'a>) -> Result<Resolution<'a>, DispatchError> {
    let node = walk.node;

    // Tokens after a command belong to its argument parser.
    if let Some(descriptor) = node.descriptor() {
        return Ok(Resolution {
            descriptor: descriptor.clone(),
            remaining: walk.remaining,
        });
    }

    if let Some(token) = walk.remaining.first() {
        if !looks_like_flag(token) {
            return Err(DispatchError::UnknownCommand {
                token: Some(token.clone()),
                path: walk.path(),
                suggestions: suggestions(node, token),
            });
        }
    }

    if node.has_children() {
        return Err(DispatchError::IncompleteCommand {
            path: walk.path(),
            children: node.child_segments(),
        });
    }

    Err(DispatchError::UnknownCommand {
        token: None,
        path: walk.path(),
        suggestions: Vec::new(),
    })
}

/// Largest edit distance still treated as a typo.
const MAX_TYPO_DISTANCE: usize = 2;

/// Children of `node` that `token` plausibly misspells.
///
/// A child is suggested when it is within [`MAX_TYPO_DISTANCE`] edits of
/// the token (and the token is longer than that distance), when either
/// string starts with the other's first three characters, or when the
/// token starts with the whole child segment.
fn suggestions(node: &CommandTreeNode, token: &str) -> Vec<String> {
    let token = token.to_lowercase();
    let stem: String = token.chars().take(3).collect();
    let typo_budget = MAX_TYPO_DISTANCE.min(token.chars().count().saturating_sub(1));
    node.children()
        .map(CommandTreeNode::segment)
        .filter(|segment| {
            let lower = segment.to_lowercase();
            lower.starts_with(&stem)
                || token.starts_with(&lower)
                || levenshtein(&token, &lower) <= typo_budget
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::handler;
    use crate::engine::tree::build;

    fn cmd(path: &str) -> Arc<CommandDescriptor> {
        Arc::new(
            CommandDescriptor::builder(path, handler(|_| Ok(serde_json::Value::Null)))
                .build()
                .unwrap(),
        )
    }

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn tree() -> CommandTreeNode {
        build([
            ("vm", cmd("vm")),
            ("vm create", cmd("vm create")),
            ("vm delete", cmd("vm delete")),
            ("storage account create", cmd("storage account create")),
        ])
        .unwrap()
    }

    fn tree_without_vm_leaf() -> CommandTreeNode {
        build([
            ("vm create", cmd("vm create")),
            ("vm delete", cmd("vm delete")),
        ])
        .unwrap()
    }

    #[test]
    fn resolves_leaf_with_flags() {
        let root = tree();
        let tokens = argv(&["VM", "Create", "--name", "foo"]);
        let r = resolve(&root, &tokens).unwrap();
        assert_eq!(r.descriptor.path().as_str(), "vm create");
        assert_eq!(r.remaining, &tokens[2..]);
    }

    #[test]
    fn prefers_longest_match() {
        let root = tree();
        let tokens = argv(&["vm"]);
        let r = resolve(&root, &tokens).unwrap();
        assert_eq!(r.descriptor.path().as_str(), "vm");
        let tokens = argv(&["vm", "delete"]);
        let r = resolve(&root, &tokens).unwrap();
        assert_eq!(r.descriptor.path().as_str(), "vm delete");
    }

    #[test]
    fn group_path_is_incomplete() {
        let root = tree();
        let tokens = argv(&["storage", "--debug"]);
        let err = resolve(&root, &tokens).unwrap_err();
        assert_eq!(
            err,
            DispatchError::IncompleteCommand {
                path: "storage".into(),
                children: vec!["account".into()]
            }
        );
    }

    #[test]
    fn empty_argv_is_incomplete_at_root() {
        let err = resolve(&tree(), &[]).unwrap_err();
        match err {
            DispatchError::IncompleteCommand { path, children } => {
                assert!(path.is_empty());
                assert_eq!(children, vec!["storage".to_string(), "vm".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn unknown_token_with_suggestions() {
        let root = tree();
        let tokens = argv(&["storage", "acount", "create"]);
        let err = resolve(&root, &tokens).unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnknownCommand {
                token: Some("acount".into()),
                path: "storage".into(),
                suggestions: vec!["account".into()],
            }
        );

        let tokens = argv(&["vm", "creat"]);
        let err = resolve(&tree_without_vm_leaf(), &tokens).unwrap_err();
        assert!(err.to_string().contains("did you mean: create"));
    }

    #[test]
    fn one_letter_typo_is_suggested() {
        let root = tree_without_vm_leaf();
        let tokens = argv(&["vm", "crate", "--name", "x"]);
        match resolve(&root, &tokens).unwrap_err() {
            DispatchError::UnknownCommand { suggestions, .. } => {
                assert_eq!(suggestions, vec!["create".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }

        let tokens = argv(&["vm", "zzz"]);
        match resolve(&root, &tokens).unwrap_err() {
            DispatchError::UnknownCommand { suggestions, .. } => assert!(suggestions.is_empty()),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn positional_after_leaf_goes_to_the_leaf() {
        let root = tree();
        let tokens = argv(&["vm", "create", "foo"]);
        let r = resolve(&root, &tokens).unwrap();
        assert_eq!(r.descriptor.path().as_str(), "vm create");
        assert_eq!(r.remaining, &tokens[2..]);

        let tokens = argv(&["vm", "crate", "--name", "x"]);
        let r = resolve(&root, &tokens).unwrap();
        assert_eq!(r.descriptor.path().as_str(), "vm");
        assert_eq!(r.remaining, &tokens[1..]);
    }

    #[test]
    fn walk_reports_registered_spelling() {
        let root = tree();
        let tokens = argv(&["STORAGE", "Account"]);
        let w = walk(&root, &tokens);
        assert_eq!(w.path(), "storage account");
        assert!(w.remaining.is_empty());
    }
}
