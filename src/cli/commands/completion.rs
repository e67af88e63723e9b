//! completion command - shell completion scripts and word completion
//!
//! `vw completion <shell>` prints a script generated from a clap command
//! that mirrors the registry. `vw completion --words <tokens...>` prints
//! candidates for the last token, one per line, using argument choices
//! and completers.

use std::io::Write;

use anyhow::{bail, Context as _, Result};
use clap::{Arg, ArgAction, CommandFactory};
use clap_complete::{generate, Shell};

use super::COMPLETION;
use crate::cli::args::Cli;
use crate::core::argument::{ArgumentDescriptor, ValueKind};
use crate::engine::registry::Registry;
use crate::engine::resolve::walk;
use crate::engine::tree::CommandTreeNode;

const WORDS_FLAG: &str = "--words";

/// Handle `completion ...` (the tokens after the `completion` word).
pub fn completion(registry: &Registry, tokens: &[String], out: &mut dyn Write) -> Result<()> {
    match tokens {
        [flag, words @ ..] if flag == WORDS_FLAG => {
            for candidate in complete_words(registry, words) {
                writeln!(out, "{candidate}")?;
            }
            Ok(())
        }
        [shell] => {
            let shell: Shell = shell
                .parse()
                .map_err(|e| anyhow::anyhow!("unsupported shell '{shell}': {e}"))?;
            let mut cmd = completion_command(registry);
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, out);
            out.flush().context("cannot write completion script")?;
            Ok(())
        }
        _ => bail!("usage: vw completion <bash|zsh|fish|powershell|elvish> | --words <tokens...>"),
    }
}

/// A clap command with the global flags and one subcommand per tree node.
pub fn completion_command(registry: &Registry) -> clap::Command {
    let globals = Cli::command();
    let mut root = clap::Command::new("vw");
    for arg in globals.get_arguments().filter(|a| a.get_id() != "tokens") {
        root = root.arg(arg.clone());
    }
    root = node_commands(root, registry.root());
    root.subcommand(
        clap::Command::new(COMPLETION)
            .about("Print a shell completion script")
            .arg(
                Arg::new("shell")
                    .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                    .required(true),
            ),
    )
}

fn node_commands(mut cmd: clap::Command, node: &CommandTreeNode) -> clap::Command {
    if let Some(descriptor) = node.descriptor() {
        if let Some(summary) = descriptor.summary() {
            cmd = cmd.about(summary.to_string());
        }
        for argument in descriptor.arguments() {
            cmd = cmd.arg(clap_arg(argument));
        }
    }
    for child in node.children() {
        let sub = clap::Command::new(child.segment().to_string());
        cmd = cmd.subcommand(node_commands(sub, child));
    }
    cmd
}

fn clap_arg(argument: &ArgumentDescriptor) -> Arg {
    let mut arg = Arg::new(argument.dest().to_string());
    for name in argument.names() {
        let bare = name.bare().to_string();
        match (name.is_long(), bare.chars().next(), arg.get_long().is_some()) {
            (true, _, false) => arg = arg.long(bare),
            (true, _, true) => arg = arg.visible_alias(bare),
            (false, Some(short), _) if bare.len() == 1 => arg = arg.short(short),
            _ => {}
        }
    }
    if let Some(help) = argument.help() {
        arg = arg.help(help.to_string());
    }
    arg = match argument.kind() {
        ValueKind::Bool => arg.action(ArgAction::SetTrue),
        kind if kind.is_list() => arg.num_args(1..).action(ArgAction::Append),
        _ => arg.num_args(1),
    };
    if let Some(choices) = argument.choices() {
        arg = arg.value_parser(clap::builder::PossibleValuesParser::new(choices.to_vec()));
    }
    arg
}

/// Candidates for the last of `words` (the word being completed, possibly
/// empty).
///
/// - Inside a group: matching child segments
/// - After a flag that takes values: the argument's choices or completer
/// - Otherwise at a command: matching flag spellings
pub fn complete_words(registry: &Registry, words: &[String]) -> Vec<String> {
    let (partial, before) = match words.split_last() {
        Some((last, before)) => (last.as_str(), before),
        None => ("", words),
    };

    let walked = walk(registry.root(), before);
    let node = walked.node;

    let Some(descriptor) = node.descriptor() else {
        if !walked.remaining.is_empty() {
            return Vec::new();
        }
        return node
            .child_segments()
            .into_iter()
            .filter(|s| s.starts_with(&partial.to_lowercase()))
            .collect();
    };

    if walked.remaining.is_empty() && node.has_children() && !partial.starts_with('-') {
        return node
            .child_segments()
            .into_iter()
            .filter(|s| s.starts_with(&partial.to_lowercase()))
            .collect();
    }

    let open = walked
        .remaining
        .iter()
        .rev()
        .find(|t| t.starts_with('-'))
        .and_then(|flag| descriptor.argument_for_flag(flag))
        .filter(|arg| *arg.kind() != ValueKind::Bool);
    if let Some(arg) = open {
        if !partial.starts_with('-') {
            return arg.candidates(partial);
        }
    }

    descriptor
        .arguments()
        .iter()
        .flat_map(|arg| arg.names())
        .map(ToString::to_string)
        .filter(|flag| flag.starts_with('-') && flag.starts_with(partial))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{registry, ConfigTargets};
    use crate::store::{FileResourceStore, ResourceStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Arc<dyn ResourceStore>, Registry) {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn ResourceStore> =
            Arc::new(FileResourceStore::with_path(temp.path().join("resources.json")));
        let registry = registry(store.clone(), ConfigTargets::default()).unwrap();
        (temp, store, registry)
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clap_command_mirrors_tree() {
        let (_temp, _store, registry) = fixture();
        let cmd = completion_command(&registry);
        cmd.clone().debug_assert();

        let vm = cmd.find_subcommand("vm").unwrap();
        let create = vm.find_subcommand("create").unwrap();
        assert!(create.get_arguments().any(|a| a.get_long() == Some("admin-password")));
        assert!(cmd.find_subcommand("storage").unwrap().find_subcommand("account").is_some());
        assert!(cmd.get_arguments().any(|a| a.get_long() == Some("no-interactive")));
    }

    #[test]
    fn bash_script_names_commands() {
        let (_temp, _store, registry) = fixture();
        let mut out = Vec::new();
        completion(&registry, &words(&["bash"]), &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("vw"));
        assert!(script.contains("create"));
    }

    #[test]
    fn unknown_shell_fails() {
        let (_temp, _store, registry) = fixture();
        assert!(completion(&registry, &words(&["tcsh"]), &mut Vec::new()).is_err());
    }

    #[test]
    fn words_complete_segments_flags_and_values() {
        let (_temp, store, registry) = fixture();
        store.put("vm", "web1", serde_json::json!({})).unwrap();

        assert_eq!(complete_words(&registry, &words(&["v"])), vec!["vm"]);
        assert_eq!(complete_words(&registry, &words(&["vm", "s"])), vec!["show", "start"]);
        assert_eq!(
            complete_words(&registry, &words(&["vm", "show", "--n"])),
            vec!["--name"]
        );
        assert_eq!(
            complete_words(&registry, &words(&["vm", "show", "--name", "w"])),
            vec!["web1"]
        );
        assert_eq!(
            complete_words(&registry, &words(&["vm", "create", "--size", "Standard_D"])),
            vec!["Standard_D2s_v3", "Standard_D4s_v3"]
        );
        assert!(complete_words(&registry, &words(&["nope", ""])).is_empty());
    }
}
