//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Results go to stdout as pretty-printed JSON; diagnostics go to stderr.
//! Rendering functions return strings so they can be tested without
//! capturing the terminal. Quiet mode suppresses everything except errors.

use std::fmt::Display;

use crate::core::argument::{ArgumentDescriptor, ValueKind};
use crate::core::command::CommandDescriptor;
use crate::engine::dispatch::HelpTopic;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags. Quiet wins over debug.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Render handler results.
///
/// A single invocation prints its value; iterated invocations print an
/// array. `null` results print nothing.
pub fn render_results(results: &[serde_json::Value]) -> Option<String> {
    let value = match results {
        [] => return None,
        [single] => single.clone(),
        many => serde_json::Value::Array(many.to_vec()),
    };
    if value.is_null() {
        return None;
    }
    Some(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
}

/// Render help for a group or a command.
pub fn render_help(program: &str, topic: &HelpTopic) -> String {
    match topic {
        HelpTopic::Group { path, children } => render_group(program, path, children),
        HelpTopic::Command(cmd) => render_usage(program, cmd),
    }
}

fn render_group(program: &str, path: &str, children: &[(String, Option<String>)]) -> String {
    let full = [program, path]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let width = children.iter().map(|(seg, _)| seg.len()).max().unwrap_or(0);
    let lines: Vec<String> = children
        .iter()
        .map(|(segment, summary)| match summary {
            Some(summary) => format!("{segment:<width$}  {summary}"),
            None => segment.clone(),
        })
        .collect();

    format!(
        "Usage: {full} <command>\n\nCommands:\n{}",
        format_list(&lines, "  ")
    )
}

/// Render a command's usage, one section per argument group.
pub fn render_usage(program: &str, cmd: &CommandDescriptor) -> String {
    let mut out = format!("Usage: {program} {}", cmd.path());
    for arg in cmd.arguments().iter().filter(|a| a.is_required()) {
        out.push_str(&format!(" {} {}", arg.canonical(), metavar(arg)));
    }
    if cmd.arguments().iter().any(|a| !a.is_required()) {
        out.push_str(" [options]");
    }
    out.push('\n');

    if let Some(help) = cmd.long_help().or(cmd.summary()) {
        out.push('\n');
        out.push_str(help);
        out.push('\n');
    }

    for (group, members) in cmd.display_groups() {
        if members.is_empty() {
            continue;
        }
        let rows: Vec<(String, String)> = members.iter().map(|a| argument_row(a)).collect();
        let width = rows.iter().map(|(flags, _)| flags.len()).max().unwrap_or(0);
        out.push_str(&format!("\n{group}:\n"));
        for (flags, detail) in rows {
            if detail.is_empty() {
                out.push_str(&format!("  {flags}\n"));
            } else {
                out.push_str(&format!("  {flags:<width$}  {detail}\n"));
            }
        }
    }
    out
}

fn metavar(arg: &ArgumentDescriptor) -> String {
    match (arg.kind().scalar(), arg.choices()) {
        (ValueKind::Enum, Some(choices)) => {
            let choices = format!("{{{}}}", choices.join(","));
            if arg.kind().is_list() {
                format!("{choices} [...]")
            } else {
                choices
            }
        }
        _ => arg.kind().label(),
    }
}

fn argument_row(arg: &ArgumentDescriptor) -> (String, String) {
    let names = arg
        .names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let flags = if *arg.kind() == ValueKind::Bool {
        names
    } else {
        format!("{names} {}", metavar(arg))
    };

    let mut detail = Vec::new();
    if let Some(help) = arg.help() {
        detail.push(help.to_string());
    }
    if arg.is_required() {
        detail.push("[required]".to_string());
    }
    if let Some(default) = arg.default() {
        detail.push(format!("[default: {default}]"));
    }
    if let Some(key) = arg.configured_default() {
        detail.push(format!("[config: defaults.{key}]"));
    }
    (flags, detail.join(" "))
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}
