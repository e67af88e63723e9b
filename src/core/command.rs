//! core::command
//!
//! Command descriptors: a handler plus the arguments it accepts.
//!
//! # Lifecycle
//!
//! Descriptors are constructed during command-table assembly, validated by
//! [`CommandBuilder::build`], and shared behind an `Arc` afterwards. Nothing
//! mutates a descriptor once it is registered.
//!
//! # Example
//!
//! ```
//! use verbwork::core::argument::{ArgumentDescriptor, Value};
//! use verbwork::core::command::{handler, CommandDescriptor};
//!
//! let create = CommandDescriptor::builder("vm create", handler(|args| {
//!     Ok(serde_json::json!({ "name": args.str("name")? }))
//! }))
//! .argument(ArgumentDescriptor::builder("--name").alias("-n").required().build().unwrap())
//! .argument(
//!     ArgumentDescriptor::builder("--size")
//!         .default_value(Value::from("Standard_D2"))
//!         .build()
//!         .unwrap(),
//! )
//! .summary("Create a virtual machine.")
//! .build()
//! .unwrap();
//!
//! assert_eq!(create.path().as_str(), "vm create");
//! assert_eq!(create.argument_for_flag("-n").unwrap().dest(), "name");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::args::MaterializedArgumentSet;
use super::argument::{ArgumentDescriptor, DescriptorError};
use super::types::CommandPath;

/// Business logic invoked with the materialized arguments.
///
/// Handlers return a JSON document for the caller to render; `Null` means
/// "nothing to print".
pub type Handler =
    Arc<dyn Fn(&MaterializedArgumentSet) -> anyhow::Result<serde_json::Value> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&MaterializedArgumentSet) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A named display group of arguments. Groups only affect help output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// A handler plus its declared arguments and help payload.
#[derive(Clone)]
pub struct CommandDescriptor {
    path: CommandPath,
    handler: Handler,
    arguments: Vec<ArgumentDescriptor>,
    by_dest: HashMap<String, usize>,
    by_flag: HashMap<String, usize>,
    groups: Vec<ArgumentGroup>,
    summary: Option<String>,
    long_help: Option<String>,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("path", &self.path)
            .field("arguments", &self.arguments)
            .field("groups", &self.groups)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    /// Start building a descriptor for `path`.
    pub fn builder(path: &str, handler: Handler) -> CommandBuilder {
        CommandBuilder {
            path: path.to_string(),
            handler,
            arguments: Vec::new(),
            groups: Vec::new(),
            summary: None,
            long_help: None,
        }
    }

    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// Declared arguments in declaration order.
    pub fn arguments(&self) -> &[ArgumentDescriptor] {
        &self.arguments
    }

    /// Look up an argument by destination key.
    pub fn argument(&self, dest: &str) -> Option<&ArgumentDescriptor> {
        self.by_dest.get(dest).map(|&i| &self.arguments[i])
    }

    /// Look up an argument by any of its surface spellings.
    pub fn argument_for_flag(&self, flag: &str) -> Option<&ArgumentDescriptor> {
        self.flag_index(flag).map(|i| &self.arguments[i])
    }

    pub(crate) fn flag_index(&self, flag: &str) -> Option<usize> {
        self.by_flag.get(flag).copied()
    }

    /// Destinations of arguments the dispatcher iterates over.
    pub fn iterated_arguments(&self) -> Vec<&str> {
        self.arguments
            .iter()
            .filter(|a| a.is_iterated())
            .map(ArgumentDescriptor::dest)
            .collect()
    }

    pub fn groups(&self) -> &[ArgumentGroup] {
        &self.groups
    }

    /// Arguments partitioned for display: declared groups in order, then
    /// the ungrouped remainder under `"Arguments"`.
    pub fn display_groups(&self) -> Vec<(String, Vec<&ArgumentDescriptor>)> {
        let mut out = Vec::new();
        let mut grouped = Vec::new();
        for group in &self.groups {
            let members: Vec<&ArgumentDescriptor> = group
                .members
                .iter()
                .filter_map(|dest| self.argument(dest))
                .collect();
            grouped.extend(group.members.iter().map(String::as_str));
            out.push((group.name.clone(), members));
        }
        let rest: Vec<&ArgumentDescriptor> = self
            .arguments
            .iter()
            .filter(|a| !grouped.contains(&a.dest()))
            .collect();
        if !rest.is_empty() {
            out.insert(0, ("Arguments".to_string(), rest));
        }
        out
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn long_help(&self) -> Option<&str> {
        self.long_help.as_deref()
    }

    /// A fresh argument set with exactly this command's keys, all absent.
    pub fn empty_argument_set(&self) -> MaterializedArgumentSet {
        MaterializedArgumentSet::with_keys(self.arguments.iter().map(|a| a.dest().to_string()))
    }

    /// Invoke the handler.
    pub fn invoke(&self, args: &MaterializedArgumentSet) -> anyhow::Result<serde_json::Value> {
        (self.handler)(args)
    }

    /// Whether two descriptors share the same handler function.
    pub fn same_handler(&self, other: &CommandDescriptor) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

/// Builder for [`CommandDescriptor`].
pub struct CommandBuilder {
    path: String,
    handler: Handler,
    arguments: Vec<ArgumentDescriptor>,
    groups: Vec<ArgumentGroup>,
    summary: Option<String>,
    long_help: Option<String>,
}

impl CommandBuilder {
    pub fn argument(mut self, argument: ArgumentDescriptor) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn arguments(mut self, arguments: impl IntoIterator<Item = ArgumentDescriptor>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Declare a display group containing the given destinations.
    pub fn group(mut self, name: &str, members: &[&str]) -> Self {
        self.groups.push(ArgumentGroup {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn long_help(mut self, help: &str) -> Self {
        self.long_help = Some(help.to_string());
        self
    }

    /// Validate and build the descriptor.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if the path is malformed
    /// - `DuplicateArgument` / `DuplicateFlag` if two arguments collide
    /// - `UnknownGroupMember` / `ConflictingGroups` for bad display groups
    pub fn build(self) -> Result<CommandDescriptor, DescriptorError> {
        let path = CommandPath::parse(&self.path)?;

        let mut by_dest = HashMap::new();
        let mut by_flag: HashMap<String, usize> = HashMap::new();
        for (i, arg) in self.arguments.iter().enumerate() {
            if by_dest.insert(arg.dest().to_string(), i).is_some() {
                return Err(DescriptorError::DuplicateArgument(arg.dest().to_string()));
            }
            for name in arg.names() {
                if let Some(&other) = by_flag.get(name.as_str()) {
                    return Err(DescriptorError::DuplicateFlag {
                        flag: name.to_string(),
                        first: self.arguments[other].dest().to_string(),
                        second: arg.dest().to_string(),
                    });
                }
                by_flag.insert(name.to_string(), i);
            }
        }

        let mut owner: HashMap<&str, &str> = HashMap::new();
        for group in &self.groups {
            for member in &group.members {
                if !by_dest.contains_key(member) {
                    return Err(DescriptorError::UnknownGroupMember {
                        group: group.name.clone(),
                        argument: member.clone(),
                    });
                }
                if let Some(first) = owner.insert(member, &group.name) {
                    return Err(DescriptorError::ConflictingGroups {
                        argument: member.clone(),
                        first: first.to_string(),
                        second: group.name.clone(),
                    });
                }
            }
        }

        Ok(CommandDescriptor {
            path,
            handler: self.handler,
            arguments: self.arguments,
            by_dest,
            by_flag,
            groups: self.groups,
            summary: self.summary,
            long_help: self.long_help,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        handler(|_| Ok(serde_json::Value::Null))
    }

    fn arg(flag: &str) -> ArgumentDescriptor {
        ArgumentDescriptor::builder(flag).build().unwrap()
    }

    #[test]
    fn duplicate_dest_rejected() {
        let err = CommandDescriptor::builder("vm create", noop())
            .argument(arg("--name"))
            .argument(
                ArgumentDescriptor::builder("--vm-name")
                    .dest("name")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateArgument(ref d) if d == "name"));
    }

    #[test]
    fn duplicate_flag_rejected() {
        let err = CommandDescriptor::builder("vm create", noop())
            .argument(ArgumentDescriptor::builder("--name").alias("-n").build().unwrap())
            .argument(ArgumentDescriptor::builder("--nic").alias("-n").build().unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateFlag { ref flag, .. } if flag == "-n"));
    }

    #[test]
    fn group_members_must_exist_once() {
        assert!(CommandDescriptor::builder("vm create", noop())
            .argument(arg("--name"))
            .group("Network", &["vnet"])
            .build()
            .is_err());

        assert!(CommandDescriptor::builder("vm create", noop())
            .argument(arg("--name"))
            .group("A", &["name"])
            .group("B", &["name"])
            .build()
            .is_err());
    }

    #[test]
    fn display_groups_put_ungrouped_first() {
        let cmd = CommandDescriptor::builder("vm create", noop())
            .argument(arg("--name"))
            .argument(arg("--vnet"))
            .argument(arg("--subnet"))
            .group("Network", &["vnet", "subnet"])
            .build()
            .unwrap();

        let groups = cmd.display_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Arguments");
        assert_eq!(groups[0].1[0].dest(), "name");
        assert_eq!(groups[1].0, "Network");
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn empty_set_has_declared_keys() {
        let cmd = CommandDescriptor::builder("vm show", noop())
            .argument(arg("--name"))
            .argument(arg("--resource-group"))
            .build()
            .unwrap();
        let set = cmd.empty_argument_set();
        assert_eq!(set.len(), 2);
        assert!(set.get("resource_group").is_ok());
    }

    #[test]
    fn same_handler_is_pointer_identity() {
        let h = noop();
        let a = CommandDescriptor::builder("a", h.clone()).build().unwrap();
        let b = CommandDescriptor::builder("a", h).build().unwrap();
        let c = CommandDescriptor::builder("a", noop()).build().unwrap();
        assert!(a.same_handler(&b));
        assert!(!a.same_handler(&c));
    }
}
