//! engine::update
//!
//! The generic update protocol: fetch a resource, patch it locally, persist
//! it, and return what the store returned.
//!
//! # State Machine
//!
//! ```text
//! Fetching -> Patching -> Persisting -> Done
//!     |           |            |
//!     +-----------+------------+--> Failed(kind)
//! ```
//!
//! Nothing is retried. A not-found fetch ends the update before any setter
//! or the persist callback runs.
//!
//! # Patching Order
//!
//! 1. The custom patch function, if any
//! 2. Setters for flags that appeared on the command line, in command-line
//!    order (group setters run once per occurrence)
//! 3. Setters for remaining present arguments (defaults), in key order
//!
//! Arguments without a registered setter are ignored.
//!
//! # Example
//!
//! ```
//! use verbwork::core::args::MaterializedArgumentSet;
//! use verbwork::core::argument::Value;
//! use verbwork::engine::update::{FetchError, GenericUpdate};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Vm { size: String }
//!
//! let controller = GenericUpdate::new().setter("size", |vm: &mut Vm, value, _| {
//!     vm.size = value.to_string();
//!     Ok(())
//! });
//!
//! let mut args = MaterializedArgumentSet::with_keys(["size"]);
//! args.set("size", Value::from("B2s")).unwrap();
//!
//! let updated = controller
//!     .update(
//!         || Ok::<_, FetchError>(Vm { size: "B1s".into() }),
//!         |vm| Ok(vm),
//!         &args,
//!     )
//!     .unwrap();
//! assert_eq!(updated.size, "B2s");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::properties::{add_properties, remove_property, set_property};
use crate::core::args::MaterializedArgumentSet;
use crate::core::argument::{ArgumentDescriptor, DescriptorError, Value, ValueKind};

/// Display group for the generic update arguments.
pub const GENERIC_UPDATE_GROUP: &str = "Generic Update";

/// Name used for the custom patch function in errors.
pub const CUSTOM_PATCH: &str = "custom patch";

/// Result of the fetch callback.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("resource '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a generic update.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("failed to fetch resource: {0}")]
    FetchFailed(#[source] anyhow::Error),

    #[error("cannot apply '{argument}': {source}")]
    PatchRejected {
        argument: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist resource: {0}")]
    PersistFailed(#[source] anyhow::Error),
}

impl UpdateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UpdateError::ResourceNotFound(_) => FailureKind::ResourceNotFound,
            UpdateError::FetchFailed(_) => FailureKind::FetchFailed,
            UpdateError::PatchRejected { .. } => FailureKind::PatchRejected,
            UpdateError::PersistFailed(_) => FailureKind::PersistFailed,
        }
    }
}

/// Why an update failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ResourceNotFound,
    FetchFailed,
    PatchRejected,
    PersistFailed,
}

/// States of the update state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Fetching,
    Patching,
    Persisting,
    Done,
    Failed(FailureKind),
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePhase::Fetching => write!(f, "fetching"),
            UpdatePhase::Patching => write!(f, "patching"),
            UpdatePhase::Persisting => write!(f, "persisting"),
            UpdatePhase::Done => write!(f, "done"),
            UpdatePhase::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// The phases an update went through, and its result.
#[derive(Debug)]
pub struct UpdateOutcome<R> {
    pub phases: Vec<UpdatePhase>,
    pub result: Result<R, UpdateError>,
}

/// Applies one argument value to a resource.
pub type Setter<R> =
    Box<dyn Fn(&mut R, &Value, &MaterializedArgumentSet) -> anyhow::Result<()> + Send + Sync>;

/// Patch applied before any per-argument setter.
pub type CustomPatch<R> =
    Box<dyn Fn(&mut R, &MaterializedArgumentSet) -> anyhow::Result<()> + Send + Sync>;

struct Registered<R> {
    apply: Setter<R>,
    per_group: bool,
}

/// Orchestrates get -> patch -> set for one resource type.
pub struct GenericUpdate<R> {
    setters: BTreeMap<String, Registered<R>>,
    custom_patch: Option<CustomPatch<R>>,
}

impl<R> Default for GenericUpdate<R> {
    fn default() -> Self {
        Self {
            setters: BTreeMap::new(),
            custom_patch: None,
        }
    }
}

impl<R> fmt::Debug for GenericUpdate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericUpdate")
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("custom_patch", &self.custom_patch.is_some())
            .finish()
    }
}

impl<R> GenericUpdate<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a setter for the argument with destination `name`.
    pub fn setter<F>(mut self, name: &str, apply: F) -> Self
    where
        F: Fn(&mut R, &Value, &MaterializedArgumentSet) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.setters.insert(
            name.to_string(),
            Registered {
                apply: Box::new(apply),
                per_group: false,
            },
        );
        self
    }

    /// Register a setter for an append argument, called once per occurrence
    /// with that occurrence's group of values.
    pub fn group_setter<F>(mut self, name: &str, apply: F) -> Self
    where
        F: Fn(&mut R, &Value, &MaterializedArgumentSet) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.setters.insert(
            name.to_string(),
            Registered {
                apply: Box::new(apply),
                per_group: true,
            },
        );
        self
    }

    /// Run `patch` on the fetched resource before the setters.
    pub fn custom_patch<F>(mut self, patch: F) -> Self
    where
        F: Fn(&mut R, &MaterializedArgumentSet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.custom_patch = Some(Box::new(patch));
        self
    }

    /// Apply the custom patch and setters to `resource` in place.
    pub fn patch(&self, resource: &mut R, args: &MaterializedArgumentSet) -> Result<(), UpdateError> {
        if let Some(patch) = &self.custom_patch {
            patch(resource, args).map_err(|source| UpdateError::PatchRejected {
                argument: CUSTOM_PATCH.to_string(),
                source,
            })?;
        }

        let mut applied = BTreeSet::new();
        let mut groups_seen: BTreeMap<&str, usize> = BTreeMap::new();

        for name in args.occurrences() {
            let Some(setter) = self.setters.get(name) else {
                continue;
            };
            let Ok(value) = args.get(name) else {
                continue;
            };
            if setter.per_group {
                let seen = groups_seen.entry(name.as_str()).or_insert(0);
                if let Some(group) = value.as_list().and_then(|groups| groups.get(*seen)) {
                    apply(setter, name, resource, group, args)?;
                }
                *seen += 1;
            } else if !applied.contains(name.as_str()) {
                apply(setter, name, resource, value, args)?;
            }
            applied.insert(name.as_str());
        }

        for (name, value) in args.iter() {
            if value.is_absent() || applied.contains(name) {
                continue;
            }
            let Some(setter) = self.setters.get(name) else {
                debug!(argument = name, "no setter registered, ignoring");
                continue;
            };
            match (setter.per_group, value) {
                (true, Value::List(groups)) => {
                    for group in groups {
                        apply(setter, name, resource, group, args)?;
                    }
                }
                _ => apply(setter, name, resource, value, args)?,
            }
        }

        Ok(())
    }

    /// Run the full protocol, recording each phase.
    pub fn run<G, S>(&self, get: G, set: S, args: &MaterializedArgumentSet) -> UpdateOutcome<R>
    where
        G: FnOnce() -> Result<R, FetchError>,
        S: FnOnce(R) -> anyhow::Result<R>,
    {
        let mut phases = Vec::new();
        let result = self.drive(get, set, args, &mut phases);
        UpdateOutcome { phases, result }
    }

    /// Run the full protocol and return the persisted resource.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` / `FetchFailed` if `get` fails (patch and set
    ///   are not called)
    /// - `PatchRejected` naming the argument whose setter failed
    /// - `PersistFailed` if `set` fails
    pub fn update<G, S>(&self, get: G, set: S, args: &MaterializedArgumentSet) -> Result<R, UpdateError>
    where
        G: FnOnce() -> Result<R, FetchError>,
        S: FnOnce(R) -> anyhow::Result<R>,
    {
        self.run(get, set, args).result
    }

    fn drive<G, S>(
        &self,
        get: G,
        set: S,
        args: &MaterializedArgumentSet,
        phases: &mut Vec<UpdatePhase>,
    ) -> Result<R, UpdateError>
    where
        G: FnOnce() -> Result<R, FetchError>,
        S: FnOnce(R) -> anyhow::Result<R>,
    {
        let mut enter = |phase: UpdatePhase| {
            debug!(phase = %phase, "generic update");
            phases.push(phase);
        };

        enter(UpdatePhase::Fetching);
        let fetched = get().map_err(|e| match e {
            FetchError::NotFound(name) => UpdateError::ResourceNotFound(name),
            FetchError::Other(source) => UpdateError::FetchFailed(source),
        });
        let mut resource = match fetched {
            Ok(resource) => resource,
            Err(err) => return Err(fail(&mut enter, err)),
        };

        enter(UpdatePhase::Patching);
        if let Err(err) = self.patch(&mut resource, args) {
            return Err(fail(&mut enter, err));
        }

        enter(UpdatePhase::Persisting);
        match set(resource) {
            Ok(persisted) => {
                enter(UpdatePhase::Done);
                Ok(persisted)
            }
            Err(source) => Err(fail(&mut enter, UpdateError::PersistFailed(source))),
        }
    }
}

fn fail(enter: &mut impl FnMut(UpdatePhase), err: UpdateError) -> UpdateError {
    warn!(kind = ?err.kind(), error = %err, "generic update failed");
    enter(UpdatePhase::Failed(err.kind()));
    err
}

fn apply<R>(
    setter: &Registered<R>,
    name: &str,
    resource: &mut R,
    value: &Value,
    args: &MaterializedArgumentSet,
) -> Result<(), UpdateError> {
    (setter.apply)(resource, value, args).map_err(|source| UpdateError::PatchRejected {
        argument: name.to_string(),
        source,
    })
}

impl GenericUpdate<serde_json::Value> {
    /// Register group setters for `--set`, `--add` and `--remove`, honoring
    /// `--force-string` when the command declares it.
    pub fn with_property_expressions(self) -> Self {
        self.group_setter("set", |resource, group, args| {
            let force_string = args.flag("force_string").unwrap_or(false);
            for expression in group.to_strings() {
                set_property(resource, &expression, force_string)?;
            }
            Ok(())
        })
        .group_setter("add", |resource, group, args| {
            let force_string = args.flag("force_string").unwrap_or(false);
            add_properties(resource, &group.to_strings(), force_string)?;
            Ok(())
        })
        .group_setter("remove", |resource, group, _| {
            remove_property(resource, &group.to_strings())?;
            Ok(())
        })
    }
}

/// The `--set`, `--add`, `--remove` and `--force-string` arguments shared
/// by update commands. Declare them under [`GENERIC_UPDATE_GROUP`].
pub fn generic_update_arguments() -> Result<Vec<ArgumentDescriptor>, DescriptorError> {
    let groups = || ValueKind::list_of(ValueKind::String);
    Ok(vec![
        ArgumentDescriptor::builder("--set")
            .kind(groups())
            .append()
            .help("Update an object by specifying a property path and value to set. Example: --set property1.property2=<value>")
            .build()?,
        ArgumentDescriptor::builder("--add")
            .kind(groups())
            .append()
            .help("Add an object to a list of objects by specifying a path and key value pairs. Example: --add property.listProperty <key=value, string or JSON string>")
            .build()?,
        ArgumentDescriptor::builder("--remove")
            .kind(groups())
            .append()
            .help("Remove a property or an element from a list. Example: --remove property.list <indexToRemove> OR --remove propertyToRemove")
            .build()?,
        ArgumentDescriptor::builder("--force-string")
            .kind(ValueKind::Bool)
            .help("When using 'set' or 'add', preserve string literals instead of attempting to convert to JSON.")
            .build()?,
    ])
}

/// Destinations of [`generic_update_arguments`], for display grouping.
pub const GENERIC_UPDATE_DESTS: &[&str] = &["set", "add", "remove", "force_string"];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn args_with(values: &[(&str, Value)], occurrences: &[&str]) -> MaterializedArgumentSet {
        let mut args = MaterializedArgumentSet::with_keys(values.iter().map(|(k, _)| *k));
        for (k, v) in values {
            args.set(k, v.clone()).unwrap();
        }
        for name in occurrences {
            args.record_occurrence(name);
        }
        args
    }

    fn groups(items: &[&[&str]]) -> Value {
        Value::List(
            items
                .iter()
                .map(|g| Value::List(g.iter().map(|s| Value::from(*s)).collect()))
                .collect(),
        )
    }

    #[test]
    fn not_found_skips_patch_and_set() {
        let patched = Arc::new(AtomicBool::new(false));
        let flag = patched.clone();
        let persisted = Cell::new(false);
        let controller = GenericUpdate::<serde_json::Value>::new()
            .custom_patch(move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_property_expressions();
        let args = args_with(&[("set", groups(&[&["a=1"]]))], &["set"]);

        let outcome = controller.run(
            || Err(FetchError::NotFound("vm1".into())),
            |r| {
                persisted.set(true);
                Ok(r)
            },
            &args,
        );

        assert!(matches!(outcome.result, Err(UpdateError::ResourceNotFound(ref n)) if n == "vm1"));
        assert_eq!(
            outcome.phases,
            vec![
                UpdatePhase::Fetching,
                UpdatePhase::Failed(FailureKind::ResourceNotFound)
            ]
        );
        assert!(!patched.load(Ordering::SeqCst));
        assert!(!persisted.get());
    }

    #[test]
    fn returns_persisted_copy() {
        let controller = GenericUpdate::<serde_json::Value>::new().with_property_expressions();
        let args = args_with(&[("set", groups(&[&["tags.env=prod"]]))], &["set"]);

        let outcome = controller.run(
            || Ok(json!({"name": "vm1", "tags": {}})),
            |mut r| {
                r["etag"] = json!("server-computed");
                Ok(r)
            },
            &args,
        );
        let updated = outcome.result.unwrap();
        assert_eq!(updated["tags"]["env"], "prod");
        assert_eq!(updated["etag"], "server-computed");
        assert_eq!(
            outcome.phases,
            vec![
                UpdatePhase::Fetching,
                UpdatePhase::Patching,
                UpdatePhase::Persisting,
                UpdatePhase::Done
            ]
        );
    }

    #[test]
    fn setter_failure_names_argument() {
        let persisted = Cell::new(false);
        let controller = GenericUpdate::<serde_json::Value>::new()
            .setter("size", |_, _, _| Err(anyhow::anyhow!("size not allowed")));
        let args = args_with(&[("size", Value::from("huge"))], &["size"]);

        let err = controller
            .update(
                || Ok(json!({})),
                |r| {
                    persisted.set(true);
                    Ok(r)
                },
                &args,
            )
            .unwrap_err();
        match err {
            UpdateError::PatchRejected { argument, source } => {
                assert_eq!(argument, "size");
                assert_eq!(source.to_string(), "size not allowed");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!persisted.get());
    }

    #[test]
    fn unknown_arguments_ignored() {
        let controller = GenericUpdate::<serde_json::Value>::new();
        let args = args_with(&[("mystery", Value::from("x"))], &["mystery"]);
        let updated = controller
            .update(|| Ok(json!({"a": 1})), Ok, &args)
            .unwrap();
        assert_eq!(updated, json!({"a": 1}));
    }

    #[test]
    fn expressions_apply_in_command_line_order() {
        let controller = GenericUpdate::<serde_json::Value>::new().with_property_expressions();
        // --set tags.a=1 --remove tags.a --set tags.a=2
        let args = args_with(
            &[
                ("set", groups(&[&["tags.a=1"], &["tags.a=2"]])),
                ("remove", groups(&[&["tags.a"]])),
                ("add", Value::Absent),
                ("force_string", Value::Absent),
            ],
            &["set", "remove", "set"],
        );
        let updated = controller
            .update(|| Ok(json!({"tags": {}})), Ok, &args)
            .unwrap();
        assert_eq!(updated["tags"]["a"], 2);
    }

    #[test]
    fn custom_patch_runs_first() {
        let controller = GenericUpdate::<serde_json::Value>::new()
            .custom_patch(|r, _| {
                r["size"] = json!("custom");
                Ok(())
            })
            .setter("size", |r, v, _| {
                r["size"] = json!(format!("{}-setter", v));
                Ok(())
            });
        let args = args_with(&[("size", Value::from("B1"))], &[]);
        let updated = controller.update(|| Ok(json!({})), Ok, &args).unwrap();
        assert_eq!(updated["size"], "B1-setter");
    }

    #[test]
    fn persist_failure_not_retried() {
        let calls = Cell::new(0);
        let controller = GenericUpdate::<serde_json::Value>::new();
        let args = MaterializedArgumentSet::default();
        let outcome = controller.run(
            || Ok(json!({})),
            |_| {
                calls.set(calls.get() + 1);
                Err(anyhow::anyhow!("conflict"))
            },
            &args,
        );
        assert_eq!(calls.get(), 1);
        assert!(matches!(outcome.result, Err(UpdateError::PersistFailed(_))));
        assert_eq!(
            outcome.phases.last(),
            Some(&UpdatePhase::Failed(FailureKind::PersistFailed))
        );
    }

    #[test]
    fn force_string_respected() {
        let controller = GenericUpdate::<serde_json::Value>::new().with_property_expressions();
        let args = args_with(
            &[
                ("set", groups(&[&["tags.zip=00501", "count=5"]])),
                ("force_string", Value::Bool(true)),
            ],
            &["set", "force_string"],
        );
        let updated = controller
            .update(|| Ok(json!({"tags": {}})), Ok, &args)
            .unwrap();
        assert_eq!(updated["tags"]["zip"], "00501");
        assert_eq!(updated["count"], "5");
    }

    #[test]
    fn shared_arguments_build() {
        let args = generic_update_arguments().unwrap();
        let dests: Vec<&str> = args.iter().map(ArgumentDescriptor::dest).collect();
        assert_eq!(dests, GENERIC_UPDATE_DESTS);
    }
}
