//! Integration tests for the dispatch pipeline.
//!
//! These tests drive the public library API end to end: registry build,
//! resolution, materialization, iteration and the generic update protocol.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use verbwork::core::args::MaterializedArgumentSet;
use verbwork::core::argument::{ArgumentDescriptor, BlankBehavior, Value, ValueKind};
use verbwork::core::command::{handler, CommandDescriptor, Handler};
use verbwork::engine::dispatch::{DispatchOutcome, Dispatcher, HelpTopic};
use verbwork::engine::registry::Registry;
use verbwork::engine::update::{FailureKind, FetchError, GenericUpdate, UpdatePhase};
use verbwork::engine::{
    BuildError, Context, DispatchError, EngineError, ErrorKind, FilePrefixPolicy, ValidationError,
};
use verbwork::ui::prompts::ScriptedPrompter;

// =============================================================================
// Fixtures
// =============================================================================

/// A handler that echoes its materialized arguments.
fn echo() -> Handler {
    handler(|args| Ok(args.to_json()))
}

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

fn vm_create() -> CommandDescriptor {
    CommandDescriptor::builder("vm create", echo())
        .argument(
            ArgumentDescriptor::builder("--name")
                .alias("-n")
                .required()
                .build()
                .unwrap(),
        )
        .argument(
            ArgumentDescriptor::builder("--size")
                .default_value(Value::from("Standard_D2"))
                .build()
                .unwrap(),
        )
        .argument(
            ArgumentDescriptor::builder("--password")
                .blank(BlankBehavior::PromptSecret {
                    message: None,
                    confirm: true,
                })
                .build()
                .unwrap(),
        )
        .argument(
            ArgumentDescriptor::builder("--custom-data")
                .help("Cloud-init script, usually @file")
                .build()
                .unwrap(),
        )
        .argument(
            ArgumentDescriptor::builder("--priority")
                .choices(["Regular", "Low", "Spot"])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn registry() -> Registry {
    Registry::builder()
        .register(vm_create())
        .register(
            CommandDescriptor::builder("vm list", echo())
                .summary("List virtual machines.")
                .build()
                .unwrap(),
        )
        .register(
            CommandDescriptor::builder("vm disk attach", echo())
                .argument(
                    ArgumentDescriptor::builder("--disks")
                        .kind(ValueKind::list_of(ValueKind::String))
                        .iterate()
                        .required()
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .register(CommandDescriptor::builder("storage", echo()).build().unwrap())
        .register(
            CommandDescriptor::builder("storage account create", echo())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn dispatch(
    ctx: &Context,
    prompter: &mut ScriptedPrompter,
    tokens: &[&str],
) -> Result<DispatchOutcome, EngineError> {
    let registry = registry();
    let dispatcher = Dispatcher::new(&registry, ctx);
    dispatcher.dispatch(&argv(tokens), prompter)
}

fn results(outcome: DispatchOutcome) -> Vec<serde_json::Value> {
    match outcome {
        DispatchOutcome::Completed { results, .. } => results,
        DispatchOutcome::Help(topic) => panic!("unexpected help: {topic:?}"),
    }
}

fn run(tokens: &[&str]) -> Result<Vec<serde_json::Value>, EngineError> {
    let mut prompter = ScriptedPrompter::non_interactive();
    dispatch(&Context::default(), &mut prompter, tokens).map(results)
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn create_with_required_and_default() {
    let out = run(&["vm", "create", "--name", "foo"]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["name"], "foo");
    assert_eq!(out[0]["size"], "Standard_D2");
    assert_eq!(out[0]["password"], serde_json::Value::Null);
}

#[test]
fn create_without_name_is_missing_required() {
    let err = run(&["vm", "create"]).unwrap_err();
    match err {
        EngineError::Validation(ValidationError::MissingRequiredArgument { argument }) => {
            assert_eq!(argument, "--name")
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn segments_match_case_insensitively() {
    let out = run(&["VM", "Create", "-n", "foo"]).unwrap();
    assert_eq!(out[0]["name"], "foo");
}

#[test]
fn group_path_is_incomplete() {
    let err = run(&["vm", "--name", "foo"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteCommand);
    match err {
        EngineError::Dispatch(DispatchError::IncompleteCommand { path, children }) => {
            assert_eq!(path, "vm");
            assert_eq!(children, vec!["create", "disk", "list"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unknown_segment_suggests_siblings() {
    let err = run(&["vm", "lst"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("lst"), "{err}");
}

#[test]
fn leaf_that_is_also_a_group_prefers_longest_match() {
    let deep = run(&["storage", "account", "create"]).unwrap();
    assert_eq!(deep[0], json!({}));
    // `storage` itself is dispatchable.
    assert_eq!(run(&["storage"]).unwrap().len(), 1);
}

#[test]
fn stray_positional_after_leaf_is_an_argument_error() {
    // `storage` is a leaf, so `acount` reaches its argument parser.
    let err = run(&["storage", "acount", "create"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnrecognizedArgument);
    assert!(err.to_string().contains("acount"), "{err}");

    let err = run(&["vm", "create", "extra", "--name", "x"]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::UnrecognizedArgument { ref token }) if token == "extra"
    ));
}

#[test]
fn duplicate_registration_aborts_build() {
    let err = Registry::builder()
        .register(CommandDescriptor::builder("vm create", echo()).build().unwrap())
        .register(CommandDescriptor::builder("vm create", echo()).build().unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateCommand(_)));
    assert_eq!(EngineError::from(err).exit_code(), 5);
}

#[test]
fn case_collision_aborts_build() {
    let err = Registry::builder()
        .register(CommandDescriptor::builder("vm create", echo()).build().unwrap())
        .register(CommandDescriptor::builder("VM list", echo()).build().unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::SegmentCollision { .. }));
}

// =============================================================================
// Materialization
// =============================================================================

#[test]
fn secret_prompt_confirmed() {
    let mut prompter = ScriptedPrompter::new(["abc", "abc"]);
    let out = results(
        dispatch(
            &Context::default(),
            &mut prompter,
            &["vm", "create", "-n", "foo", "--password", ""],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["password"], "abc");
}

#[test]
fn secret_prompt_mismatch() {
    let mut prompter = ScriptedPrompter::new(["abc", "xyz"]);
    let err = dispatch(
        &Context::default(),
        &mut prompter,
        &["vm", "create", "-n", "foo", "--password="],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfirmationMismatch);
    assert!(err.to_string().contains("--password"));
}

#[test]
fn blank_required_without_terminal_cannot_be_blank() {
    let err = run(&["vm", "create", "--name", ""]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentCannotBeBlank);
}

#[test]
fn enum_rejection_lists_choices() {
    let err = run(&["vm", "create", "-n", "foo", "--priority", "High"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgumentValue);
    let message = err.to_string();
    for choice in ["Regular", "Low", "Spot"] {
        assert!(message.contains(choice), "{message}");
    }
}

#[test]
fn file_values_are_expanded_relative_to_cwd() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("init.sh"), "\u{feff}#!/bin/sh\necho hi\n").unwrap();
    let ctx = Context {
        cwd: Some(temp.path().to_path_buf()),
        ..Context::default()
    };
    let mut prompter = ScriptedPrompter::non_interactive();

    let out = results(
        dispatch(
            &ctx,
            &mut prompter,
            &["vm", "create", "-n", "ops@contoso.com", "--custom-data", "@init.sh"],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["custom_data"], "#!/bin/sh\necho hi\n");
    // Not a path, so the value stays literal.
    assert_eq!(out[0]["name"], "ops@contoso.com");
}

#[test]
fn inline_file_values_are_expanded() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("init.sh"), "\u{feff}apt-get update\n").unwrap();
    let ctx = Context {
        cwd: Some(temp.path().to_path_buf()),
        ..Context::default()
    };
    let mut prompter = ScriptedPrompter::non_interactive();

    let out = results(
        dispatch(
            &ctx,
            &mut prompter,
            &["vm", "create", "--name=a", "--custom-data=@init.sh"],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["name"], "a");
    assert_eq!(out[0]["custom_data"], "apt-get update\n");

    // A missing file keeps the inline value literal.
    let out = results(
        dispatch(
            &ctx,
            &mut prompter,
            &["vm", "create", "--name=a", "--custom-data=@absent.sh"],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["custom_data"], "@absent.sh");
}

#[test]
fn strict_prefix_policy_keeps_bare_names_literal() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("init.sh"), "echo hi").unwrap();
    let ctx = Context {
        cwd: Some(temp.path().to_path_buf()),
        file_prefix: FilePrefixPolicy::Strict,
        ..Context::default()
    };
    let mut prompter = ScriptedPrompter::non_interactive();

    let out = results(
        dispatch(
            &ctx,
            &mut prompter,
            &["vm", "create", "-n", "a", "--custom-data", "@init.sh"],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["custom_data"], "@init.sh");

    let out = results(
        dispatch(
            &ctx,
            &mut prompter,
            &["vm", "create", "-n", "a", "--custom-data", "@./init.sh"],
        )
        .unwrap(),
    );
    assert_eq!(out[0]["custom_data"], "echo hi");
}

#[test]
fn configured_defaults_satisfy_required() {
    let registry = Registry::builder()
        .register(
            CommandDescriptor::builder("group create", echo())
                .argument(
                    ArgumentDescriptor::builder("--location")
                        .required()
                        .configured_default("location")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let ctx = Context {
        defaults: BTreeMap::from([("location".to_string(), "westus".to_string())]),
        ..Context::default()
    };
    let mut prompter = ScriptedPrompter::non_interactive();

    let out = results(
        Dispatcher::new(&registry, &ctx)
            .dispatch(&argv(&["group", "create"]), &mut prompter)
            .unwrap(),
    );
    assert_eq!(out[0]["location"], "westus");
}

#[test]
fn iterated_argument_invokes_once_per_element() {
    let out = run(&["vm", "disk", "attach", "--disks", "d1", "d2", "d3"]).unwrap();
    let disks: Vec<_> = out.iter().map(|r| r["disks"].clone()).collect();
    assert_eq!(disks, vec![json!("d1"), json!("d2"), json!("d3")]);
}

#[test]
fn help_anywhere_after_the_path() {
    let mut prompter = ScriptedPrompter::non_interactive();
    match dispatch(&Context::default(), &mut prompter, &["vm", "create", "-n", "x", "--help"])
        .unwrap()
    {
        DispatchOutcome::Help(HelpTopic::Command(cmd)) => {
            assert_eq!(cmd.path().as_str(), "vm create")
        }
        other => panic!("unexpected: {other:?}"),
    }
    match dispatch(&Context::default(), &mut prompter, &["-h"]).unwrap() {
        DispatchOutcome::Help(HelpTopic::Group { path, children }) => {
            assert_eq!(path, "");
            assert_eq!(children.len(), 2);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn handlers_only_see_declared_keys() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let registry = Registry::builder()
        .register(
            CommandDescriptor::builder(
                "vm show",
                handler(move |args| {
                    let keys: Vec<String> = args.iter().map(|(k, _)| k.to_string()).collect();
                    captured.lock().unwrap().extend(keys);
                    Ok(serde_json::Value::Null)
                }),
            )
            .argument(ArgumentDescriptor::builder("--name").build().unwrap())
            .argument(ArgumentDescriptor::builder("--expand").build().unwrap())
            .build()
            .unwrap(),
        )
        .build()
        .unwrap();

    let ctx = Context::default();
    let mut prompter = ScriptedPrompter::non_interactive();
    Dispatcher::new(&registry, &ctx)
        .dispatch(&argv(&["vm", "show", "--name", "a"]), &mut prompter)
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["expand", "name"]);
}

// =============================================================================
// Generic update
// =============================================================================

#[test]
fn not_found_fetch_never_patches_or_persists() {
    let patched = Arc::new(Mutex::new(false));
    let flag = patched.clone();
    let controller = GenericUpdate::<serde_json::Value>::new().custom_patch(move |_, _| {
        *flag.lock().unwrap() = true;
        Ok(())
    });
    let persisted = Cell::new(false);
    let fetches = Cell::new(0);

    let outcome = controller.run(
        || {
            fetches.set(fetches.get() + 1);
            Err(FetchError::NotFound("vm1".into()))
        },
        |vm| {
            persisted.set(true);
            Ok(vm)
        },
        &MaterializedArgumentSet::default(),
    );

    assert_eq!(fetches.get(), 1);
    assert!(!*patched.lock().unwrap());
    assert!(!persisted.get());
    assert_eq!(
        outcome.phases,
        vec![
            UpdatePhase::Fetching,
            UpdatePhase::Failed(FailureKind::ResourceNotFound)
        ]
    );
}

#[test]
fn update_returns_what_set_returned() {
    let mut args = MaterializedArgumentSet::with_keys(["set", "force_string"]);
    args.set(
        "set",
        Value::List(vec![Value::List(vec![Value::from("tags.env=prod")])]),
    )
    .unwrap();

    let updated = GenericUpdate::new()
        .with_property_expressions()
        .update(
            || Ok(json!({"name": "vm1", "tags": {}})),
            |mut vm| {
                vm["etag"] = json!("server-computed");
                Ok(vm)
            },
            &args,
        )
        .unwrap();

    assert_eq!(updated["tags"]["env"], "prod");
    assert_eq!(updated["etag"], "server-computed");
}
