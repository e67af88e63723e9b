//! configure command - manage `[defaults]` in the config files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use serde_json::json;

use crate::core::argument::{ArgumentDescriptor, DescriptorError, Value, ValueKind};
use crate::core::command::{handler, CommandDescriptor};
use crate::core::config::Config;

/// Where `configure` writes, and the defaults in effect at startup.
#[derive(Debug, Clone, Default)]
pub struct ConfigTargets {
    global: Option<PathBuf>,
    local: PathBuf,
    defaults: BTreeMap<String, String>,
}

impl ConfigTargets {
    /// Write to the file the global config was loaded from (or the
    /// canonical location) and to the local file under `cwd`.
    pub fn new(config: &Config, cwd: &Path) -> Self {
        Self {
            global: config.global_config_loaded_from().map(Path::to_path_buf),
            local: Config::local_config_path(cwd),
            defaults: config.defaults(),
        }
    }

    pub fn with_paths(global: PathBuf, local: PathBuf) -> Self {
        Self {
            global: Some(global),
            local,
            defaults: BTreeMap::new(),
        }
    }

    fn path(&self, scope: &str) -> anyhow::Result<PathBuf> {
        match (scope, &self.global) {
            ("local", _) => Ok(self.local.clone()),
            (_, Some(global)) => Ok(global.clone()),
            (_, None) => Ok(Config::global_config_path()?),
        }
    }
}

pub(super) fn commands(targets: ConfigTargets) -> Result<Vec<CommandDescriptor>, DescriptorError> {
    Ok(vec![configure(targets)?])
}

fn configure(targets: ConfigTargets) -> Result<CommandDescriptor, DescriptorError> {
    CommandDescriptor::builder(
        "configure",
        handler(move |args| {
            if args.flag("list_defaults")? {
                return Ok(json!(targets.defaults));
            }

            let entries = args.strings("defaults")?;
            if entries.is_empty() {
                bail!("nothing to configure; pass --defaults key=value or --list-defaults");
            }

            let scope = args.str("scope")?.unwrap_or("global");
            let path = targets.path(scope)?;
            let mut defaults = BTreeMap::new();
            for entry in &entries {
                let Some((key, value)) = entry.split_once('=') else {
                    bail!("expected key=value, got '{entry}'");
                };
                let value = Some(value.trim()).filter(|v| !v.is_empty());
                defaults = Config::update_default(&path, key.trim(), value)
                    .with_context(|| format!("cannot update {}", path.display()))?;
            }

            Ok(json!({
                "scope": scope,
                "path": path.display().to_string(),
                "defaults": defaults,
            }))
        }),
    )
    .argument(
        ArgumentDescriptor::builder("--defaults")
            .alias("-d")
            .kind(ValueKind::list_of(ValueKind::String))
            .help("Space-separated key=value defaults. An empty value clears the key.")
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--scope")
            .choices(["global", "local"])
            .default_value(Value::from("global"))
            .help("Write to the global config or the one in the working directory.")
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--list-defaults")
            .alias("-l")
            .kind(ValueKind::Bool)
            .help("Show the defaults in effect.")
            .build()?,
    )
    .summary("Manage configured argument defaults.")
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatch::{DispatchOutcome, Dispatcher};
    use crate::engine::registry::Registry;
    use crate::engine::Context;
    use crate::ui::prompts::ScriptedPrompter;
    use tempfile::TempDir;

    fn run(targets: ConfigTargets, line: &str) -> anyhow::Result<serde_json::Value> {
        let registry = Registry::builder().extend(commands(targets)?).build()?;
        let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let ctx = Context::default();
        let mut prompter = ScriptedPrompter::non_interactive();
        let dispatcher = Dispatcher::new(&registry, &ctx);
        let outcome = dispatcher.dispatch(&argv, &mut prompter)?;
        match outcome {
            DispatchOutcome::Completed { mut results, .. } => Ok(results.remove(0)),
            DispatchOutcome::Help(_) => bail!("unexpected help"),
        }
    }

    #[test]
    fn set_and_clear_global_default() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        let targets = ConfigTargets::with_paths(global.clone(), temp.path().join("local.toml"));

        let out = run(targets.clone(), "configure --defaults location=westus size=B1s").unwrap();
        assert_eq!(out["scope"], "global");
        assert_eq!(out["defaults"], json!({"location": "westus", "size": "B1s"}));

        let config = Config::load_from(&global, None).unwrap().config;
        assert_eq!(config.defaults().get("location").unwrap(), "westus");

        let out = run(targets, "configure --defaults location=").unwrap();
        assert_eq!(out["defaults"], json!({"size": "B1s"}));
    }

    #[test]
    fn local_scope_writes_local_file() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join(".verbwork/config.toml");
        let targets = ConfigTargets::with_paths(temp.path().join("global.toml"), local.clone());

        run(targets, "configure --scope local -d location=eastus").unwrap();
        assert!(local.exists());
        assert!(!temp.path().join("global.toml").exists());
    }

    #[test]
    fn list_defaults_reports_startup_values() {
        let mut targets = ConfigTargets::default();
        targets.defaults.insert("location".into(), "westus".into());
        let out = run(targets, "configure --list-defaults").unwrap();
        assert_eq!(out, json!({"location": "westus"}));
    }

    #[test]
    fn malformed_entry_fails() {
        let temp = TempDir::new().unwrap();
        let targets =
            ConfigTargets::with_paths(temp.path().join("g.toml"), temp.path().join("l.toml"));
        assert!(run(targets.clone(), "configure --defaults location").is_err());
        assert!(run(targets, "configure").is_err());
    }
}
