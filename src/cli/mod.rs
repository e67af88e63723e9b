//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse global flags and load configuration
//! - Initialise logging
//! - Build the registry over the resource store
//! - Hand the command tokens to the [`crate::engine`] and print the outcome
//! - Map failures to exit codes
//!
//! # Exit Codes
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | handler error |
//! | 2 | unknown command or invalid arguments |
//! | 3 | resource not found |
//! | 4 | other update failure |
//! | 5 | configuration or startup error |

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::ConfigTargets;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, CONFIG_ENV};
use crate::engine::dispatch::{DispatchOutcome, Dispatcher};
use crate::engine::{Context, FilePrefixPolicy};
use crate::store::{FileResourceStore, ResourceStore};
use crate::ui::output::{self, Verbosity};
use crate::ui::prompts::TerminalPrompter;

/// Environment variable holding a tracing filter; overrides every other
/// log level setting.
pub const LOG_ENV: &str = "VW_LOG";

/// Exit code for configuration and startup failures.
pub const STARTUP_FAILURE: i32 = 5;

const PROGRAM: &str = "vw";

/// Run the CLI application and return the process exit code.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> i32 {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    let (ctx, store, targets) = match startup(&cli) {
        Ok(started) => started,
        Err(err) => {
            output::error(format!("{err:#}"));
            return STARTUP_FAILURE;
        }
    };

    let registry = match commands::registry(store, targets) {
        Ok(registry) => registry,
        Err(err) => {
            output::error(format!("{err:#}"));
            return STARTUP_FAILURE;
        }
    };

    if cli.tokens.first().map(String::as_str) == Some(commands::COMPLETION) {
        let mut stdout = std::io::stdout();
        return match commands::completion(&registry, &cli.tokens[1..], &mut stdout) {
            Ok(()) => 0,
            Err(err) => {
                output::error(format!("{err:#}"));
                2
            }
        };
    }

    // A bare `vw` lists the top-level groups.
    let tokens = if cli.tokens.is_empty() {
        vec!["--help".to_string()]
    } else {
        cli.tokens.clone()
    };

    let mut prompter = TerminalPrompter::new(ctx.interactive);
    let dispatcher = Dispatcher::new(&registry, &ctx);
    let outcome = dispatcher.dispatch(&tokens, &mut prompter);
    match outcome {
        Ok(DispatchOutcome::Completed { results, .. }) => {
            if let Some(rendered) = output::render_results(&results) {
                output::print(rendered, verbosity);
            }
            0
        }
        Ok(DispatchOutcome::Help(topic)) => {
            println!("{}", output::render_help(PROGRAM, &topic));
            0
        }
        Err(err) => {
            output::error(&err);
            err.exit_code()
        }
    }
}

/// Load configuration, initialise logging and open the store.
fn startup(cli: &Cli) -> Result<(Context, Arc<dyn ResourceStore>, ConfigTargets)> {
    let cwd = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path, Some(cwd.as_path())),
        None => Config::load(Some(cwd.as_path())),
    }
    .context("failed to load configuration")?;
    let config = loaded.config;

    init_logging(cli.log_level(), &config.log_level());
    debug!(
        global = ?config.global_config_loaded_from(),
        local = ?config.local_config_loaded_from(),
        env = CONFIG_ENV,
        "configuration loaded"
    );

    let ctx = Context {
        cwd: Some(cwd.clone()),
        interactive: cli.interactive() && config.interactive(),
        file_prefix: if config.strict_file_prefix() {
            FilePrefixPolicy::Strict
        } else {
            FilePrefixPolicy::Lenient
        },
        defaults: config.defaults(),
    };

    let store_path = resolve_against(&cwd, config.store_path()?);
    debug!(path = %store_path.display(), "resource store");
    let store: Arc<dyn ResourceStore> = Arc::new(FileResourceStore::with_path(store_path));

    let targets = ConfigTargets::new(&config, &cwd);
    Ok((ctx, store, targets))
}

fn resolve_against(cwd: &std::path::Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Install the stderr subscriber. `VW_LOG` wins, then the flag level, then
/// the configured level.
fn init_logging(flag_level: Option<&str>, config_level: &str) {
    let fallback = flag_level.unwrap_or(config_level);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second initialisation (tests calling run twice) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
