//! cli::args
//!
//! Global flags, parsed with clap derive.
//!
//! # Global Flags
//!
//! These flags must come before the command path:
//! - `--cwd <path>`: Run as if in that directory
//! - `--config <path>`: Use this config file instead of the search path
//! - `--debug` / `--verbose`: Raise the log level
//! - `--no-interactive`: Never prompt
//! - `--quiet` / `-q`: Minimal output; implies `--no-interactive`
//!
//! Everything from the first command token on is handed to the engine
//! untouched, including `--help`.

use clap::Parser;
use std::path::PathBuf;

/// Verbwork - resource commands over a hierarchical command tree
#[derive(Parser, Debug)]
#[command(name = "vw")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true, disable_help_subcommand = true)]
pub struct Cli {
    /// Run as if vw was started in this directory
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Read configuration from this file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Enable info logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable interactive prompts
    #[arg(long)]
    pub no_interactive: bool,

    /// Command path followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub tokens: Vec<String>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Prompts allowed by the flags. Config and terminal state can still
    /// turn them off.
    pub fn interactive(&self) -> bool {
        !(self.no_interactive || self.quiet)
    }

    /// Log level requested on the command line, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        if self.debug {
            Some("debug")
        } else if self.verbose {
            Some("info")
        } else {
            None
        }
    }
}
