//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`prompts`] - Interactive prompts for blank arguments
//! - [`output`] - Result rendering, help text, diagnostics
//!
//! # Design
//!
//! All output and prompts go through this module so interactive and
//! non-interactive runs behave the same way apart from the prompts.

pub mod output;
pub mod prompts;
