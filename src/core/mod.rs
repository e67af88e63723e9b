//! core
//!
//! Core data model for the dispatch engine.
//!
//! # Modules
//!
//! - [`types`] - Strong types: CommandPath, FlagName
//! - [`argument`] - Argument descriptors and materialized values
//! - [`command`] - Command descriptors and handlers
//! - [`args`] - The typed argument set handed to handlers
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Descriptors are validated at construction and immutable afterwards
//! - An argument's capabilities (prompting, appending, iteration) are fixed
//!   when it is built, never patched in later
//! - Unknown argument names are an error, not a silent no-op

pub mod args;
pub mod argument;
pub mod command;
pub mod config;
pub mod types;
