//! Verbwork - hierarchical command dispatch and argument binding
//!
//! Verbwork turns a flat table of `"group subgroup verb" -> descriptor`
//! registrations into a command tree, resolves a raw argument vector to a
//! single handler, binds the remaining flags into a typed argument set, and
//! drives the get -> patch -> set protocol used by resource-update commands.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line surface (global flags, command table, exit codes)
//! - [`engine`] - Tree building, token resolution, materialization, generic update
//! - [`core`] - Descriptors, argument sets, strong types, configuration
//! - [`store`] - Local resource store backing the bundled command table
//! - [`ui`] - Interactive prompts and output formatting
//!
//! # Correctness Invariants
//!
//! 1. The command tree is built once and never mutated afterwards
//! 2. Handlers only ever see arguments their descriptor declared
//! 3. A required argument ends up with a value or a hard error, never a silent default
//! 4. Generic update returns the persisted resource, never the local copy

pub mod cli;
pub mod core;
pub mod engine;
pub mod store;
pub mod ui;
