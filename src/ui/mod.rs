//! User interface components.
//!
//! This module provides the command-line interface definition.

pub mod cli;

pub use cli::{Cli, Commands, ConfigAction, OutputFormat};
