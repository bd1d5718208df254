//! upload-inspector: deterministic threat analysis for uploaded files
//!
//! This crate hashes a file, sniffs its type from magic bytes, measures its
//! entropy and matches it against a YARA-like rule corpus, then folds those
//! signals into one risk verdict. Scan records can be kept in SQLite.

pub mod core;
pub mod detection;
pub mod scanner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{AnalysisFault, Error, Result};
pub use crate::core::types::*;
pub use crate::scanner::FileAnalyzer;
