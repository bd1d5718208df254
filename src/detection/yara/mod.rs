//! YARA-like rule engine for pattern matching.
//!
//! This module provides a small pattern matching engine inspired by YARA:
//! - Rule definition with meta, atoms, and a condition tree
//! - Text, hex and regex atoms with nocase/wide/fullword/anchor modifiers
//! - Single-pass literal search over the whole corpus
//! - The built-in rule corpus

pub mod corpus;
pub mod engine;
pub mod rules;

pub use engine::YaraEngine;
pub use rules::{Atom, AtomSet, Condition, Encodings, PatternType, RuleMatch, RuleMeta, YaraRule};
