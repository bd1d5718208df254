//! Threat detection: rule matching and heuristic signals.
//!
//! - YARA-like signature rules over file content
//! - Entropy analysis for packing/encryption
//! - Risk aggregation of every signal into one verdict

pub mod heuristic;
pub mod yara;

pub use heuristic::{EntropyAnalyzer, RiskAggregator, Verdict};
pub use yara::{RuleMatch, YaraEngine, YaraRule};
