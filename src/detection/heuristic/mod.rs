//! Heuristic signals and their aggregation.
//!
//! - Entropy calculation for packing/encryption detection
//! - Risk aggregation of type, entropy and rule signals

pub mod entropy;
pub mod scoring;

pub use entropy::{EntropyAnalyzer, EntropyLevel};
pub use scoring::{RiskAggregator, Verdict};
