//! Utility functions and helpers.

pub mod hash;
pub mod logging;

pub use hash::{ContentDigest, DigestedFile, HashCalculator};
pub use logging::{init_logging, LogConfig};
