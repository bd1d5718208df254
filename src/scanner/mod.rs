//! File analysis and scan bookkeeping.
//!
//! This module provides the scanning capabilities:
//! - File type detection via magic bytes
//! - The single-file analysis pipeline
//! - Bounded concurrent batch analysis
//! - Scan record persistence

pub mod analyzer;
pub mod batch;
pub mod filetype;
pub mod results;

pub use analyzer::{FileAnalyzer, RuleScanner, TypeClassifier};
pub use batch::{BatchItem, BatchScanner, BatchStatus};
pub use filetype::{FileType, FileTypeDetector};
pub use results::{ScanRecord, ScanResultStore};
