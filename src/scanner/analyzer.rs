//! Single-file analysis pipeline.
//!
//! A file is read once (hashes, histogram and content in one pass), then
//! classified, matched against the rule corpus and aggregated. Read failures
//! are errors; any fault after the read, including a panic inside a stage,
//! becomes an [`AnalysisOutcome::Degraded`] result instead.

use crate::core::config::AnalysisConfig;
use crate::core::error::{AnalysisFault, Result};
use crate::core::types::{AnalysisOutcome, HashDigests, TypeClassification};
use crate::detection::heuristic::{EntropyAnalyzer, RiskAggregator};
use crate::detection::yara::{RuleMatch, YaraEngine};
use crate::scanner::filetype::FileTypeDetector;
use crate::utils::hash::{DigestedFile, HashCalculator};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

/// Stage that maps content to a MIME type and risk flag.
pub trait TypeClassifier: Send + Sync {
    fn classify_type(&self, content: &[u8]) -> std::result::Result<TypeClassification, AnalysisFault>;
}

/// Stage that evaluates the rule corpus against content.
pub trait RuleScanner: Send + Sync {
    fn scan_rules(&self, content: &[u8]) -> std::result::Result<Vec<RuleMatch>, AnalysisFault>;
}

impl TypeClassifier for FileTypeDetector {
    fn classify_type(&self, content: &[u8]) -> std::result::Result<TypeClassification, AnalysisFault> {
        Ok(FileTypeDetector::classify(content))
    }
}

impl RuleScanner for YaraEngine {
    fn scan_rules(&self, content: &[u8]) -> std::result::Result<Vec<RuleMatch>, AnalysisFault> {
        Ok(self.scan(content))
    }
}

/// Analyzes files against a shared classifier and rule engine.
///
/// Cheap to clone; stages are shared, never copied.
#[derive(Clone)]
pub struct FileAnalyzer {
    classifier: Arc<dyn TypeClassifier>,
    scanner: Arc<dyn RuleScanner>,
    max_file_size: Option<u64>,
}

impl FileAnalyzer {
    /// Create an analyzer with the magic-byte classifier and the given engine.
    pub fn new(engine: Arc<YaraEngine>) -> Self {
        Self::with_stages(Arc::new(FileTypeDetector), engine)
    }

    /// Create an analyzer from explicit stages.
    pub fn with_stages(classifier: Arc<dyn TypeClassifier>, scanner: Arc<dyn RuleScanner>) -> Self {
        Self {
            classifier,
            scanner,
            max_file_size: None,
        }
    }

    /// Create an analyzer honouring the configured size guard.
    pub fn from_config(engine: Arc<YaraEngine>, config: &AnalysisConfig) -> Self {
        Self::new(engine).with_max_file_size(config.max_file_size_bytes())
    }

    /// Refuse files larger than `limit` bytes. `None` disables the guard.
    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.max_file_size = limit;
        self
    }

    /// Analyze a file on disk.
    ///
    /// Fails only if the file cannot be read; the file itself is left untouched.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisOutcome> {
        log::debug!("Analyzing {}", path.display());
        let DigestedFile {
            content,
            hashes,
            histogram,
        } = HashCalculator::digest_file(path, self.max_file_size)?;

        let outcome = self.run_stages(&content, hashes, &histogram);
        if let Some(fault) = outcome.fault() {
            log::warn!("Degraded analysis of {}: {}", path.display(), fault);
        }
        Ok(outcome)
    }

    /// Analyze an in-memory buffer. The size guard does not apply.
    pub fn analyze_bytes(&self, content: &[u8]) -> AnalysisOutcome {
        let (hashes, histogram) = HashCalculator::digest_bytes(content).finalize();
        let outcome = self.run_stages(content, hashes, &histogram);
        if let Some(fault) = outcome.fault() {
            log::warn!("Degraded analysis of in-memory buffer: {}", fault);
        }
        outcome
    }

    fn run_stages(
        &self,
        content: &[u8],
        hashes: HashDigests,
        histogram: &[u64; 256],
    ) -> AnalysisOutcome {
        let file_size = content.len() as u64;

        let classification = match run_stage("type classification", || {
            self.classifier.classify_type(content)
        }) {
            Ok(classification) => classification,
            Err(fault) => return Self::degraded(file_size, hashes, fault),
        };

        let entropy = EntropyAnalyzer::from_histogram(histogram);

        let matches = match run_stage("pattern matching", || self.scanner.scan_rules(content)) {
            Ok(matches) => matches,
            Err(fault) => return Self::degraded(file_size, hashes, fault),
        };

        let result = RiskAggregator::complete(classification, file_size, hashes, entropy, &matches);
        log::debug!("Analysis complete: {}", result.summary());
        AnalysisOutcome::Complete(result)
    }

    fn degraded(file_size: u64, hashes: HashDigests, fault: AnalysisFault) -> AnalysisOutcome {
        AnalysisOutcome::Degraded {
            result: RiskAggregator::degraded(file_size, hashes, &fault),
            fault,
        }
    }
}

/// Run one stage, turning a panic into a fault.
fn run_stage<T>(
    stage: &'static str,
    f: impl FnOnce() -> std::result::Result<T, AnalysisFault>,
) -> std::result::Result<T, AnalysisFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(AnalysisFault::Panicked {
            stage,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
