//! Core type definitions used throughout upload-inspector.

use crate::core::error::AnalysisFault;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type reported when a stage faulted before classification completed.
pub const UNKNOWN_MIME: &str = "unknown";

/// Overall risk verdict for an analysed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No signal fired
    Low,
    /// Only pattern matches fired
    Medium,
    /// High-risk type or high entropy
    High,
    /// Analysis was degraded by an internal fault
    Unknown,
}

impl RiskLevel {
    /// Position on the low < medium < high scale. `Unknown` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            RiskLevel::Low => Some(0),
            RiskLevel::Medium => Some(1),
            RiskLevel::High => Some(2),
            RiskLevel::Unknown => None,
        }
    }

    /// Raise to `target` if it is strictly higher. Never lowers the level.
    pub fn escalate(&mut self, target: RiskLevel) {
        if let (Some(current), Some(next)) = (self.rank(), target.rank()) {
            if next > current {
                *self = target;
            }
        }
    }

    /// Get string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "unknown" => Some(RiskLevel::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Content digests of a file, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// Result of magic-byte type sniffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeClassification {
    /// Detected MIME type
    pub mime_type: String,
    /// Whether the MIME type is on the high-risk denylist
    pub is_high_risk: bool,
}

/// Aggregate verdict for one analysed file.
///
/// Field names are the wire contract shared with storage and any transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub mime_type: String,
    pub file_size: u64,
    pub hashes: HashDigests,
    pub entropy: f64,
    pub threats: Vec<String>,
    pub is_malicious: bool,
    pub risk_level: RiskLevel,
    /// When the analysis ran, not the file's modification time
    pub detection_time: DateTime<Utc>,
    #[serde(rename = "yara_matches")]
    pub matched_rules: Vec<String>,
}

impl ScanResult {
    /// Short one-line summary for logs and text output.
    pub fn summary(&self) -> String {
        format!(
            "{} ({} bytes), risk {}, {} threat(s)",
            self.mime_type,
            self.file_size,
            self.risk_level,
            self.threats.len()
        )
    }
}

/// Outcome of one `analyze` call.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// Every stage ran
    Complete(ScanResult),
    /// A stage faulted after hashing; `result` holds the partial verdict
    Degraded {
        result: ScanResult,
        fault: AnalysisFault,
    },
}

impl AnalysisOutcome {
    /// Borrow the scan result regardless of variant.
    pub fn result(&self) -> &ScanResult {
        match self {
            AnalysisOutcome::Complete(result) => result,
            AnalysisOutcome::Degraded { result, .. } => result,
        }
    }

    /// Take the scan result regardless of variant.
    pub fn into_result(self) -> ScanResult {
        match self {
            AnalysisOutcome::Complete(result) => result,
            AnalysisOutcome::Degraded { result, .. } => result,
        }
    }

    /// The fault behind a degraded outcome.
    pub fn fault(&self) -> Option<&AnalysisFault> {
        match self {
            AnalysisOutcome::Complete(_) => None,
            AnalysisOutcome::Degraded { fault, .. } => Some(fault),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisOutcome::Degraded { .. })
    }
}

/// Lifecycle state of a stored scan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Record created, analysis not finished
    Scanning,
    /// Analysis finished and results stored
    Complete,
    /// Analysis could not run (e.g. unreadable file)
    Failed,
}

impl ScanStatus {
    /// Get string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Scanning => "scanning",
            ScanStatus::Complete => "complete",
            ScanStatus::Failed => "failed",
        }
    }

    /// Parse from string, falling back to `Scanning` for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "complete" => ScanStatus::Complete,
            "failed" => ScanStatus::Failed,
            _ => ScanStatus::Scanning,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
