//! Risk aggregation.
//!
//! Signals are folded in a fixed order so the threat list is reproducible:
//! 1. High-risk file type -> high
//! 2. Entropy above 7.0 -> high
//! 3. Each rule match, in corpus order -> at most medium
//!
//! The level only ever rises. Pattern matches alone never push a file past medium.

use super::entropy::EntropyAnalyzer;
use crate::core::error::AnalysisFault;
use crate::core::types::{HashDigests, RiskLevel, ScanResult, TypeClassification, UNKNOWN_MIME};
use crate::detection::yara::RuleMatch;
use chrono::Utc;

/// Threat text for a denylisted file type.
pub fn high_risk_type_threat(mime_type: &str) -> String {
    format!("High-risk file type detected: {}", mime_type)
}

pub const HIGH_ENTROPY_THREAT: &str = "High entropy detected: possible encryption or packing";

/// Threat text for a fired rule.
pub fn pattern_match_threat(rule_name: &str) -> String {
    format!("Pattern match: {}", rule_name)
}

/// Threat text for a degraded analysis.
pub fn analysis_error_threat(fault: &AnalysisFault) -> String {
    format!("Error analyzing file: {}", fault)
}

/// Fused verdict over all signals.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Threat descriptions, in signal order
    pub threats: Vec<String>,
    pub risk_level: RiskLevel,
    pub is_malicious: bool,
    /// Names of fired rules, in corpus order
    pub matched_rules: Vec<String>,
}

/// Combines type, entropy and rule signals into a verdict.
pub struct RiskAggregator;

impl RiskAggregator {
    /// Aggregate signals into a verdict.
    pub fn aggregate(
        classification: &TypeClassification,
        entropy: f64,
        matches: &[RuleMatch],
    ) -> Verdict {
        let mut threats = Vec::new();
        let mut risk_level = RiskLevel::Low;

        if classification.is_high_risk {
            threats.push(high_risk_type_threat(&classification.mime_type));
            risk_level.escalate(RiskLevel::High);
        }

        if EntropyAnalyzer::is_high(entropy) {
            threats.push(HIGH_ENTROPY_THREAT.to_string());
            risk_level.escalate(RiskLevel::High);
        }

        for m in matches {
            threats.push(pattern_match_threat(&m.rule_name));
            risk_level.escalate(RiskLevel::Medium);
        }

        Verdict {
            is_malicious: !threats.is_empty(),
            threats,
            risk_level,
            matched_rules: matches.iter().map(|m| m.rule_name.clone()).collect(),
        }
    }

    /// Build the full result for a completed analysis.
    pub fn complete(
        classification: TypeClassification,
        file_size: u64,
        hashes: HashDigests,
        entropy: f64,
        matches: &[RuleMatch],
    ) -> ScanResult {
        let verdict = Self::aggregate(&classification, entropy, matches);
        ScanResult {
            mime_type: classification.mime_type,
            file_size,
            hashes,
            entropy,
            threats: verdict.threats,
            is_malicious: verdict.is_malicious,
            risk_level: verdict.risk_level,
            detection_time: Utc::now(),
            matched_rules: verdict.matched_rules,
        }
    }

    /// Build the result for an analysis that faulted after hashing.
    ///
    /// Hashes and size are kept; every stage-derived field is reset.
    pub fn degraded(file_size: u64, hashes: HashDigests, fault: &AnalysisFault) -> ScanResult {
        let threats = vec![analysis_error_threat(fault)];
        ScanResult {
            mime_type: UNKNOWN_MIME.to_string(),
            file_size,
            hashes,
            entropy: 0.0,
            is_malicious: !threats.is_empty(),
            threats,
            risk_level: RiskLevel::Unknown,
            detection_time: Utc::now(),
            matched_rules: Vec::new(),
        }
    }
}
