//! Shannon entropy over the byte-value alphabet.
//!
//! High entropy (close to 8.0 for byte data) typically indicates:
//! - Encrypted content
//! - Compressed/packed executables
//! - Random or obfuscated data
//!
//! Plain text usually sits between 3.5 and 5.0.

/// Entropy above this value is reported as possible encryption or packing.
pub const ENTROPY_HIGH: f64 = 7.0;
pub const ENTROPY_LOW: f64 = 5.0;
pub const ENTROPY_MAX: f64 = 8.0;

/// Entropy analyzer for detecting packed/encrypted content.
pub struct EntropyAnalyzer;

impl EntropyAnalyzer {
    /// Calculate Shannon entropy of byte data.
    ///
    /// Returns a value between 0.0 (no randomness) and 8.0 (maximum randomness for bytes).
    pub fn calculate(data: &[u8]) -> f64 {
        let mut frequencies = [0u64; 256];
        for &byte in data {
            frequencies[byte as usize] += 1;
        }
        Self::from_histogram(&frequencies)
    }

    /// Calculate entropy from a precomputed byte-value histogram.
    pub fn from_histogram(frequencies: &[u64; 256]) -> f64 {
        let total: u64 = frequencies.iter().sum();
        if total == 0 {
            return 0.0;
        }

        let len = total as f64;
        let mut entropy = 0.0;

        for &count in frequencies {
            if count > 0 {
                let probability = count as f64 / len;
                entropy -= probability * probability.log2();
            }
        }

        // Rounding can push a single-symbol input a hair below zero.
        entropy.clamp(0.0, ENTROPY_MAX)
    }

    /// Whether the aggregator treats this value as a high-entropy signal.
    pub fn is_high(entropy: f64) -> bool {
        entropy > ENTROPY_HIGH
    }

    /// Classify entropy level for display.
    pub fn classify(entropy: f64) -> EntropyLevel {
        if entropy < ENTROPY_LOW {
            EntropyLevel::Low
        } else if entropy <= ENTROPY_HIGH {
            EntropyLevel::Normal
        } else {
            EntropyLevel::High
        }
    }
}

/// Classification of entropy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyLevel {
    /// Low entropy (< 5.0) - structured data, text
    Low,
    /// Normal entropy (5.0-7.0) - code, mixed binary
    Normal,
    /// High entropy (> 7.0) - likely encrypted or packed
    High,
}

impl std::fmt::Display for EntropyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntropyLevel::Low => write!(f, "Low"),
            EntropyLevel::Normal => write!(f, "Normal"),
            EntropyLevel::High => write!(f, "High"),
        }
    }
}
