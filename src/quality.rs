//! Entropy accounting for PUF responses.
//!
//! The key derivation hash stretches any response into a full-width scalar,
//! so the digest alone says nothing about how many independent bits went
//! in. This module counts them and flags responses that cannot carry a
//! device-unique identity.

use serde::{Deserialize, Serialize};

use crate::puf::Response;

/// Thresholds a response must meet to be considered key-grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityPolicy {
    /// Minimum number of harvested response bits.
    pub min_bits: usize,
    /// Maximum allowed distance of the ones ratio from 0.5.
    pub max_bias: f64,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_bits: 64,
            max_bias: 0.25,
        }
    }
}

/// Outcome of validating a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Whether the response meets the policy.
    pub acceptable: bool,
    /// Detected anomalies.
    pub anomalies: Vec<Anomaly>,
    /// Statistics about the response bits.
    pub stats: ResponseStats,
}

/// Detected anomaly in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub detail: String,
}

/// Types of anomalies that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Fewer harvested bits than the policy floor.
    TooFewBits,
    /// Ones ratio too far from one half.
    Biased,
    /// Every bit has the same value.
    Constant,
}

/// Statistics about response bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStats {
    /// Number of harvested bits.
    pub bits: usize,
    /// Number of bits set to one.
    pub ones: usize,
    /// `|ones / bits - 0.5|`, 0 for an empty response.
    pub bias: f64,
}

impl ResponseStats {
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let (count, ones) = bits
            .into_iter()
            .fold((0usize, 0usize), |(n, o), b| (n + 1, o + usize::from(b)));
        let bias = if count == 0 {
            0.0
        } else {
            (ones as f64 / count as f64 - 0.5).abs()
        };
        Self {
            bits: count,
            ones,
            bias,
        }
    }
}

impl QualityPolicy {
    /// Validate a packed response.
    pub fn validate(&self, response: &Response) -> QualityReport {
        self.validate_stats(ResponseStats::from_bits(response.bits()))
    }

    /// Validate precomputed statistics.
    pub fn validate_stats(&self, stats: ResponseStats) -> QualityReport {
        let mut anomalies = Vec::new();

        if stats.bits < self.min_bits {
            anomalies.push(Anomaly {
                kind: AnomalyKind::TooFewBits,
                detail: format!("Harvested {} bits, need {}", stats.bits, self.min_bits),
            });
        }

        // A single bit is neither constant nor biased in any useful sense
        if stats.bits >= 2 {
            if stats.ones == 0 || stats.ones == stats.bits {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::Constant,
                    detail: format!("All {} bits are equal", stats.bits),
                });
            } else if stats.bias > self.max_bias {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::Biased,
                    detail: format!(
                        "Ones ratio {:.3} deviates from 0.5 by {:.3}",
                        stats.ones as f64 / stats.bits as f64,
                        stats.bias
                    ),
                });
            }
        }

        QualityReport {
            acceptable: anomalies.is_empty(),
            anomalies,
            stats,
        }
    }
}
