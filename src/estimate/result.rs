use serde::{Deserialize, Serialize};

use crate::catalog::Mode;
use crate::constraints::Constraint;
use crate::features::FeatureKind;
use crate::request::ModelKind;
use crate::warning::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

impl Confidence {
    /// More than a quarter of the features dropped is a low-confidence quote
    pub fn for_features(attempted: usize, skipped: usize, approximated: bool) -> Self {
        if attempted == 0 || skipped * 4 > attempted {
            Confidence::Low
        } else if skipped > 0 || approximated {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }

    /// The volume model never knows more than the envelope
    pub fn for_volume(has_warnings: bool) -> Self {
        if has_warnings {
            Confidence::Low
        } else {
            Confidence::Medium
        }
    }
}

/// Minutes per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub roughing: f64,
    pub finishing: f64,
    pub setup: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTime {
    /// Position in the request's feature list
    pub index: usize,
    #[serde(rename = "type")]
    pub feature_type: FeatureKind,
    pub detail: String,
    pub count: u32,
    /// All pieces, constraint multiplier included
    pub time_seconds: f64,
    pub multiplier: f64,
    pub method_description: String,
}

/// Outcome of one estimation. Built once by the estimator and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub part_id: String,
    pub model: ModelKind,
    pub total_time_minutes: f64,
    pub breakdown: Breakdown,
    pub per_feature_times: Vec<FeatureTime>,
    pub constraints_applied: Vec<Constraint>,
    pub warnings: Vec<Warning>,
    pub confidence: Confidence,
    pub material_code: String,
    pub mode: Mode,
    /// SHA-256 over request, catalog and configuration
    pub input_hash: String,
}

impl EstimationResult {
    pub fn is_constrained(&self) -> bool {
        !self.constraints_applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_confidence() {
        assert_eq!(Confidence::for_features(0, 0, false), Confidence::Low);
        assert_eq!(Confidence::for_features(4, 0, false), Confidence::High);
        assert_eq!(Confidence::for_features(4, 0, true), Confidence::Medium);
        assert_eq!(Confidence::for_features(4, 1, false), Confidence::Medium);
        assert_eq!(Confidence::for_features(4, 2, false), Confidence::Low);
    }

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
    }
}
