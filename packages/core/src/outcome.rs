//! Mapping of a winning class and its probability to user-facing buckets.

use crate::classes::ClassLabel;
use serde::{Deserialize, Serialize};

/// Minimum winning probability for [`ConfidenceTier::High`].
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Minimum winning probability for [`ConfidenceTier::Medium`].
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.60;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE_THRESHOLD {
            ConfidenceTier::High
        } else if confidence >= MEDIUM_CONFIDENCE_THRESHOLD {
            ConfidenceTier::Medium
        } else {
            // NaN lands here as well
            ConfidenceTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "High",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::Low => "Low",
        }
    }
}

/// How urgently the user should follow up.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyBucket {
    Healthy,
    Monitor,
    Critical,
}

impl UrgencyBucket {
    /// Only a confident answer may claim `Healthy` or `Critical`; anything
    /// less certain is downgraded to `Monitor`.
    pub fn from_outcome(label: ClassLabel, tier: ConfidenceTier) -> Self {
        match (label.is_disease(), tier) {
            (false, ConfidenceTier::High) => UrgencyBucket::Healthy,
            (true, ConfidenceTier::High) => UrgencyBucket::Critical,
            _ => UrgencyBucket::Monitor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyBucket::Healthy => "healthy",
            UrgencyBucket::Monitor => "monitor",
            UrgencyBucket::Critical => "critical",
        }
    }
}

pub fn classify(label: ClassLabel, confidence: f64) -> (ConfidenceTier, UrgencyBucket) {
    let tier = ConfidenceTier::from_confidence(confidence);
    (tier, UrgencyBucket::from_outcome(label, tier))
}
