use crate::classes::{ClassLabel, ProbabilityVector};
use crate::outcome::{ConfidenceTier, UrgencyBucket, classify};
use serde::{Deserialize, Serialize};
use smartsight_types::chrono::{DateTime, Utc};
use smartsight_types::create_id;
use std::fmt;
use std::time::Duration;

/// Which tier produced a prediction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    LocalModel,
    RemoteService,
    OfflineFallback,
}

impl PredictionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictionSource::LocalModel => "local_model",
            PredictionSource::RemoteService => "remote_service",
            PredictionSource::OfflineFallback => "offline_fallback",
        }
    }

    /// Offline results are placeholders and must be rendered as such.
    pub fn is_synthetic(self) -> bool {
        self == PredictionSource::OfflineFallback
    }
}

impl fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one analysis.
///
/// Label, score, confidence tier and urgency are always derived from the
/// probabilities. Deserializing recomputes them, so a stored record can never
/// disagree with its own distribution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "StoredPrediction")]
pub struct PredictionResult {
    id: String,
    label: ClassLabel,
    score: f64,
    probabilities: ProbabilityVector,
    confidence: ConfidenceTier,
    source: PredictionSource,
    urgency: UrgencyBucket,
    produced_at: DateTime<Utc>,
    processing_time_ms: u64,
}

impl PredictionResult {
    pub fn from_probabilities(
        probabilities: ProbabilityVector,
        source: PredictionSource,
        processing_time: Duration,
    ) -> Self {
        Self::assemble(
            create_id(),
            probabilities,
            source,
            Utc::now(),
            processing_time.as_millis().min(u64::MAX as u128) as u64,
        )
    }

    fn assemble(
        id: String,
        probabilities: ProbabilityVector,
        source: PredictionSource,
        produced_at: DateTime<Utc>,
        processing_time_ms: u64,
    ) -> Self {
        let (label, score) = probabilities.argmax();
        let (confidence, urgency) = classify(label, score);
        Self {
            id,
            label,
            score,
            probabilities,
            confidence,
            source,
            urgency,
            produced_at,
            processing_time_ms,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> ClassLabel {
        self.label
    }

    /// Probability of the winning class.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn probabilities(&self) -> &ProbabilityVector {
        &self.probabilities
    }

    pub fn confidence(&self) -> ConfidenceTier {
        self.confidence
    }

    pub fn source(&self) -> PredictionSource {
        self.source
    }

    pub fn urgency(&self) -> UrgencyBucket {
        self.urgency
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn processing_time(&self) -> Duration {
        Duration::from_millis(self.processing_time_ms)
    }
}

#[derive(Deserialize)]
struct StoredPrediction {
    id: String,
    probabilities: ProbabilityVector,
    source: PredictionSource,
    produced_at: DateTime<Utc>,
    #[serde(default)]
    processing_time_ms: u64,
}

impl From<StoredPrediction> for PredictionResult {
    fn from(stored: StoredPrediction) -> Self {
        Self::assemble(
            stored.id,
            stored.probabilities,
            stored.source,
            stored.produced_at,
            stored.processing_time_ms,
        )
    }
}
