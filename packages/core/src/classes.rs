//! Class labels and per-class probability distributions.

use crate::error::DistributionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of classes every inference tier must produce.
pub const CLASS_COUNT: usize = 4;

/// Allowed deviation of a distribution's sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-3;

/// Eye conditions the classifier distinguishes, in model output order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassLabel {
    Cataract,
    #[serde(rename = "Diabetic Retinopathy", alias = "DiabeticRetinopathy")]
    DiabeticRetinopathy,
    Glaucoma,
    Normal,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; CLASS_COUNT] = [
        ClassLabel::Cataract,
        ClassLabel::DiabeticRetinopathy,
        ClassLabel::Glaucoma,
        ClassLabel::Normal,
    ];

    /// Position of the class in model outputs.
    pub fn index(self) -> usize {
        match self {
            ClassLabel::Cataract => 0,
            ClassLabel::DiabeticRetinopathy => 1,
            ClassLabel::Glaucoma => 2,
            ClassLabel::Normal => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name used by the remote service and shown to users.
    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Cataract => "Cataract",
            ClassLabel::DiabeticRetinopathy => "Diabetic Retinopathy",
            ClassLabel::Glaucoma => "Glaucoma",
            ClassLabel::Normal => "Normal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|label| {
            label.name().eq_ignore_ascii_case(name)
                || format!("{label:?}").eq_ignore_ascii_case(name)
        })
    }

    pub fn is_disease(self) -> bool {
        self != ClassLabel::Normal
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One probability per [`ClassLabel`], non-negative and summing to 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(try_from = "[f64; CLASS_COUNT]", into = "[f64; CLASS_COUNT]")]
pub struct ProbabilityVector([f64; CLASS_COUNT]);

impl ProbabilityVector {
    pub fn new(values: [f64; CLASS_COUNT]) -> Result<Self, DistributionError> {
        for label in ClassLabel::ALL {
            let value = values[label.index()];
            if !value.is_finite() {
                return Err(DistributionError::NonFinite {
                    label: label.name(),
                });
            }
            if value < 0.0 {
                return Err(DistributionError::Negative {
                    label: label.name(),
                    value,
                });
            }
        }

        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(DistributionError::BadSum(sum));
        }

        Ok(Self(values))
    }

    /// Equal weight on every class.
    pub fn uniform() -> Self {
        Self([1.0 / CLASS_COUNT as f64; CLASS_COUNT])
    }

    pub fn get(&self, label: ClassLabel) -> f64 {
        self.0[label.index()]
    }

    pub fn as_array(&self) -> &[f64; CLASS_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassLabel, f64)> + '_ {
        ClassLabel::ALL.into_iter().zip(self.0.iter().copied())
    }

    /// Winning class and its probability. Exact ties resolve to the lowest
    /// class index so results are reproducible.
    pub fn argmax(&self) -> (ClassLabel, f64) {
        let mut best = 0;
        for (index, value) in self.0.iter().enumerate().skip(1) {
            if *value > self.0[best] {
                best = index;
            }
        }
        (ClassLabel::ALL[best], self.0[best])
    }

    /// Classes sorted by descending probability, ties kept in class order.
    pub fn ranked(&self) -> Vec<(ClassLabel, f64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

impl TryFrom<[f64; CLASS_COUNT]> for ProbabilityVector {
    type Error = DistributionError;

    fn try_from(values: [f64; CLASS_COUNT]) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<ProbabilityVector> for [f64; CLASS_COUNT] {
    fn from(vector: ProbabilityVector) -> Self {
        vector.0
    }
}

/// Numerically stable softmax: `exp(z_i - max(z)) / sum_j exp(z_j - max(z))`.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
