/// # Offline Fallback
/// Placeholder distribution used when neither the service nor the on-device
/// model can answer. Results from here are tagged `OfflineFallback` and carry
/// no diagnostic meaning.
use crate::classes::{CLASS_COUNT, ProbabilityVector};
use parking_lot::Mutex;
use smartsight_types::rand::{Rng, SeedableRng, rngs::StdRng};

/// Source of uniform draws in `[0, 1)`.
pub trait UniformSource: Send {
    fn next_unit(&mut self) -> f64;
}

impl UniformSource for StdRng {
    fn next_unit(&mut self) -> f64 {
        self.random::<f64>()
    }
}

pub struct OfflinePredictor {
    source: Mutex<Box<dyn UniformSource>>,
}

impl OfflinePredictor {
    pub fn new(source: Box<dyn UniformSource>) -> Self {
        Self {
            source: Mutex::new(source),
        }
    }

    /// Reproducible output for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn from_entropy() -> Self {
        Self::new(Box::new(StdRng::from_os_rng()))
    }

    /// Never fails.
    pub fn predict(&self) -> ProbabilityVector {
        let mut draws = [0.0; CLASS_COUNT];
        {
            let mut source = self.source.lock();
            for draw in draws.iter_mut() {
                *draw = source.next_unit();
            }
        }
        normalize_draws(draws)
    }
}

/// Scale raw draws to sum to 1. Degenerate draws give the uniform
/// distribution.
pub fn normalize_draws(draws: [f64; CLASS_COUNT]) -> ProbabilityVector {
    if draws.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return ProbabilityVector::uniform();
    }
    let sum: f64 = draws.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return ProbabilityVector::uniform();
    }
    ProbabilityVector::new(draws.map(|d| d / sum)).unwrap_or_else(|_| ProbabilityVector::uniform())
}
