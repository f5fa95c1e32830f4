//! # On-Device Inference
//!
//! [`LocalInferenceEngine`] owns the model session for the whole process.
//! The session is created lazily on first use and then shared by every
//! request.
//!
//! ```text
//! Unloaded ──ensure_loaded──▶ Loading ──ok──▶ Ready
//!     ▲                          │
//!     │                          └──err──▶ LoadFailed ──next call──▶ Loading
//!     └──────────── release ─────────────────────────────────────────────┘
//! ```
//!
//! Callers that arrive while a load is running await the same attempt
//! instead of starting a second one.

/// Execution Provider configuration with graceful fallback
pub mod execution_providers;
/// ONNX Runtime backed model session
#[cfg(feature = "local-ml")]
pub mod onnx;

use crate::classes::{CLASS_COUNT, ProbabilityVector, softmax};
use crate::error::{InferenceError, ModelLoadError};
use crate::preprocess::ImageTensor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smartsight_types::futures::future::{BoxFuture, FutureExt, Shared};
use smartsight_types::{async_trait, tokio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default upper bound for reading and initializing the model
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A loaded model that maps an input tensor to raw class logits.
///
/// Implementations must be safe to call from several threads at once.
pub trait ModelRuntime: Send + Sync {
    fn run(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>;

    /// Human readable backend name for logs and model info
    fn backend(&self) -> String {
        "unknown".to_string()
    }
}

/// Produces a [`ModelRuntime`] from a model artifact.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ModelRuntime>, ModelLoadError>;
}

/// Loader used when no on-device model can be offered, e.g. the crate was
/// built without `local-ml` or no artifact is configured.
pub struct UnavailableLoader {
    reason: String,
}

impl UnavailableLoader {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for UnavailableLoader {
    async fn load(&self) -> Result<Arc<dyn ModelRuntime>, ModelLoadError> {
        Err(ModelLoadError::Unavailable(self.reason.clone()))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    LoadFailed,
}

type LoadOutcome = Result<Arc<dyn ModelRuntime>, ModelLoadError>;
type LoadFuture = Shared<BoxFuture<'static, LoadOutcome>>;

enum SessionState {
    Unloaded,
    Loading { attempt: u64, future: LoadFuture },
    Ready(Arc<dyn ModelRuntime>),
    LoadFailed(ModelLoadError),
}

pub struct LocalInferenceEngine {
    loader: Arc<dyn ModelLoader>,
    load_timeout: Duration,
    state: Mutex<SessionState>,
    attempts: AtomicU64,
}

impl LocalInferenceEngine {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            state: Mutex::new(SessionState::Unloaded),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.state.lock() {
            SessionState::Unloaded => ModelStatus::Unloaded,
            SessionState::Loading { .. } => ModelStatus::Loading,
            SessionState::Ready(_) => ModelStatus::Ready,
            SessionState::LoadFailed(_) => ModelStatus::LoadFailed,
        }
    }

    /// Error of the last failed load, if the engine is in `LoadFailed`.
    pub fn last_error(&self) -> Option<ModelLoadError> {
        match &*self.state.lock() {
            SessionState::LoadFailed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Backend name of the loaded session.
    pub fn backend(&self) -> Option<String> {
        match &*self.state.lock() {
            SessionState::Ready(runtime) => Some(runtime.backend()),
            _ => None,
        }
    }

    pub async fn ensure_loaded(&self) -> Result<(), ModelLoadError> {
        self.session().await.map(|_| ())
    }

    async fn session(&self) -> LoadOutcome {
        let (attempt, future) = {
            let mut state = self.state.lock();
            match &*state {
                SessionState::Ready(runtime) => return Ok(runtime.clone()),
                SessionState::Loading { attempt, future } => (*attempt, future.clone()),
                SessionState::Unloaded | SessionState::LoadFailed(_) => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.load_future(attempt);
                    *state = SessionState::Loading {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        // A release() during the load supersedes this attempt
        let mut state = self.state.lock();
        if matches!(&*state, SessionState::Loading { attempt: current, .. } if *current == attempt)
        {
            *state = match &outcome {
                Ok(runtime) => SessionState::Ready(runtime.clone()),
                Err(e) => SessionState::LoadFailed(e.clone()),
            };
        }
        outcome
    }

    fn load_future(&self, attempt: u64) -> LoadFuture {
        let loader = self.loader.clone();
        let timeout = self.load_timeout;
        async move {
            tracing::info!(attempt, "Loading local model session");
            let outcome = match tokio::time::timeout(timeout, loader.load()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ModelLoadError::Timeout(timeout)),
            };
            match &outcome {
                Ok(runtime) => {
                    tracing::info!(attempt, backend = %runtime.backend(), "Local model ready")
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Local model failed to load"),
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Run the loaded model on one tensor and return class probabilities.
    pub async fn infer(&self, tensor: ImageTensor) -> Result<ProbabilityVector, InferenceError> {
        let runtime = match &*self.state.lock() {
            SessionState::Ready(runtime) => runtime.clone(),
            _ => return Err(InferenceError::NotLoaded),
        };

        let logits = tokio::task::spawn_blocking(move || runtime.run(tensor))
            .await
            .map_err(|e| InferenceError::Runtime(e.to_string()))??;

        probabilities_from_logits(&logits)
    }

    /// Drop the session. The next request loads it again.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, SessionState::Ready(_)) {
            tracing::info!("Releasing local model session");
        }
        *state = SessionState::Unloaded;
    }
}

/// Validate raw model output and convert it to a distribution.
pub fn probabilities_from_logits(logits: &[f32]) -> Result<ProbabilityVector, InferenceError> {
    if logits.len() != CLASS_COUNT {
        return Err(InferenceError::WrongLength {
            expected: CLASS_COUNT,
            actual: logits.len(),
        });
    }
    if logits.iter().any(|z| !z.is_finite()) {
        return Err(InferenceError::NonFinite);
    }
    if logits.iter().all(|z| *z == 0.0) {
        return Err(InferenceError::AllZero);
    }

    let widened: Vec<f64> = logits.iter().map(|z| *z as f64).collect();
    let probs = softmax(&widened);
    let mut values = [0.0; CLASS_COUNT];
    values.copy_from_slice(&probs);
    ProbabilityVector::new(values).map_err(|e| InferenceError::Runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::ClassLabel;
    use crate::preprocess::Preprocessor;
    use smartsight_types::image::{DynamicImage, RgbImage};
    use std::sync::atomic::AtomicUsize;

    struct FixedRuntime(Vec<f32>);

    impl ModelRuntime for FixedRuntime {
        fn run(&self, _tensor: ImageTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }

        fn backend(&self) -> String {
            "fixed".to_string()
        }
    }

    struct CountingLoader {
        calls: AtomicUsize,
        fail_first: usize,
        delay: Duration,
        logits: Vec<f32>,
    }

    impl CountingLoader {
        fn new(logits: Vec<f32>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
                logits,
            }
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn ModelRuntime>, ModelLoadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.fail_first {
                return Err(ModelLoadError::Corrupt("truncated".into()));
            }
            Ok(Arc::new(FixedRuntime(self.logits.clone())))
        }
    }

    fn tensor() -> ImageTensor {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        Preprocessor::new(4, 4).preprocess_image(&image).unwrap()
    }

    #[test]
    fn test_logits_validation() {
        assert_eq!(
            probabilities_from_logits(&[1.0, 2.0, 3.0]),
            Err(InferenceError::WrongLength {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(
            probabilities_from_logits(&[1.0, f32::NAN, 0.0, 0.0]),
            Err(InferenceError::NonFinite)
        );
        assert_eq!(
            probabilities_from_logits(&[0.0, 0.0, 0.0, 0.0]),
            Err(InferenceError::AllZero)
        );
    }

    #[test]
    fn test_reference_logits() {
        let probs = probabilities_from_logits(&[2.0, 1.0, 0.1, 0.1]).unwrap();
        let (label, score) = probs.argmax();
        assert_eq!(label, ClassLabel::Cataract);
        assert!((score - 0.59987).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_infer_requires_loaded_session() {
        let engine = LocalInferenceEngine::new(Arc::new(CountingLoader::new(vec![0.0, 0.0, 0.0, 1.0])));
        assert_eq!(engine.status(), ModelStatus::Unloaded);
        assert_eq!(engine.infer(tensor()).await, Err(InferenceError::NotLoaded));

        engine.ensure_loaded().await.unwrap();
        assert_eq!(engine.status(), ModelStatus::Ready);
        assert_eq!(engine.backend().as_deref(), Some("fixed"));

        let probs = engine.infer(tensor()).await.unwrap();
        assert_eq!(probs.argmax().0, ClassLabel::Normal);
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let mut loader = CountingLoader::new(vec![1.0, 0.0, 0.0, 0.0]);
        loader.delay = Duration::from_millis(50);
        let loader = Arc::new(loader);
        let engine = Arc::new(LocalInferenceEngine::new(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.ensure_loaded().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.status(), ModelStatus::Ready);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_on_next_call() {
        let mut loader = CountingLoader::new(vec![1.0, 0.0, 0.0, 0.0]);
        loader.fail_first = 1;
        let loader = Arc::new(loader);
        let engine = LocalInferenceEngine::new(loader.clone());

        assert!(matches!(
            engine.ensure_loaded().await,
            Err(ModelLoadError::Corrupt(_))
        ));
        assert_eq!(engine.status(), ModelStatus::LoadFailed);
        assert!(engine.last_error().is_some());

        engine.ensure_loaded().await.unwrap();
        assert_eq!(engine.status(), ModelStatus::Ready);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_timeout() {
        let mut loader = CountingLoader::new(vec![1.0, 0.0, 0.0, 0.0]);
        loader.delay = Duration::from_secs(5);
        let engine = LocalInferenceEngine::new(Arc::new(loader))
            .with_load_timeout(Duration::from_millis(20));

        assert_eq!(
            engine.ensure_loaded().await,
            Err(ModelLoadError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(engine.status(), ModelStatus::LoadFailed);
    }

    #[tokio::test]
    async fn test_release_returns_to_unloaded() {
        let loader = Arc::new(CountingLoader::new(vec![1.0, 0.0, 0.0, 0.0]));
        let engine = LocalInferenceEngine::new(loader.clone());
        engine.ensure_loaded().await.unwrap();

        engine.release();
        assert_eq!(engine.status(), ModelStatus::Unloaded);
        assert_eq!(engine.infer(tensor()).await, Err(InferenceError::NotLoaded));

        engine.ensure_loaded().await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_loader() {
        let engine = LocalInferenceEngine::new(Arc::new(UnavailableLoader::new("no model")));
        assert_eq!(
            engine.ensure_loaded().await,
            Err(ModelLoadError::Unavailable("no model".into()))
        );
    }
}
