//! # Screening Pipeline
//!
//! Entry point for the host app. [`Pipeline::analyze`] walks the configured
//! tiers in order and returns the first usable distribution:
//!
//! ```text
//! remote service ──fail──▶ on-device model ──fail──▶ offline fallback
//! ```
//!
//! Tiers never race; the next one starts only after the previous one gave
//! up. The offline fallback always runs last and never fails, so any
//! non-empty input produces a result.

use crate::classes::{ClassLabel, ProbabilityVector};
use crate::config::{ConfigError, PipelineConfig, Tier};
use crate::error::{
    InferenceError, InputError, ModelLoadError, PreprocessingError, RemoteError, TierError,
};
use crate::image_source::{ImagePayload, ImageSource};
use crate::local::{LocalInferenceEngine, ModelLoader, ModelStatus, UnavailableLoader};
use crate::offline::OfflinePredictor;
use crate::outcome::{HIGH_CONFIDENCE_THRESHOLD, MEDIUM_CONFIDENCE_THRESHOLD};
use crate::preprocess::Preprocessor;
use crate::remote::{Connectivity, RemoteInferenceClient, RemotePredictor};
use crate::result::{PredictionResult, PredictionSource};
use serde::{Deserialize, Serialize};
use smartsight_types::tokio;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Static description of the on-device model and the scoring rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub classes: Vec<ClassLabel>,
    pub input_size: (u32, u32),
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub status: ModelStatus,
    pub backend: Option<String>,
    pub last_error: Option<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
    remote: Arc<dyn RemotePredictor>,
    local: Arc<LocalInferenceEngine>,
    offline: OfflinePredictor,
    preprocessor: Preprocessor,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        remote: Arc<dyn RemotePredictor>,
        local: Arc<LocalInferenceEngine>,
        offline: OfflinePredictor,
    ) -> Self {
        let size = config.local.input_size;
        Self {
            preprocessor: Preprocessor::new(size, size),
            config,
            remote,
            local,
            offline,
        }
    }

    /// Wire the production tiers from configuration.
    pub fn from_config(
        config: PipelineConfig,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, ConfigError> {
        let remote = Arc::new(RemoteInferenceClient::new(
            config.remote.clone(),
            connectivity,
        )?);
        let local = Arc::new(
            LocalInferenceEngine::new(model_loader(&config))
                .with_load_timeout(config.local.load_timeout),
        );
        let offline = match config.offline_seed {
            Some(seed) => OfflinePredictor::seeded(seed),
            None => OfflinePredictor::from_entropy(),
        };
        Ok(Self::new(config, remote, local, offline))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[tracing::instrument(name = "analyze", skip(self, image), fields(image = %image.describe()))]
    pub async fn analyze(&self, image: ImageSource) -> Result<PredictionResult, InputError> {
        image.validate()?;
        let started = Instant::now();

        match image.load().await {
            Ok(payload) => {
                for tier in &self.config.tier_order {
                    match self.run_tier(*tier, &payload).await {
                        Ok(probabilities) => {
                            return Ok(self.finish(probabilities, tier.source(), started));
                        }
                        Err(e) if e.is_timeout() => {
                            tracing::warn!(
                                tier = tier.as_str(),
                                kind = e.kind(),
                                error = %e,
                                "Tier timed out, falling through"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                tier = tier.as_str(),
                                kind = e.kind(),
                                error = %e,
                                "Tier failed, falling through"
                            );
                        }
                    }
                }
            }
            Err(PreprocessingError::Empty) => return Err(InputError::EmptyData),
            Err(e) => {
                let e = TierError::from(e);
                tracing::warn!(kind = e.kind(), error = %e, "Image unreadable, skipping model tiers");
            }
        }

        tracing::info!("Using offline fallback, result is a placeholder");
        let probabilities = self.offline.predict();
        Ok(self.finish(
            probabilities,
            PredictionSource::OfflineFallback,
            started,
        ))
    }

    async fn run_tier(
        &self,
        tier: Tier,
        payload: &ImagePayload,
    ) -> Result<ProbabilityVector, TierError> {
        match tier {
            Tier::Remote => self.run_remote(payload).await,
            Tier::Local => self.run_local(payload).await,
        }
    }

    async fn run_remote(&self, payload: &ImagePayload) -> Result<ProbabilityVector, TierError> {
        let request_timeout = self.config.remote.predict_timeout;
        let overall = remote_budget(&self.config);

        match tokio::time::timeout(overall, self.remote.predict(payload, request_timeout)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(RemoteError::Timeout(overall).into()),
        }
    }

    async fn run_local(&self, payload: &ImagePayload) -> Result<ProbabilityVector, TierError> {
        let preprocessor = self.preprocessor.clone();
        let bytes = payload.bytes.clone();
        let tensor = tokio::task::spawn_blocking(move || preprocessor.preprocess(&bytes))
            .await
            .map_err(|e| InferenceError::Runtime(e.to_string()))??;

        self.local.ensure_loaded().await?;
        Ok(self.local.infer(tensor).await?)
    }

    fn finish(
        &self,
        probabilities: ProbabilityVector,
        source: PredictionSource,
        started: Instant,
    ) -> PredictionResult {
        let result = PredictionResult::from_probabilities(probabilities, source, started.elapsed());
        tracing::info!(
            source = %result.source(),
            label = %result.label(),
            score = result.score(),
            confidence = result.confidence().as_str(),
            urgency = result.urgency().as_str(),
            elapsed_ms = (result.processing_time().as_millis() as u64),
            "Analysis complete"
        );
        result
    }

    /// Load the on-device model ahead of the first request.
    pub async fn warm_up(&self) -> Result<(), ModelLoadError> {
        self.local.ensure_loaded().await
    }

    pub fn model_status(&self) -> ModelStatus {
        self.local.status()
    }

    pub fn release_model(&self) {
        self.local.release();
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            version: self.config.local.model_version.clone(),
            classes: ClassLabel::ALL.to_vec(),
            input_size: self.preprocessor.input_size(),
            high_threshold: HIGH_CONFIDENCE_THRESHOLD,
            medium_threshold: MEDIUM_CONFIDENCE_THRESHOLD,
            status: self.local.status(),
            backend: self.local.backend(),
            last_error: self.local.last_error().map(|e| e.to_string()),
        }
    }

    pub async fn check_remote_health(&self) -> bool {
        self.remote.check_health().await
    }
}

#[cfg(feature = "local-ml")]
fn model_loader(config: &PipelineConfig) -> Arc<dyn ModelLoader> {
    use crate::local::onnx::OnnxModelLoader;

    match &config.local.model_path {
        Some(path) => Arc::new(OnnxModelLoader::new(
            path.clone(),
            config.local.input_size,
            config.local.input_size,
        )),
        None => Arc::new(UnavailableLoader::new("no model path configured")),
    }
}

#[cfg(not(feature = "local-ml"))]
fn model_loader(_config: &PipelineConfig) -> Arc<dyn ModelLoader> {
    Arc::new(UnavailableLoader::new("built without the local-ml feature"))
}

/// Overall time allowed for the remote tier, health probe included.
pub fn remote_budget(config: &PipelineConfig) -> Duration {
    if config.remote.health_probe {
        config.remote.health_timeout + config.remote.predict_timeout
    } else {
        config.remote.predict_timeout
    }
}
