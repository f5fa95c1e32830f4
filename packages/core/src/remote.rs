//! # Remote Prediction Service
//!
//! HTTP client for the hosted classifier:
//!
//! - `GET /health` answers 200 when the service is up
//! - `GET /` returns service metadata
//! - `POST /predict` takes a multipart upload (field `file`) and answers with
//!   the predicted class and the full distribution
//!
//! The hosted service sleeps when idle, so the health probe only informs
//! logging. The upload is always attempted.

use crate::classes::{CLASS_COUNT, ClassLabel, ProbabilityVector};
use crate::config::{ConfigError, RemoteConfig};
use crate::error::RemoteError;
use crate::image_source::ImagePayload;
use serde::Deserialize;
use smartsight_types::reqwest::{
    self, Client,
    multipart::{Form, Part},
};
use smartsight_types::{Value, async_trait, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Local signal telling whether the device has a network connection.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Connectivity flag the host flips from its platform network callback.
#[derive(Debug)]
pub struct NetworkStatus {
    connected: AtomicBool,
}

impl NetworkStatus {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            tracing::info!(connected, "Network connectivity changed");
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkStatus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// For hosts without a connectivity signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait RemotePredictor: Send + Sync {
    /// Whether the service reports itself healthy right now.
    async fn check_health(&self) -> bool;

    async fn predict(
        &self,
        payload: &ImagePayload,
        timeout: Duration,
    ) -> Result<ProbabilityVector, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: String,
    confidence: f64,
    #[serde(default)]
    confidence_level: Option<String>,
    all_probabilities: ClassProbabilities,
}

#[derive(Debug, Deserialize)]
struct ClassProbabilities {
    #[serde(rename = "Cataract")]
    cataract: f64,
    #[serde(rename = "Diabetic Retinopathy")]
    diabetic_retinopathy: f64,
    #[serde(rename = "Glaucoma")]
    glaucoma: f64,
    #[serde(rename = "Normal")]
    normal: f64,
}

impl ClassProbabilities {
    fn into_array(self) -> [f64; CLASS_COUNT] {
        [
            self.cataract,
            self.diabetic_retinopathy,
            self.glaucoma,
            self.normal,
        ]
    }
}

/// Validate a `/predict` response body and extract its distribution.
///
/// The reported label must name a known class, but the label used
/// downstream is always recomputed from the probabilities.
pub fn parse_prediction(body: &[u8]) -> Result<ProbabilityVector, RemoteError> {
    let response: PredictResponse =
        json::from_slice(body).map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

    let reported = ClassLabel::from_name(&response.prediction).ok_or_else(|| {
        RemoteError::MalformedResponse(format!("unknown class '{}'", response.prediction))
    })?;
    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(RemoteError::MalformedResponse(format!(
            "confidence {} out of range",
            response.confidence
        )));
    }

    let probabilities = ProbabilityVector::new(response.all_probabilities.into_array())
        .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

    let (label, _) = probabilities.argmax();
    if label != reported {
        tracing::debug!(
            reported = %reported,
            recomputed = %label,
            "Remote label disagrees with its distribution"
        );
    }
    if let Some(level) = &response.confidence_level {
        tracing::debug!(level = %level, "Remote confidence level");
    }

    Ok(probabilities)
}

pub struct RemoteInferenceClient {
    config: RemoteConfig,
    client: Client,
    connectivity: Arc<dyn Connectivity>,
}

impl RemoteInferenceClient {
    pub fn new(
        config: RemoteConfig,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .user_agent(concat!("smartsight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            config,
            client,
            connectivity,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Service metadata from `GET /`.
    pub async fn service_info(&self) -> Result<Value, RemoteError> {
        if !self.connectivity.is_connected() {
            return Err(RemoteError::Offline);
        }
        let timeout = self.config.health_timeout;
        let response = self
            .client
            .get(self.config.endpoint("/"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(RemoteError::HttpError(response.status().as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        json::from_slice(&body).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl RemotePredictor for RemoteInferenceClient {
    /// `true` only for a 200 on `/health` within the health timeout.
    async fn check_health(&self) -> bool {
        if !self.connectivity.is_connected() {
            return false;
        }
        let url = self.config.endpoint("/health");
        match self
            .client
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                tracing::debug!(url = %url, "Remote health check passed");
                true
            }
            Ok(response) => {
                tracing::warn!(url = %url, status = response.status().as_u16(), "Remote health check returned bad status");
                false
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(url = %url, "Remote health check timed out, service may be sleeping");
                false
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Remote health check failed");
                false
            }
        }
    }

    #[tracing::instrument(
        name = "remote_predict",
        skip(self, payload),
        fields(file = %payload.file_name, bytes = payload.bytes.len())
    )]
    async fn predict(
        &self,
        payload: &ImagePayload,
        timeout: Duration,
    ) -> Result<ProbabilityVector, RemoteError> {
        if !self.connectivity.is_connected() {
            tracing::info!("No network connection, skipping remote service");
            return Err(RemoteError::Offline);
        }

        if self.config.health_probe && !self.check_health().await {
            tracing::info!("Remote service not healthy, attempting upload anyway");
        }

        let part = Part::bytes(payload.bytes.to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime)
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let form = Form::new().part("file", part);

        let url = self.config.endpoint("/predict");
        tracing::debug!(url = %url, mime = %payload.mime, "Uploading image");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %error_text, "Remote prediction failed");
            return Err(RemoteError::HttpError(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        parse_prediction(&body)
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout(timeout)
    } else {
        RemoteError::Network(error.to_string())
    }
}
