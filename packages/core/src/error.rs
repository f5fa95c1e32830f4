//! Error taxonomy of the screening pipeline.
//!
//! Only [`InputError`] ever reaches the caller of
//! [`Pipeline::analyze`](crate::pipeline::Pipeline::analyze). Everything else
//! is recovered inside the pipeline by falling through to the next tier and
//! is surfaced through tracing only.

use smartsight_types::image::ImageError;
use smartsight_types::utils::data_url::DataUrlError;
use std::time::Duration;
use thiserror::Error;

/// The caller did not hand over anything to analyze.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no image reference supplied")]
    EmptyReference,

    #[error("image data is empty")]
    EmptyData,
}

/// The image could not be read, decoded or resized.
#[derive(Debug, Error)]
pub enum PreprocessingError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported image reference: {0}")]
    UnsupportedReference(String),

    #[error("invalid data URL: {0}")]
    DataUrl(#[from] DataUrlError),

    #[error("failed to decode image: {0}")]
    Decode(#[from] ImageError),

    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("image data is empty")]
    Empty,
}

/// The local model artifact could not be turned into a usable session.
///
/// Cloneable because every caller coalesced onto one load attempt receives
/// the same outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("model artifact not found: {path}")]
    NotFound { path: String },

    #[error("failed to read model artifact: {0}")]
    Io(String),

    #[error("model artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("model input shape {actual:?} does not match expected {expected:?}")]
    IncompatibleShape { expected: [i64; 4], actual: Vec<i64> },

    #[error("model load timed out after {0:?}")]
    Timeout(Duration),

    #[error("local inference unavailable: {0}")]
    Unavailable(String),
}

/// The model ran but its output cannot be read as a class distribution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("model session is not loaded")]
    NotLoaded,

    #[error("expected {expected} logits, model produced {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("model output contains non-finite values")]
    NonFinite,

    #[error("model output is all zeros")]
    AllZero,

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Failure of the remote prediction service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("device is offline")]
    Offline,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service answered with HTTP {0}")]
    HttpError(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout(_))
    }
}

/// Probabilities that violate the distribution invariant.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistributionError {
    #[error("probability for {label} is not finite")]
    NonFinite { label: &'static str },

    #[error("probability for {label} is negative ({value})")]
    Negative { label: &'static str, value: f64 },

    #[error("probabilities sum to {0}, expected 1")]
    BadSum(f64),
}

/// Any recoverable failure of a model tier.
#[derive(Debug, Error)]
pub enum TierError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl TierError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TierError::Remote(RemoteError::Timeout(_))
                | TierError::ModelLoad(ModelLoadError::Timeout(_))
        )
    }

    /// Short machine-friendly category for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TierError::Remote(RemoteError::Offline) => "offline",
            TierError::Remote(RemoteError::Timeout(_)) => "timeout",
            TierError::Remote(RemoteError::HttpError(_)) => "http",
            TierError::Remote(RemoteError::Network(_)) => "network",
            TierError::Remote(RemoteError::MalformedResponse(_)) => "malformed_response",
            TierError::Preprocessing(_) => "preprocessing",
            TierError::ModelLoad(ModelLoadError::Timeout(_)) => "timeout",
            TierError::ModelLoad(_) => "model_load",
            TierError::Inference(_) => "inference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_share_a_log_kind() {
        let remote = TierError::from(RemoteError::Timeout(Duration::from_secs(8)));
        let load = TierError::from(ModelLoadError::Timeout(Duration::from_secs(30)));
        for e in [remote, load] {
            assert!(e.is_timeout());
            assert_eq!(e.kind(), "timeout");
        }

        let offline = TierError::from(RemoteError::Offline);
        assert!(!offline.is_timeout());
        assert_eq!(offline.kind(), "offline");
        assert_eq!(TierError::from(PreprocessingError::Empty).kind(), "preprocessing");
    }
}
