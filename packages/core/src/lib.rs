//! SmartSight eye screening pipeline.
//!
//! Turns a captured eye image into a confidence-scored [`PredictionResult`]
//! using the remote service, the on-device model or the offline fallback,
//! whichever answers first.

pub mod classes;
pub mod config;
pub mod error;
pub mod history;
pub mod image_source;
pub mod local;
pub mod offline;
pub mod outcome;
pub mod pipeline;
pub mod preprocess;
pub mod remote;
pub mod result;

pub use smartsight_types;

pub use classes::{ClassLabel, ProbabilityVector, softmax};
pub use config::{ConfigError, LocalModelConfig, PipelineConfig, RemoteConfig, Tier};
pub use error::{InputError, TierError};
pub use history::{HistoryRecord, HistoryStatistics, HistoryStore};
pub use image_source::ImageSource;
pub use local::execution_providers::initialize_ort;
pub use local::{LocalInferenceEngine, ModelStatus};
pub use offline::OfflinePredictor;
pub use outcome::{ConfidenceTier, UrgencyBucket, classify};
pub use pipeline::{ModelInfo, Pipeline};
pub use remote::{AlwaysOnline, Connectivity, NetworkStatus, RemoteInferenceClient};
pub use result::{PredictionResult, PredictionSource};
