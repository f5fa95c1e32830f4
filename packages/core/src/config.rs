use crate::local::DEFAULT_LOAD_TIMEOUT;
use crate::preprocess::DEFAULT_INPUT_SIZE;
use crate::result::PredictionSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://smartsight-backend.onrender.com";
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MODEL_VERSION: &str = "EfficientNet-B2-v1.0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: String, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Settings of the remote prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub health_timeout: Duration,
    pub predict_timeout: Duration,
    /// Probe `GET /health` before uploading. The outcome is only logged.
    pub health_probe: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            predict_timeout: DEFAULT_PREDICT_TIMEOUT,
            health_probe: true,
        }
    }
}

impl RemoteConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_predict_timeout(mut self, timeout: Duration) -> Self {
        self.predict_timeout = timeout;
        self
    }

    pub fn with_health_probe(mut self, enabled: bool) -> Self {
        self.health_probe = enabled;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Settings of the on-device model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// `None` disables the local tier
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub load_timeout: Duration,
    pub model_version: String,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
        }
    }
}

impl LocalModelConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }
}

/// A model tier the pipeline may try before the offline fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Remote,
    Local,
}

impl Tier {
    pub fn source(self) -> PredictionSource {
        match self {
            Tier::Remote => PredictionSource::RemoteService,
            Tier::Local => PredictionSource::LocalModel,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Remote => "remote",
            Tier::Local => "local",
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "server" | "api" => Ok(Tier::Remote),
            "local" | "onnx" | "device" => Ok(Tier::Local),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Parse a comma separated tier list. Duplicates are dropped, `offline`
/// is accepted and ignored since the fallback always runs last.
pub fn parse_tier_order(value: &str) -> Result<Vec<Tier>, String> {
    let mut order = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("offline") {
            continue;
        }
        let tier = part.parse::<Tier>()?;
        if !order.contains(&tier) {
            order.push(tier);
        }
    }
    Ok(order)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub remote: RemoteConfig,
    pub local: LocalModelConfig,
    pub tier_order: Vec<Tier>,
    /// Fixed seed for the offline fallback, mostly for tests and demos
    pub offline_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            local: LocalModelConfig::default(),
            tier_order: vec![Tier::Remote, Tier::Local],
            offline_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_local(mut self, local: LocalModelConfig) -> Self {
        self.local = local;
        self
    }

    pub fn with_tier_order(mut self, order: Vec<Tier>) -> Self {
        self.tier_order = order;
        self
    }

    pub fn with_offline_seed(mut self, seed: u64) -> Self {
        self.offline_seed = Some(seed);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unset keys
    /// keep their defaults, set but unparseable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SMARTSIGHT_API_URL") {
            config.remote = config.remote.with_base_url(url.trim());
        }
        if let Some(secs) = parse_var::<u64>(&get, "SMARTSIGHT_HEALTH_TIMEOUT_SECS")? {
            config.remote.health_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "SMARTSIGHT_PREDICT_TIMEOUT_SECS")? {
            config.remote.predict_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("SMARTSIGHT_HEALTH_PROBE") {
            config.remote.health_probe = parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                var: "SMARTSIGHT_HEALTH_PROBE".to_string(),
                value: raw,
            })?;
        }

        if let Some(path) = get("SMARTSIGHT_MODEL_PATH") {
            config.local.model_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(size) = parse_var::<u32>(&get, "SMARTSIGHT_MODEL_INPUT_SIZE")? {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "SMARTSIGHT_MODEL_INPUT_SIZE".to_string(),
                    value: size.to_string(),
                });
            }
            config.local.input_size = size;
        }
        if let Some(secs) = parse_var::<u64>(&get, "SMARTSIGHT_MODEL_LOAD_TIMEOUT_SECS")? {
            config.local.load_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = get("SMARTSIGHT_TIER_ORDER") {
            config.tier_order =
                parse_tier_order(&raw).map_err(|_| ConfigError::InvalidValue {
                    var: "SMARTSIGHT_TIER_ORDER".to_string(),
                    value: raw.clone(),
                })?;
        }
        config.offline_seed = parse_var::<u64>(&get, "SMARTSIGHT_OFFLINE_SEED")?;

        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match get(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
