use smartsight::history::DEFAULT_HISTORY_LIMIT;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_HISTORY_PATH: &str = ".smartsight/history.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub history_path: PathBuf,
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            history_path: env::var("SMARTSIGHT_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_HISTORY_PATH)),
            history_limit: match env::var("SMARTSIGHT_HISTORY_LIMIT") {
                Ok(raw) => raw
                    .trim()
                    .parse()
                    .ok()
                    .filter(|limit: &usize| *limit > 0)
                    .ok_or_else(|| ConfigError::InvalidValue("SMARTSIGHT_HISTORY_LIMIT".to_string()))?,
                Err(_) => DEFAULT_HISTORY_LIMIT,
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for: {0}")]
    InvalidValue(String),
}
