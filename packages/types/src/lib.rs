//! Shared dependency surface for the SmartSight crates.
//!
//! Every crate in the workspace pulls its common third-party stack through
//! here so versions and feature sets stay in one place.

pub mod utils;

pub use anyhow::{Error, Result, anyhow, bail};
pub use async_trait::async_trait;
pub use base64;
pub use bytes::Bytes;
pub use chrono;
pub use futures;
pub use image;
pub use mime_guess;
pub use rand;
pub use reqwest;
pub use serde_json::Value;
pub use tokio;

pub mod json {
    pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
    pub use serde_json::{Map, from_slice, from_str, json, to_string, to_string_pretty, to_vec};
}

pub mod sync {
    pub use tokio::sync::{Mutex, RwLock};
}

/// Fresh unique identifier for records and requests.
pub fn create_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
