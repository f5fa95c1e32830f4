//! Persistent analysis history.
//!
//! Records live in one JSON array on disk, newest first, capped at
//! [`DEFAULT_HISTORY_LIMIT`] entries. A corrupt file reads as an empty
//! history rather than blocking new analyses.

use crate::outcome::UrgencyBucket;
use crate::result::PredictionResult;
use serde::{Deserialize, Serialize};
use smartsight_types::chrono::{DateTime, Utc};
use smartsight_types::sync::Mutex;
use smartsight_types::{json, tokio};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode history: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub result: PredictionResult,
    /// Where the analyzed image came from, never inline image data
    pub image_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(result: PredictionResult, image_uri: impl Into<String>) -> Self {
        Self {
            result,
            image_uri: image_uri.into(),
            notes: None,
            saved_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn id(&self) -> &str {
        self.result.id()
    }
}

/// Counts of the stored records per urgency bucket.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HistoryStatistics {
    pub total: usize,
    pub healthy: usize,
    pub monitor: usize,
    pub critical: usize,
    /// When the newest stored analysis was produced
    pub last_analysis: Option<DateTime<Utc>>,
}

impl HistoryStatistics {
    fn from_records(records: &[HistoryRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            last_analysis: records.first().map(|r| r.result.produced_at()),
            ..Self::default()
        };
        for record in records {
            match record.result.urgency() {
                UrgencyBucket::Healthy => stats.healthy += 1,
                UrgencyBucket::Monitor => stats.monitor += 1,
                UrgencyBucket::Critical => stats.critical += 1,
            }
        }
        stats
    }
}

pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_HISTORY_LIMIT,
            lock: Mutex::new(()),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend a record, dropping the oldest entries beyond the limit.
    pub async fn save(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        records.retain(|r| r.id() != record.id());
        records.insert(0, record);
        records.truncate(self.limit);
        self.write(&records).await?;
        tracing::debug!(count = records.len(), "Saved analysis to history");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.into_iter().find(|r| r.id() == id))
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records).await?;
        Ok(true)
    }

    pub async fn statistics(&self) -> Result<HistoryStatistics, HistoryError> {
        let _guard = self.lock.lock().await;
        Ok(HistoryStatistics::from_records(&self.read().await?))
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        match json::from_slice::<Vec<HistoryRecord>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "History file unreadable, starting fresh");
                Ok(Vec::new())
            }
        }
    }

    async fn write(&self, records: &[HistoryRecord]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = json::to_vec(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::ProbabilityVector;
    use crate::result::PredictionSource;
    use std::time::Duration;

    fn record(uri: &str) -> HistoryRecord {
        record_with(uri, [0.1, 0.1, 0.1, 0.7])
    }

    fn record_with(uri: &str, probs: [f64; 4]) -> HistoryRecord {
        let result = PredictionResult::from_probabilities(
            ProbabilityVector::new(probs).unwrap(),
            PredictionSource::LocalModel,
            Duration::from_millis(12),
        );
        HistoryRecord::new(result, uri)
    }

    #[tokio::test]
    async fn test_statistics_count_by_urgency() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert_eq!(
            store.statistics().await.unwrap(),
            HistoryStatistics::default()
        );

        store
            .save(record_with("healthy.jpg", [0.02, 0.02, 0.02, 0.94]))
            .await
            .unwrap();
        store
            .save(record_with("cataract.jpg", [0.9, 0.05, 0.03, 0.02]))
            .await
            .unwrap();
        store.save(record("unsure.jpg")).await.unwrap();
        let newest = record_with("glaucoma.jpg", [0.02, 0.02, 0.9, 0.06]);
        store.save(newest.clone()).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.monitor, 1);
        assert_eq!(stats.critical, 2);
        assert_eq!(stats.last_analysis, Some(newest.result.produced_at()));
    }

    #[tokio::test]
    async fn test_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json")).with_limit(3);

        for i in 0..5 {
            store.save(record(&format!("eye-{i}.jpg"))).await.unwrap();
        }

        let records = store.list().await.unwrap();
        let uris: Vec<_> = records.iter().map(|r| r.image_uri.as_str()).collect();
        assert_eq!(uris, vec!["eye-4.jpg", "eye-3.jpg", "eye-2.jpg"]);
    }

    #[tokio::test]
    async fn test_default_limit_is_fifty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        for i in 0..55 {
            store.save(record(&format!("{i}.jpg"))).await.unwrap();
        }
        let records = store.list().await.unwrap();
        assert_eq!(records.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(records[0].image_uri, "54.jpg");
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let saved = record("left.jpg").with_notes("follow up in 3 months");
        HistoryStore::new(&path).save(saved.clone()).await.unwrap();

        let reopened = HistoryStore::new(&path);
        let loaded = reopened.get(saved.id()).await.unwrap().unwrap();
        assert_eq!(loaded.notes.as_deref(), Some("follow up in 3 months"));
        assert_eq!(loaded.result.label(), saved.result.label());
        assert_eq!(loaded.result.probabilities(), saved.result.probabilities());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        let first = record("a.jpg");
        let second = record("b.jpg");
        store.save(first.clone()).await.unwrap();
        store.save(second.clone()).await.unwrap();

        assert!(store.delete(first.id()).await.unwrap());
        assert!(!store.delete(first.id()).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = HistoryStore::new(&path);
        assert!(store.list().await.unwrap().is_empty());
        store.save(record("c.jpg")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
