use crate::error::{AppError, Result};
use crate::ml::models::TrainingData;
use crate::models::DamageRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;

/// Source of labeled training data.
///
/// Each call returns a consistent snapshot of the records available at that
/// moment; later additions are only seen by later calls.
#[async_trait]
pub trait TrainingDataFeed: Send + Sync {
    async fn training_data(&self) -> Result<TrainingData>;
}

/// In-memory record feed
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    records: RwLock<Vec<DamageRecord>>,
}

impl InMemoryFeed {
    pub fn new(records: Vec<DamageRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Append a labeled record
    pub fn push(&self, record: DamageRecord) {
        self.records.write().push(record);
    }
}

#[async_trait]
impl TrainingDataFeed for InMemoryFeed {
    async fn training_data(&self) -> Result<TrainingData> {
        Ok(TrainingData::from_records(&self.records.read()))
    }
}

/// Feed reading a JSON array of records from disk on every snapshot
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrainingDataFeed for JsonFileFeed {
    async fn training_data(&self) -> Result<TrainingData> {
        let contents = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Persistence(format!(
                "Failed to read training data from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let records: Vec<DamageRecord> = serde_json::from_slice(&contents)?;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Loaded training records"
        );

        Ok(TrainingData::from_records(&records))
    }
}
