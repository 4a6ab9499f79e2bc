use crate::error::{AppError, Result};
use crate::ml::models::{PredictionRecord, TrainingResult};
use crate::state::{
    ModelSnapshotStore, PredictionFilter, PredictionHistory, ReportHistory, StoredSnapshot,
};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const SNAPSHOT_KEY: &[u8] = b"current";

/// Persistent model, training-history and prediction-history store using
/// Sled embedded database
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    snapshots_tree: sled::Tree,
    reports_tree: sled::Tree,
    predictions_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            AppError::Persistence(format!("Failed to open Sled database: {}", e))
        })?;

        let snapshots_tree = db.open_tree("snapshots").map_err(|e| {
            AppError::Persistence(format!("Failed to open snapshots tree: {}", e))
        })?;

        let reports_tree = db.open_tree("reports").map_err(|e| {
            AppError::Persistence(format!("Failed to open reports tree: {}", e))
        })?;

        let predictions_tree = db.open_tree("predictions").map_err(|e| {
            AppError::Persistence(format!("Failed to open predictions tree: {}", e))
        })?;

        tracing::info!("Initialized Sled store at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            snapshots_tree,
            reports_tree,
            predictions_tree,
        })
    }

    /// History keys are monotonically increasing ids, so tree order is
    /// recording order
    fn next_history_key(&self) -> Result<[u8; 8]> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Persistence(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ModelSnapshotStore for SledStore {
    async fn save(&self, snapshot: &StoredSnapshot) -> Result<()> {
        let bytes = bincode::serialize(snapshot)?;

        self.snapshots_tree.insert(SNAPSHOT_KEY, bytes).map_err(|e| {
            AppError::Persistence(format!("Failed to save model snapshot: {}", e))
        })?;
        self.flush().await?;

        tracing::debug!(sample_count = snapshot.sample_count, "Model snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredSnapshot>> {
        let stored = self.snapshots_tree.get(SNAPSHOT_KEY).map_err(|e| {
            AppError::Persistence(format!("Failed to read model snapshot: {}", e))
        })?;

        match stored {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

// Training results flatten their report, which bincode cannot decode, so
// history entries are stored as JSON.
#[async_trait]
impl ReportHistory for SledStore {
    async fn record(&self, result: &TrainingResult) -> Result<()> {
        let key = self.next_history_key()?;
        let bytes = serde_json::to_vec(result)?;

        self.reports_tree.insert(key, bytes).map_err(|e| {
            AppError::Persistence(format!("Failed to record training result: {}", e))
        })?;
        self.flush().await?;

        tracing::debug!(training_id = %result.id, "Training result recorded");
        Ok(())
    }

    async fn latest(&self) -> Result<Option<TrainingResult>> {
        match self.reports_tree.last()? {
            Some((_, bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Vec<TrainingResult>> {
        let start = (page as usize).saturating_mul(page_size as usize);

        self.reports_tree
            .iter()
            .rev()
            .skip(start)
            .take(page_size as usize)
            .map(|entry| -> Result<TrainingResult> {
                let (_, bytes) = entry?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }
}

#[async_trait]
impl PredictionHistory for SledStore {
    async fn record(&self, record: &PredictionRecord) -> Result<()> {
        let key = self.next_history_key()?;
        let bytes = serde_json::to_vec(record)?;

        self.predictions_tree.insert(key, bytes).map_err(|e| {
            AppError::Persistence(format!("Failed to record prediction: {}", e))
        })?;
        self.flush().await?;

        tracing::debug!(prediction_id = %record.id, "Prediction recorded");
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<PredictionRecord>> {
        for entry in self.predictions_tree.iter().rev() {
            let (_, bytes) = entry?;
            let record: PredictionRecord = serde_json::from_slice(&bytes)?;
            if &record.id == id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn list(
        &self,
        filter: &PredictionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<PredictionRecord>> {
        let start = (page as usize).saturating_mul(page_size as usize);
        let mut matched = Vec::new();
        let mut skipped = 0;

        for entry in self.predictions_tree.iter().rev() {
            if matched.len() >= page_size as usize {
                break;
            }
            let (_, bytes) = entry?;
            let record: PredictionRecord = serde_json::from_slice(&bytes)?;
            if !filter.matches(&record) {
                continue;
            }
            if skipped < start {
                skipped += 1;
                continue;
            }
            matched.push(record);
        }

        Ok(matched)
    }

    async fn count(&self, filter: &PredictionFilter) -> Result<u64> {
        let mut count = 0;
        for entry in self.predictions_tree.iter() {
            let (_, bytes) = entry?;
            let record: PredictionRecord = serde_json::from_slice(&bytes)?;
            if filter.matches(&record) {
                count += 1;
            }
        }
        Ok(count)
    }
}
