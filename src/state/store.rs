use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Persisted form of the installed model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Opaque encoded model
    pub model_bytes: Vec<u8>,

    /// When the model was installed
    pub trained_at: DateTime<Utc>,

    /// Samples the model was fitted on
    pub sample_count: usize,
}

/// Trait for durable storage of the current model snapshot.
///
/// Holds at most one snapshot; `save` replaces whatever was stored before.
#[async_trait]
pub trait ModelSnapshotStore: Send + Sync {
    /// Replace the stored snapshot
    async fn save(&self, snapshot: &StoredSnapshot) -> Result<()>;

    /// Load the stored snapshot, if any
    async fn load(&self) -> Result<Option<StoredSnapshot>>;
}

/// In-memory snapshot store (for testing and development)
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<StoredSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelSnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &StoredSnapshot) -> Result<()> {
        *self.snapshot.write() = Some(snapshot.clone());
        tracing::debug!(sample_count = snapshot.sample_count, "Snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredSnapshot>> {
        Ok(self.snapshot.read().clone())
    }
}
