use crate::config::{StorageBackend, StorageConfig};
use crate::error::{AppError, Result};
use crate::state::{
    InMemoryPredictionHistory, InMemoryReportHistory, InMemorySnapshotStore, ModelSnapshotStore,
    PredictionHistory, ReportHistory, SledStore,
};
use std::sync::Arc;

/// Snapshot store, training history and prediction history sharing one backend
#[derive(Clone)]
pub struct Stores {
    pub snapshots: Arc<dyn ModelSnapshotStore>,
    pub history: Arc<dyn ReportHistory>,
    pub predictions: Arc<dyn PredictionHistory>,
}

/// Create the model stores based on configuration
pub fn create_stores(config: &StorageConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");

            let store = Arc::new(SledStore::new(path)?);
            Ok(Stores {
                snapshots: store.clone(),
                history: store.clone(),
                predictions: store,
            })
        }

        StorageBackend::Memory => Ok(create_in_memory_stores()),
    }
}

/// Create in-memory stores (for testing and development)
pub fn create_in_memory_stores() -> Stores {
    tracing::info!("Initializing in-memory storage backend");
    Stores {
        snapshots: Arc::new(InMemorySnapshotStore::new()),
        history: Arc::new(InMemoryReportHistory::new()),
        predictions: Arc::new(InMemoryPredictionHistory::new()),
    }
}
