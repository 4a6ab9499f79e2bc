use crate::error::Result;
use crate::ml::models::PredictionRecord;
use crate::models::DamageLevel;
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

/// Trait for keeping served predictions
#[async_trait]
pub trait PredictionHistory: Send + Sync {
    /// Append a served prediction
    async fn record(&self, record: &PredictionRecord) -> Result<()>;

    /// Look up one prediction by id
    async fn get(&self, id: &Uuid) -> Result<Option<PredictionRecord>>;

    /// Matching predictions ordered newest first
    async fn list(
        &self,
        filter: &PredictionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<PredictionRecord>>;

    /// Count predictions matching filter
    async fn count(&self, filter: &PredictionFilter) -> Result<u64>;
}

/// Filter for querying recorded predictions
#[derive(Debug, Clone, Default)]
pub struct PredictionFilter {
    pub component_id: Option<String>,
    pub levels: Vec<DamageLevel>,
}

impl PredictionFilter {
    pub fn matches(&self, record: &PredictionRecord) -> bool {
        let component_match = self
            .component_id
            .as_ref()
            .map_or(true, |id| record.component_id.as_ref() == Some(id));

        let level_match =
            self.levels.is_empty() || self.levels.contains(&record.result.predicted_level);

        component_match && level_match
    }
}

/// In-memory prediction history
#[derive(Debug, Default)]
pub struct InMemoryPredictionHistory {
    records: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryPredictionHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionHistory for InMemoryPredictionHistory {
    async fn record(&self, record: &PredictionRecord) -> Result<()> {
        self.records.write().push(record.clone());
        tracing::debug!(prediction_id = %record.id, "Prediction recorded");
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<PredictionRecord>> {
        Ok(self.records.read().iter().find(|r| &r.id == id).cloned())
    }

    async fn list(
        &self,
        filter: &PredictionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<PredictionRecord>> {
        let start = (page as usize).saturating_mul(page_size as usize);
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &PredictionFilter) -> Result<u64> {
        let count = self.records.read().iter().filter(|r| filter.matches(r)).count();
        Ok(count as u64)
    }
}
