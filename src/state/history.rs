use crate::error::Result;
use crate::ml::models::TrainingResult;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Trait for recording the outcome of training runs
#[async_trait]
pub trait ReportHistory: Send + Sync {
    /// Append a training result
    async fn record(&self, result: &TrainingResult) -> Result<()>;

    /// Most recently recorded result
    async fn latest(&self) -> Result<Option<TrainingResult>>;

    /// Results ordered newest first
    async fn list(&self, page: u32, page_size: u32) -> Result<Vec<TrainingResult>>;
}

/// In-memory training history
#[derive(Debug, Default)]
pub struct InMemoryReportHistory {
    results: RwLock<Vec<TrainingResult>>,
}

impl InMemoryReportHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportHistory for InMemoryReportHistory {
    async fn record(&self, result: &TrainingResult) -> Result<()> {
        self.results.write().push(result.clone());
        tracing::debug!(training_id = %result.id, "Training result recorded");
        Ok(())
    }

    async fn latest(&self) -> Result<Option<TrainingResult>> {
        Ok(self.results.read().last().cloned())
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Vec<TrainingResult>> {
        let start = (page as usize).saturating_mul(page_size as usize);
        Ok(self
            .results
            .read()
            .iter()
            .rev()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::EvaluationReport;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn training_result(accuracy: f64) -> TrainingResult {
        TrainingResult {
            id: Uuid::new_v4(),
            success: true,
            message: "Model trained".to_string(),
            training_samples: 24,
            test_samples: 6,
            report: EvaluationReport {
                accuracy,
                precision: accuracy,
                recall: accuracy,
                f1_score: accuracy,
                classification_report: BTreeMap::new(),
                confusion_matrix: [[0; 3]; 3],
            },
            notes: None,
            trained_at: Utc::now(),
            warning: None,
        }
    }

    #[tokio::test]
    async fn test_latest_and_listing_order() {
        let history = InMemoryReportHistory::new();
        assert!(history.latest().await.unwrap().is_none());

        for accuracy in [0.7, 0.8, 0.9] {
            history.record(&training_result(accuracy)).await.unwrap();
        }

        let latest = history.latest().await.unwrap().unwrap();
        assert_eq!(latest.report.accuracy, 0.9);

        let first_page = history.list(0, 2).await.unwrap();
        let accuracies: Vec<f64> = first_page.iter().map(|r| r.report.accuracy).collect();
        assert_eq!(accuracies, vec![0.9, 0.8]);

        let second_page = history.list(1, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].report.accuracy, 0.7);
    }
}
