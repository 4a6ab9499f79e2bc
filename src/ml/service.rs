use crate::config::{EngineConfig, MIN_TRAINING_SAMPLES};
use crate::error::{AppError, Result};
use crate::ml::classifier::GaussianNaiveBayes;
use crate::ml::evaluation::evaluate;
use crate::ml::models::{
    EvaluationReport, ModelInfo, ModelStatus, PersistenceWarning, PredictionRecord,
    PredictionResult, TrainingDataset, TrainingResult,
};
use crate::ml::splitter::stratified_split;
use crate::models::{DamageFeatures, FEATURE_COUNT, FEATURE_NAMES};
use crate::state::{
    ModelSnapshotStore, PredictionHistory, ReportHistory, StoredSnapshot, TrainingDataFeed,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A fitted model together with its installation metadata
#[derive(Debug, Clone)]
pub struct InstalledModel {
    pub model: GaussianNaiveBayes,
    pub trained_at: DateTime<Utc>,
    /// Size of the train partition the model was fitted on
    pub sample_count: usize,
}

/// Owns the currently serving model and the train/predict entry points.
///
/// The installed model sits behind an `Arc` that is swapped as a whole, so
/// readers see either the old or the new model. Fitting runs on the blocking
/// pool without touching the model slot. At most one training run is active
/// at a time; a second concurrent `train` is rejected with
/// [`AppError::TrainingInProgress`] rather than queued.
pub struct ClassifierService {
    /// Engine configuration
    config: EngineConfig,

    /// Currently installed model
    current: RwLock<Option<Arc<InstalledModel>>>,

    /// Held for the whole split/fit/swap/persist sequence
    training_guard: Mutex<()>,

    /// Durable model storage
    snapshot_store: Arc<dyn ModelSnapshotStore>,
}

impl ClassifierService {
    /// Create a service with no model installed
    pub fn new(config: EngineConfig, snapshot_store: Arc<dyn ModelSnapshotStore>) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            training_guard: Mutex::new(()),
            snapshot_store,
        }
    }

    /// Install the persisted snapshot, if there is one.
    ///
    /// Returns whether a model was restored. A snapshot that cannot be decoded
    /// is logged and skipped; failing to read the store is an error.
    pub async fn restore(&self) -> Result<bool> {
        let Some(snapshot) = self.snapshot_store.load().await? else {
            info!("No persisted model snapshot found, starting untrained");
            return Ok(false);
        };

        match GaussianNaiveBayes::from_bytes(&snapshot.model_bytes) {
            Ok(model) => {
                info!(
                    trained_at = %snapshot.trained_at,
                    sample_count = snapshot.sample_count,
                    "Restored model from snapshot"
                );
                self.install(InstalledModel {
                    model,
                    trained_at: snapshot.trained_at,
                    sample_count: snapshot.sample_count,
                });
                Ok(true)
            }
            Err(e) => {
                warn!("Ignoring unreadable model snapshot: {}", e);
                Ok(false)
            }
        }
    }

    /// Train a new model from a snapshot of the feed and install it.
    ///
    /// On any failure before the swap the previously installed model keeps
    /// serving. A failure to persist after the swap is reported through
    /// [`TrainingResult::warning`] instead of failing the call.
    pub async fn train(
        &self,
        feed: &dyn TrainingDataFeed,
        test_fraction: Option<f64>,
        notes: Option<String>,
    ) -> Result<TrainingResult> {
        let _guard = self
            .training_guard
            .try_lock()
            .map_err(|_| AppError::TrainingInProgress)?;

        let test_fraction = test_fraction.unwrap_or(self.config.test_fraction);
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(AppError::InvalidInput(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }

        let data = feed.training_data().await?;
        let dataset = TrainingDataset::from_training_data(&data)?;

        let min_samples = self.config.min_training_samples.max(MIN_TRAINING_SAMPLES);
        if dataset.n_samples < min_samples {
            return Err(AppError::InsufficientData(format!(
                "need at least {} samples, have {}",
                min_samples, dataset.n_samples
            )));
        }

        info!(
            samples = dataset.n_samples,
            test_fraction, "Training damage classifier"
        );

        let seed = self.config.seed;
        let var_smoothing = self.config.var_smoothing;
        let fitted = tokio::task::spawn_blocking(move || {
            fit_and_evaluate(&dataset, test_fraction, seed, var_smoothing)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        let installed = Arc::new(InstalledModel {
            model: fitted.model,
            trained_at: Utc::now(),
            sample_count: fitted.training_samples,
        });
        *self.current.write() = Some(installed.clone());

        let warning = match self.persist(&installed).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Model installed but could not be persisted: {}", e);
                Some(PersistenceWarning {
                    message: e.to_string(),
                })
            }
        };

        info!(
            accuracy = fitted.report.accuracy,
            f1_score = fitted.report.f1_score,
            training_samples = fitted.training_samples,
            test_samples = fitted.test_samples,
            "✅ Damage classifier trained - Accuracy: {:.2}%",
            fitted.report.accuracy * 100.0
        );

        let message = if warning.is_some() {
            "Model trained successfully but could not be persisted".to_string()
        } else {
            "Model trained successfully".to_string()
        };

        Ok(TrainingResult {
            id: Uuid::new_v4(),
            success: true,
            message,
            training_samples: fitted.training_samples,
            test_samples: fitted.test_samples,
            report: fitted.report,
            notes,
            trained_at: installed.trained_at,
            warning,
        })
    }

    async fn persist(&self, installed: &InstalledModel) -> Result<()> {
        let snapshot = StoredSnapshot {
            model_bytes: installed.model.to_bytes()?,
            trained_at: installed.trained_at,
            sample_count: installed.sample_count,
        };
        self.snapshot_store.save(&snapshot).await?;
        debug!(bytes = snapshot.model_bytes.len(), "Model snapshot persisted");
        Ok(())
    }

    fn install(&self, installed: InstalledModel) {
        *self.current.write() = Some(Arc::new(installed));
    }

    /// Currently installed model, if any
    pub fn current_model(&self) -> Option<Arc<InstalledModel>> {
        self.current.read().clone()
    }

    fn require_model(&self) -> Result<Arc<InstalledModel>> {
        self.current_model().ok_or(AppError::NotTrained)
    }

    /// Classify a raw feature vector in canonical order
    pub fn predict(&self, features: &[f64]) -> Result<PredictionResult> {
        let installed = self.require_model()?;
        installed.model.predict(features)
    }

    /// Classify a named feature set after checking each measurement's domain
    pub fn predict_features(&self, features: &DamageFeatures) -> Result<PredictionResult> {
        features.validate()?;
        self.predict(&features.to_vector())
    }

    /// Classify a named feature set and keep the outcome in `history`.
    ///
    /// The prediction is returned even when it cannot be recorded.
    pub async fn predict_and_record(
        &self,
        features: &DamageFeatures,
        component_id: Option<String>,
        history: &dyn PredictionHistory,
    ) -> Result<PredictionRecord> {
        let result = self.predict_features(features)?;
        let record = PredictionRecord::new(*features, result, component_id);

        if let Err(e) = history.record(&record).await {
            warn!(prediction_id = %record.id, "Failed to record prediction: {}", e);
        }

        debug!(
            prediction_id = %record.id,
            level = %record.result.predicted_level,
            confidence = record.result.confidence,
            "Prediction served"
        );
        Ok(record)
    }

    pub fn status(&self) -> ModelStatus {
        match self.current_model() {
            Some(installed) => ModelStatus {
                is_trained: true,
                training_samples: Some(installed.sample_count),
                last_trained_at: Some(installed.trained_at),
                accuracy: None,
            },
            None => ModelStatus::untrained(),
        }
    }

    /// Status with accuracy taken from the most recent recorded training run
    pub async fn status_with_history(&self, history: &dyn ReportHistory) -> Result<ModelStatus> {
        let status = self.status();
        if !status.is_trained {
            return Ok(status);
        }

        let latest = history.latest().await?;
        Ok(status.with_accuracy(latest.map(|result| result.report.accuracy)))
    }

    /// Fitted parameters of the installed model
    pub fn model_info(&self) -> Result<ModelInfo> {
        let installed = self.require_model()?;
        let model = &installed.model;

        Ok(ModelInfo {
            class_count: model.classes().len(),
            classes: model.classes().to_vec(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            class_prior: model.class_prior().to_vec(),
            theta: model.theta().rows().into_iter().map(|row| row.to_vec()).collect(),
            var: model.var().rows().into_iter().map(|row| row.to_vec()).collect(),
            epsilon: model.epsilon(),
            training_samples: installed.sample_count,
            trained_at: installed.trained_at,
        })
    }
}

struct FittedOutcome {
    model: GaussianNaiveBayes,
    report: EvaluationReport,
    training_samples: usize,
    test_samples: usize,
}

/// Split, fit on the train partition and score on the test partition
fn fit_and_evaluate(
    dataset: &TrainingDataset,
    test_fraction: f64,
    seed: u64,
    var_smoothing: f64,
) -> Result<FittedOutcome> {
    let (train, test) = stratified_split(dataset, test_fraction, seed)?;
    let model = GaussianNaiveBayes::fit(&train, var_smoothing)?;
    let predicted = model.predict_labels(&test.features)?;
    let report = evaluate(&test.labels, &predicted)?;

    Ok(FittedOutcome {
        model,
        report,
        training_samples: train.n_samples,
        test_samples: test.n_samples,
    })
}
