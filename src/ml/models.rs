use crate::error::{AppError, Result};
use crate::models::{DamageFeatures, DamageLevel, DamageRecord, FEATURE_COUNT};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Raw training snapshot as handed over by the record store:
/// parallel feature vectors and label strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingData {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<String>,
}

impl TrainingData {
    pub fn from_records(records: &[DamageRecord]) -> Self {
        Self {
            features: records
                .iter()
                .map(|r| r.features.to_vector().to_vec())
                .collect(),
            labels: records.iter().map(|r| r.damage_level.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Validated training dataset
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Class labels, aligned with feature rows
    pub labels: Vec<DamageLevel>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    /// Validate a raw snapshot: equal lengths, seven finite features per row,
    /// known labels
    pub fn from_training_data(data: &TrainingData) -> Result<Self> {
        if data.features.len() != data.labels.len() {
            return Err(AppError::InvalidInput(format!(
                "feature rows ({}) and labels ({}) differ in length",
                data.features.len(),
                data.labels.len()
            )));
        }

        let n_samples = data.features.len();
        let mut features = Array2::zeros((n_samples, FEATURE_COUNT));
        let mut labels = Vec::with_capacity(n_samples);

        for (i, (row, label)) in data.features.iter().zip(data.labels.iter()).enumerate() {
            if row.len() != FEATURE_COUNT {
                return Err(AppError::InvalidInput(format!(
                    "sample {} has {} features, expected {}",
                    i,
                    row.len(),
                    FEATURE_COUNT
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(AppError::InvalidInput(format!(
                    "sample {} contains a non-finite feature value",
                    i
                )));
            }
            for (j, &val) in row.iter().enumerate() {
                features[[i, j]] = val;
            }
            labels.push(DamageLevel::parse_label(label)?);
        }

        Ok(Self {
            features,
            labels,
            n_samples,
            n_features: FEATURE_COUNT,
        })
    }

    /// Create a dataset directly from typed records
    pub fn from_records(records: &[DamageRecord]) -> Self {
        let n_samples = records.len();
        let mut features = Array2::zeros((n_samples, FEATURE_COUNT));
        for (i, record) in records.iter().enumerate() {
            for (j, val) in record.features.to_vector().into_iter().enumerate() {
                features[[i, j]] = val;
            }
        }

        Self {
            features,
            labels: records.iter().map(|r| r.damage_level).collect(),
            n_samples,
            n_features: FEATURE_COUNT,
        }
    }

    /// Rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            n_samples: indices.len(),
            n_features: self.n_features,
        }
    }

    /// Sample count per class, indexed by the fixed class ordering
    pub fn class_counts(&self) -> [usize; DamageLevel::COUNT] {
        let mut counts = [0usize; DamageLevel::COUNT];
        for label in &self.labels {
            counts[label.index()] += 1;
        }
        counts
    }
}

/// Posterior probability per damage level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub ringan: f64,
    pub sedang: f64,
    pub berat: f64,
}

impl ClassProbabilities {
    /// Build from values in the fixed class ordering
    pub fn from_array(values: [f64; DamageLevel::COUNT]) -> Self {
        Self {
            ringan: values[0],
            sedang: values[1],
            berat: values[2],
        }
    }

    pub fn as_array(&self) -> [f64; DamageLevel::COUNT] {
        [self.ringan, self.sedang, self.berat]
    }

    pub fn get(&self, level: DamageLevel) -> f64 {
        self.as_array()[level.index()]
    }
}

/// Prediction result with confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Most probable damage level
    pub predicted_level: DamageLevel,

    /// Posterior of the predicted level (0.0 - 1.0)
    pub confidence: f64,

    /// All class posteriors
    pub probabilities: ClassProbabilities,
}

/// A served prediction together with the measurements it was made from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,

    /// Component the measurements were taken from
    pub component_id: Option<String>,

    pub features: DamageFeatures,

    #[serde(flatten)]
    pub result: PredictionResult,

    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(
        features: DamageFeatures,
        result: PredictionResult,
        component_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            component_id,
            features,
            result,
            created_at: Utc::now(),
        }
    }
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score", alias = "f1_score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Evaluation of one train/test cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// trace(M) / sum(M)
    pub accuracy: f64,

    /// Support-weighted precision
    pub precision: f64,

    /// Support-weighted recall
    pub recall: f64,

    /// Support-weighted F1 score
    pub f1_score: f64,

    /// Per-class metrics keyed by damage level
    pub classification_report: BTreeMap<DamageLevel, ClassMetrics>,

    /// Rows are true classes, columns predicted classes, in the fixed class ordering
    pub confusion_matrix: [[usize; DamageLevel::COUNT]; DamageLevel::COUNT],
}

/// Non-fatal failure to persist a freshly installed model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    pub message: String,
}

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Identifier of this training run
    pub id: Uuid,

    pub success: bool,

    pub message: String,

    /// Samples in the train partition
    pub training_samples: usize,

    /// Samples in the test partition
    pub test_samples: usize,

    /// Test-partition evaluation
    #[serde(flatten)]
    pub report: EvaluationReport,

    /// Operator notes supplied with the training request
    pub notes: Option<String>,

    /// When the new model was installed
    pub trained_at: DateTime<Utc>,

    /// Set when the model is serving but could not be persisted
    pub warning: Option<PersistenceWarning>,
}

/// Current model status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub is_trained: bool,
    pub training_samples: Option<usize>,
    pub last_trained_at: Option<DateTime<Utc>>,
    /// Filled from recorded training history, not held by the engine
    pub accuracy: Option<f64>,
}

impl ModelStatus {
    pub fn untrained() -> Self {
        Self {
            is_trained: false,
            training_samples: None,
            last_trained_at: None,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: Option<f64>) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// Fitted parameters of the installed model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub class_count: usize,
    pub classes: Vec<DamageLevel>,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub class_prior: Vec<f64>,
    /// Per-class feature means
    pub theta: Vec<Vec<f64>>,
    /// Per-class feature variances (floored)
    pub var: Vec<Vec<f64>>,
    /// Variance floor applied during fitting
    pub epsilon: f64,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
}
