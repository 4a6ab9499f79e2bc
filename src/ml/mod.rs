/// Gaussian Naive Bayes damage severity engine
///
/// - Stratified train/test splitting with a seeded RNG
/// - Gaussian Naive Bayes fitting and posterior inference
/// - Evaluation metrics and confusion matrix
/// - Model lifecycle: atomic installation, persistence and restore

pub mod classifier;
pub mod evaluation;
pub mod models;
pub mod service;
pub mod splitter;

pub use classifier::GaussianNaiveBayes;
pub use evaluation::{confusion_matrix, evaluate};
pub use models::{
    ClassMetrics, ClassProbabilities, EvaluationReport, ModelInfo, ModelStatus,
    PersistenceWarning, PredictionRecord, PredictionResult, TrainingData, TrainingDataset,
    TrainingResult,
};
pub use service::{ClassifierService, InstalledModel};
pub use splitter::stratified_split;
