use thiserror::Error;

/// Classifier engine error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Too few samples to train, or a class too small to stratify
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    /// Prediction or model introspection before any successful training
    #[error("Model is not trained yet")]
    NotTrained,

    /// Malformed feature vector or label
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another training run currently holds the training guard
    #[error("A training run is already in progress")]
    TrainingInProgress,

    /// Recorded entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Snapshot or history storage failures
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::InsufficientData(_) => "INSUFFICIENT_DATA",
            AppError::NotTrained => "NOT_TRAINED",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::TrainingInProgress => "TRAINING_IN_PROGRESS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for client-correctable precondition failures: the caller can
    /// fix the situation (add data, train first, retry later) and call again.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AppError::InsufficientData(_) | AppError::NotTrained | AppError::TrainingInProgress
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from sled::Error
impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
