pub mod factory;
pub mod feed;
pub mod history;
pub mod predictions;
pub mod sled_store;
pub mod store;

pub use factory::{create_in_memory_stores, create_stores, Stores};
pub use feed::{InMemoryFeed, JsonFileFeed, TrainingDataFeed};
pub use history::{InMemoryReportHistory, ReportHistory};
pub use predictions::{InMemoryPredictionHistory, PredictionFilter, PredictionHistory};
pub use sled_store::SledStore;
pub use store::{InMemorySnapshotStore, ModelSnapshotStore, StoredSnapshot};
