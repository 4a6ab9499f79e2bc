/// Integration tests for the damage severity classifier
///
/// These tests drive the engine through its public entry points:
/// - Training from a record feed and evaluation on the held-out split
/// - Prediction and fitted-parameter sanity
/// - Snapshot persistence and restore
/// - Prediction history
/// - Concurrent training and prediction

use async_trait::async_trait;
use damage_classifier::{
    config::EngineConfig,
    ml::{ClassifierService, GaussianNaiveBayes, TrainingData},
    models::{DamageFeatures, DamageLevel, DamageRecord},
    state::{
        InMemoryFeed, InMemoryReportHistory, InMemorySnapshotStore, ModelSnapshotStore,
        PredictionFilter, PredictionHistory, ReportHistory, SledStore, StoredSnapshot,
        TrainingDataFeed,
    },
    AppError, Result,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

const CLASS_MEANS: [(DamageLevel, [f64; 7]); 3] = [
    (DamageLevel::Ringan, [5.0, 1.0, 2.0, 12.0, 2.0, 1.5, 0.5]),
    (DamageLevel::Sedang, [40.0, 8.0, 10.0, 60.0, 5.0, 3.0, 5.0]),
    (DamageLevel::Berat, [90.0, 20.0, 25.0, 120.0, 8.5, 4.5, 15.0]),
];

/// Per-feature spread; neighbouring class means are far more than 5 spreads apart
const SPREAD: [f64; 7] = [1.0, 0.3, 0.5, 2.0, 0.2, 0.1, 0.4];

fn clustered_records(per_class: usize, seed: u64) -> Vec<DamageRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for (level, means) in CLASS_MEANS {
        for _ in 0..per_class {
            let values: Vec<f64> = means
                .iter()
                .zip(SPREAD.iter())
                .map(|(mean, spread)| mean + rng.gen_range(-1.0..1.0) * spread)
                .collect();
            let features = DamageFeatures::from_slice(&values).unwrap();
            records.push(DamageRecord::new(features, level));
        }
    }

    records
}

fn new_service() -> ClassifierService {
    ClassifierService::new(
        EngineConfig::default(),
        Arc::new(InMemorySnapshotStore::new()),
    )
}

#[tokio::test]
async fn test_well_separated_clusters() {
    let service = new_service();
    let feed = InMemoryFeed::new(clustered_records(10, 1));

    let result = service.train(&feed, Some(0.2), None).await.unwrap();

    assert_eq!(result.test_samples, 6);
    assert_eq!(result.training_samples, 24);
    assert!(result.report.accuracy >= 0.9);

    let matrix = result.report.confusion_matrix;
    let off_diagonal: usize = (0..3)
        .flat_map(|i| (0..3).filter(move |&j| j != i).map(move |j| (i, j)))
        .map(|(i, j)| matrix[i][j])
        .sum();
    assert_eq!(off_diagonal, 0);
}

#[tokio::test]
async fn test_confusion_matrix_and_accuracy_invariants() {
    let service = new_service();

    for seed in [3, 5, 8] {
        let feed = InMemoryFeed::new(clustered_records(12, seed));
        let result = service.train(&feed, Some(0.3), None).await.unwrap();
        let matrix = result.report.confusion_matrix;

        let total: usize = matrix.iter().flatten().sum();
        let trace: usize = (0..3).map(|i| matrix[i][i]).sum();
        assert_eq!(total, result.test_samples);
        assert_eq!(result.report.accuracy, trace as f64 / total as f64);
        assert_eq!(result.training_samples + result.test_samples, 36);
    }
}

#[tokio::test]
async fn test_fitted_parameters() {
    let service = new_service();
    let feed = InMemoryFeed::new(clustered_records(10, 2));
    service.train(&feed, None, None).await.unwrap();

    let info = service.model_info().unwrap();
    let prior_sum: f64 = info.class_prior.iter().sum();
    assert!((prior_sum - 1.0).abs() < 1e-12);
    assert!(info.var.iter().flatten().all(|&v| v > 0.0));
    assert_eq!(info.classes, DamageLevel::ALL.to_vec());

    // Each class mean is classified as its own class
    for (level, mean) in info.classes.iter().zip(info.theta.iter()) {
        let prediction = service.predict(mean).unwrap();
        assert_eq!(prediction.predicted_level, *level);
    }
}

#[tokio::test]
async fn test_training_is_deterministic() {
    let records = clustered_records(15, 4);

    let first = new_service();
    let second = new_service();
    let a = first
        .train(&InMemoryFeed::new(records.clone()), Some(0.25), None)
        .await
        .unwrap();
    let b = second
        .train(&InMemoryFeed::new(records), Some(0.25), None)
        .await
        .unwrap();

    assert_eq!(a.report, b.report);
    assert_eq!(
        first.current_model().unwrap().model,
        second.current_model().unwrap().model
    );
}

#[tokio::test]
async fn test_nine_samples_is_insufficient() {
    let service = new_service();
    service
        .train(&InMemoryFeed::new(clustered_records(10, 6)), None, None)
        .await
        .unwrap();
    let before = service.current_model().unwrap();

    let err = service
        .train(&InMemoryFeed::new(clustered_records(3, 7)), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientData(_)));
    assert!(err.is_precondition());
    assert!(Arc::ptr_eq(&before, &service.current_model().unwrap()));
}

#[tokio::test]
async fn test_unknown_label_is_rejected() {
    struct RawFeed;

    #[async_trait]
    impl TrainingDataFeed for RawFeed {
        async fn training_data(&self) -> Result<TrainingData> {
            Ok(TrainingData {
                features: vec![vec![1.0; 7]; 12],
                labels: vec!["parah".to_string(); 12],
            })
        }
    }

    let err = new_service().train(&RawFeed, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_short_feature_vector_is_invalid() {
    let service = new_service();
    service
        .train(&InMemoryFeed::new(clustered_records(10, 9)), None, None)
        .await
        .unwrap();

    let err = assert_err!(service.predict(&[5.0, 1.0, 2.0, 12.0, 2.0, 1.5]));
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(!err.is_precondition());
}

#[tokio::test]
async fn test_predict_before_training() {
    let service = new_service();
    assert!(!assert_ok!(service.restore().await));

    let err = assert_err!(service.predict(&[5.0, 1.0, 2.0, 12.0, 2.0, 1.5, 0.5]));
    assert!(matches!(err, AppError::NotTrained));
    assert_eq!(err.error_code(), "NOT_TRAINED");
}

#[tokio::test]
async fn test_sled_persistence_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::new(temp_dir.path()).unwrap());

    let original = ClassifierService::new(EngineConfig::default(), store.clone());
    original
        .train(&InMemoryFeed::new(clustered_records(10, 10)), None, None)
        .await
        .unwrap();

    let restarted = ClassifierService::new(EngineConfig::default(), store);
    assert!(restarted.restore().await.unwrap());

    let original_status = original.status();
    let restored_status = restarted.status();
    assert_eq!(restored_status, original_status);

    // Arbitrary held-out batch, including points between clusters
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let x: Vec<f64> = (0..7).map(|_| rng.gen_range(0.0..100.0)).collect();
        assert_eq!(
            restarted.predict(&x).unwrap(),
            original.predict(&x).unwrap()
        );
    }
}

#[tokio::test]
async fn test_snapshot_bytes_roundtrip_exactly() {
    let service = new_service();
    service
        .train(&InMemoryFeed::new(clustered_records(10, 11)), None, None)
        .await
        .unwrap();
    let installed = service.current_model().unwrap();

    let bytes = installed.model.to_bytes().unwrap();
    let decoded = GaussianNaiveBayes::from_bytes(&bytes).unwrap();

    for (a, b) in decoded.var().iter().zip(installed.model.var().iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
    assert_eq!(decoded, installed.model);
}

/// Feed that parks inside `training_data` until released
struct GatedFeed {
    inner: InMemoryFeed,
    entered: Notify,
    release: Notify,
}

impl GatedFeed {
    fn new(records: Vec<DamageRecord>) -> Self {
        Self {
            inner: InMemoryFeed::new(records),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl TrainingDataFeed for GatedFeed {
    async fn training_data(&self) -> Result<TrainingData> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.training_data().await
    }
}

#[tokio::test]
async fn test_concurrent_train_is_rejected() {
    let service = Arc::new(new_service());
    service
        .train(&InMemoryFeed::new(clustered_records(10, 12)), None, None)
        .await
        .unwrap();
    let before = service.current_model().unwrap();

    let feed = Arc::new(GatedFeed::new(clustered_records(10, 13)));
    let running = {
        let service = service.clone();
        let feed = feed.clone();
        tokio::spawn(async move { service.train(feed.as_ref(), None, None).await })
    };
    feed.entered.notified().await;

    let err = service
        .train(&InMemoryFeed::new(clustered_records(10, 14)), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TrainingInProgress));

    // The previous model keeps serving while the first run is in flight
    let mean = CLASS_MEANS[2].1;
    assert_eq!(
        service.predict(&mean).unwrap().predicted_level,
        DamageLevel::Berat
    );
    assert!(Arc::ptr_eq(&before, &service.current_model().unwrap()));

    feed.release.notify_one();
    running.await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &service.current_model().unwrap()));

    // Guard is released once the run finishes
    service
        .train(&InMemoryFeed::new(clustered_records(10, 15)), None, None)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_predictions_during_training() {
    let service = Arc::new(new_service());
    service
        .train(&InMemoryFeed::new(clustered_records(10, 16)), None, None)
        .await
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let served = Arc::new(AtomicUsize::new(0));
    let mut readers = Vec::new();

    for (level, mean) in CLASS_MEANS {
        let service = service.clone();
        let stop = stop.clone();
        let served = served.clone();
        readers.push(tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                let prediction = service.predict(&mean).unwrap();
                assert_eq!(prediction.predicted_level, level);
                let total: f64 = prediction.probabilities.as_array().iter().sum();
                assert!((total - 1.0).abs() < 1e-9);
                served.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }
        }));
    }

    for seed in 17..22 {
        service
            .train(&InMemoryFeed::new(clustered_records(20, seed)), None, None)
            .await
            .unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(served.load(Ordering::Relaxed) > 0);
}

struct UnavailableStore;

#[async_trait]
impl ModelSnapshotStore for UnavailableStore {
    async fn save(&self, _snapshot: &StoredSnapshot) -> Result<()> {
        Err(AppError::Persistence("storage unavailable".to_string()))
    }

    async fn load(&self) -> Result<Option<StoredSnapshot>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_persistence_failure_keeps_new_model() {
    let service = ClassifierService::new(EngineConfig::default(), Arc::new(UnavailableStore));

    let result = service
        .train(&InMemoryFeed::new(clustered_records(10, 23)), None, None)
        .await
        .unwrap();

    assert!(result.success);
    let warning = result.warning.expect("persistence warning");
    assert!(warning.message.contains("storage unavailable"));
    assert!(service.status().is_trained);
    assert!(service.predict(&CLASS_MEANS[0].1).is_ok());
}

#[tokio::test]
async fn test_status_reports_latest_accuracy() {
    let service = new_service();
    let history = InMemoryReportHistory::new();

    let result = service
        .train(
            &InMemoryFeed::new(clustered_records(10, 24)),
            None,
            Some("baseline".to_string()),
        )
        .await
        .unwrap();
    history.record(&result).await.unwrap();

    let status = service.status_with_history(&history).await.unwrap();
    assert!(status.is_trained);
    assert_eq!(status.training_samples, Some(24));
    assert_eq!(status.accuracy, Some(result.report.accuracy));

    let recorded = history.list(0, 10).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].notes.as_deref(), Some("baseline"));
}

#[tokio::test]
async fn test_served_predictions_recorded_in_sled() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::new(temp_dir.path()).unwrap());
    let service = ClassifierService::new(EngineConfig::default(), store.clone());
    service
        .train(&InMemoryFeed::new(clustered_records(10, 31)), None, None)
        .await
        .unwrap();

    let history: &dyn PredictionHistory = store.as_ref();
    let mut served = Vec::new();
    for (component, (level, means)) in ["hood", "door-left", "hood"].iter().zip(CLASS_MEANS) {
        let features = DamageFeatures::from_slice(&means).unwrap();
        let record = assert_ok!(
            service
                .predict_and_record(&features, Some(component.to_string()), history)
                .await
        );
        assert_eq!(record.result.predicted_level, level);
        served.push(record);
    }

    let out_of_range = DamageFeatures::from_slice(&[5.0, 1.0, 2.0, 12.0, 0.0, 1.5, 0.5]).unwrap();
    assert_err!(service.predict_and_record(&out_of_range, None, history).await);

    let hood = PredictionFilter {
        component_id: Some("hood".to_string()),
        ..Default::default()
    };
    let listed = history.list(&hood, 0, 10).await.unwrap();
    assert_eq!(listed, vec![served[2].clone(), served[0].clone()]);
    assert_eq!(history.count(&PredictionFilter::default()).await.unwrap(), 3);
    assert_eq!(
        history.get(&served[1].id).await.unwrap().as_ref(),
        Some(&served[1])
    );
}
