/// Integration tests for the train and predict workflows
///
/// These run the full pipeline against real stores and a temporary
/// artifact directory:
/// - CSV upload validation
/// - Training with and without an evaluation split
/// - Artifact resolution and fallback
/// - Prediction persistence and asset views
use asset_risk_predictor::{
    ml::{
        plan_split, read_csv_upload, validate_training, ModelMetadata, PipelineSettings,
        RiskPipeline, TrainingSampleRecord, ACCURACY, ROC_AUC,
    },
    models::{AssetDetail, AssetStatus, PredictionRecord, RiskLevel},
    state::{InMemoryStore, ModelStore, SledStore},
    AppError, Result,
};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

const TRAIN_HEADER: &str = "timestamp,asset_id,temperature,vibration,pressure,current,label";
const PREDICT_HEADER: &str = "timestamp,asset_id,temperature,vibration,pressure,current";

/// `negatives` healthy rows followed by `positives` failing rows over three pumps
fn training_csv(negatives: usize, positives: usize) -> String {
    let mut csv = format!("{}\n", TRAIN_HEADER);
    for i in 0..negatives + positives {
        let failing = i >= negatives;
        let (temperature, vibration, pressure, current) = if failing {
            (92.0 + (i % 5) as f64, 0.85 + (i % 3) as f64 * 0.03, 140.0 + i as f64, 21.0)
        } else {
            (58.0 + (i % 5) as f64, 0.18 + (i % 3) as f64 * 0.02, 99.0 + (i % 4) as f64, 10.0)
        };
        writeln!(
            csv,
            "2024-03-{:02}T{:02}:00:00,PUMP_{:03},{},{},{},{},{}",
            1 + i / 24,
            i % 24,
            i % 3,
            temperature,
            vibration,
            pressure,
            current,
            u8::from(failing)
        )
        .unwrap();
    }
    csv
}

fn setup_pipeline(store: Arc<dyn ModelStore>, dir: &TempDir) -> RiskPipeline {
    RiskPipeline::new(
        store,
        PipelineSettings {
            store_training_data: true,
            artifacts_dir: dir.path().join("artifacts"),
        },
    )
}

#[tokio::test]
async fn test_train_then_predict_end_to_end() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let trained = pipeline
        .train_upload(Some("fleet.csv"), training_csv(8, 4).into_bytes())
        .await
        .unwrap();

    assert_eq!(trained.rows_used, 12);
    assert_eq!(trained.assets, 3);
    assert!((trained.positive_rate - 4.0 / 12.0).abs() < 1e-12);
    assert!(trained.metrics.contains_key(ACCURACY));
    assert_eq!(trained.model_id.get_version_num(), 4);

    let upload = format!(
        "{}\n2024-04-01T00:00:00,PUMP_001,59.0,0.2,100.0,10.0\n2024-04-01T01:00:00,PUMP_001,95.0,0.9,145.0,21.0\n",
        PREDICT_HEADER
    );
    let outcome = pipeline
        .predict_upload(&trained.model_id.to_string(), Some("latest.csv"), upload.into_bytes())
        .await
        .unwrap();

    assert_eq!(outcome.model_id, trained.model_id);
    assert_eq!(outcome.assessments.len(), 1);
    let assessment = &outcome.assessments[0];
    assert_eq!(assessment.asset_id, "PUMP_001");
    assert_eq!(assessment.temperature, 95.0);
    assert!((0.0..=1.0).contains(&assessment.failure_probability));
    let expected = if assessment.failure_probability >= 0.8 {
        RiskLevel::Critical
    } else if assessment.failure_probability >= 0.5 {
        RiskLevel::Warning
    } else {
        RiskLevel::Normal
    };
    assert_eq!(assessment.risk_level, expected);
    assert_eq!(outcome.records[0].failure_probability, assessment.failure_probability);
}

#[tokio::test]
async fn test_small_dataset_reports_no_metrics() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let trained = pipeline
        .train_upload(Some("small.csv"), training_csv(6, 3).into_bytes())
        .await
        .unwrap();

    assert_eq!(trained.rows_used, 9);
    assert!(trained.metrics.is_empty());
}

#[tokio::test]
async fn test_single_positive_reports_accuracy_without_auc() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);
    let mut auc_omitted = 0;

    // One positive row is too few to stratify, so the evaluation subset is
    // drawn at random and usually holds negatives only.
    for negatives in 11..16 {
        let csv = training_csv(negatives, 1);
        let trained = pipeline
            .train_upload(Some("rare.csv"), csv.clone().into_bytes())
            .await
            .unwrap();

        let table = read_csv_upload(Some("rare.csv"), csv.as_bytes()).unwrap();
        let plan = plan_split(&validate_training(&table).unwrap()).unwrap();
        assert!(!plan.stratified);
        let eval_classes = plan.eval.as_ref().unwrap().classes().len();

        assert!(trained.metrics.contains_key(ACCURACY));
        assert_eq!(trained.metrics.contains_key(ROC_AUC), eval_classes == 2);
        if eval_classes < 2 {
            auc_omitted += 1;
        }
    }

    assert!(auc_omitted > 0);
}

#[tokio::test]
async fn test_single_class_upload_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let err = pipeline
        .train_upload(Some("healthy.csv"), training_csv(15, 0).into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientClasses));
    assert!(pipeline.store().list_models().await.unwrap().is_empty());
    let artifacts = dir.path().join("artifacts");
    assert!(!artifacts.exists() || std::fs::read_dir(&artifacts).unwrap().next().is_none());
}

#[tokio::test]
async fn test_schema_errors_list_every_missing_column() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let err = pipeline
        .train_upload(
            Some("partial.csv"),
            b"timestamp,asset_id,temperature\n2024-01-01,PUMP_001,50\n".to_vec(),
        )
        .await
        .unwrap_err();

    match err {
        AppError::Schema { missing_columns } => {
            assert_eq!(missing_columns, vec!["vibration", "pressure", "current", "label"]);
        }
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_checks_run_before_schema() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let err = pipeline
        .train_upload(Some("fleet.xlsx"), training_csv(8, 4).into_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Upload(_)));

    let err = pipeline
        .train_upload(Some("fleet.csv"), vec![0xc3, 0x28, 0x0a])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Upload(_)));
}

#[tokio::test]
async fn test_predict_with_unknown_model_ignores_bad_upload() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(InMemoryStore::new()), &dir);

    let err = pipeline
        .predict_upload(&Uuid::new_v4().to_string(), Some("bad.txt"), b"garbage".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnknownModel(_)));
}

#[tokio::test]
async fn test_artifact_falls_back_to_default_location() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = setup_pipeline(store.clone(), &dir);
    let trained = pipeline
        .train_upload(Some("fleet.csv"), training_csv(10, 5).into_bytes())
        .await
        .unwrap();

    // A second pipeline over the same store whose recorded path no longer
    // resolves still finds the artifact under its own directory.
    let relocated = TempDir::new().unwrap();
    let relocated_dir = relocated.path().join("artifacts");
    std::fs::create_dir_all(&relocated_dir).unwrap();
    std::fs::rename(
        &trained.model_path,
        relocated_dir.join(format!("{}.bin", trained.model_id)),
    )
    .unwrap();
    let relocated_pipeline = setup_pipeline(store, &relocated);

    let upload = format!("{}\n2024-05-01T00:00:00,FAN_001,60,0.2,100,10\n", PREDICT_HEADER);
    let outcome = relocated_pipeline
        .predict_upload(&trained.model_id.to_string(), Some("x.csv"), upload.into_bytes())
        .await
        .unwrap();
    assert_eq!(outcome.assessments.len(), 1);
}

#[tokio::test]
async fn test_training_data_flag_controls_sample_storage() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ModelStore> = Arc::new(InMemoryStore::new());
    let pipeline = RiskPipeline::new(
        store.clone(),
        PipelineSettings {
            store_training_data: false,
            artifacts_dir: dir.path().to_path_buf(),
        },
    );

    let trained = pipeline
        .train_upload(Some("fleet.csv"), training_csv(8, 4).into_bytes())
        .await
        .unwrap();

    assert!(store.get_model(&trained.model_id).await.unwrap().is_some());
    assert!(store.training_samples(&trained.model_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_predictions_feed_asset_views_on_sled() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::new(dir.path().join("db")).unwrap());
    let pipeline = setup_pipeline(store.clone(), &dir);
    let trained = pipeline
        .train_upload(Some("fleet.csv"), training_csv(16, 8).into_bytes())
        .await
        .unwrap();
    assert!(trained.metrics.contains_key(ROC_AUC));

    let upload = format!(
        "{}\n2024-05-01T00:00:00,PUMP_000,60,0.2,100,10\n2024-05-01T00:00:00,PUMP_002,96,0.9,150,22\n",
        PREDICT_HEADER
    );
    pipeline
        .predict_upload(&trained.model_id.to_string(), Some("x.csv"), upload.into_bytes())
        .await
        .unwrap();

    let assets = store.list_assets().await.unwrap();
    assert_eq!(assets.len(), 3);
    assert!(assets[0].risk_level.is_some());
    assert!(assets[1].risk_level.is_none());

    let detail = store.asset_detail("PUMP_002", 200).await.unwrap();
    assert_eq!(detail.history.len(), 1);
    assert!(detail.metrics.is_some());
}

/// Store whose model writes always fail
struct RejectingStore;

#[async_trait]
impl ModelStore for RejectingStore {
    async fn create_model(&self, _: &ModelMetadata, _: &[TrainingSampleRecord]) -> Result<()> {
        Err(AppError::Database("disk full".to_string()))
    }

    async fn get_model(&self, _: &Uuid) -> Result<Option<ModelMetadata>> {
        Ok(None)
    }

    async fn list_models(&self) -> Result<Vec<ModelMetadata>> {
        Ok(Vec::new())
    }

    async fn save_predictions(&self, _: &[PredictionRecord]) -> Result<()> {
        Ok(())
    }

    async fn training_samples(&self, _: &Uuid) -> Result<Vec<TrainingSampleRecord>> {
        Ok(Vec::new())
    }

    async fn list_assets(&self) -> Result<Vec<AssetStatus>> {
        Ok(Vec::new())
    }

    async fn asset_detail(&self, asset_id: &str, _: usize) -> Result<AssetDetail> {
        Err(AppError::NotFound(asset_id.to_string()))
    }
}

#[tokio::test]
async fn test_failed_persistence_removes_artifact() {
    let dir = TempDir::new().unwrap();
    let pipeline = setup_pipeline(Arc::new(RejectingStore), &dir);

    let err = pipeline
        .train_upload(Some("fleet.csv"), training_csv(8, 4).into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Database(_)));
    let leftovers = std::fs::read_dir(dir.path().join("artifacts")).unwrap().count();
    assert_eq!(leftovers, 0);
}
