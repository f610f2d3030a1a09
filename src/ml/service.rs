use crate::error::{AppError, Result};
use crate::metrics::{
    outcome_label, INFERENCE_DURATION_SECONDS, PREDICTIONS_TOTAL, PREDICTION_REQUESTS_TOTAL,
    TRAINING_DURATION_SECONDS, TRAINING_RUNS_TOTAL,
};
use crate::ml::artifacts::ArtifactStore;
use crate::ml::models::{
    ModelMetadata, PipelineSettings, PredictOutcome, TrainResponse, TrainingSampleRecord,
};
use crate::ml::{classifier, inference, split, validation, ACCURACY};
use crate::models::{AssetAssessment, PredictionRecord};
use crate::state::ModelStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Train and predict workflows over a shared store and artifact directory
#[derive(Clone)]
pub struct RiskPipeline {
    store: Arc<dyn ModelStore>,
    artifacts: ArtifactStore,
    settings: PipelineSettings,
}

/// Output of the CPU-bound half of training, not yet persisted
struct FittedModel {
    metadata: ModelMetadata,
    samples: Vec<TrainingSampleRecord>,
    artifact_path: PathBuf,
}

impl RiskPipeline {
    pub fn new(store: Arc<dyn ModelStore>, settings: PipelineSettings) -> Self {
        Self {
            store,
            artifacts: ArtifactStore::new(settings.artifacts_dir.clone()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    /// Validate a training upload, fit a model and persist it.
    ///
    /// Nothing is left behind on failure: if metadata cannot be stored the
    /// artifact file is removed again.
    pub async fn train_upload(
        &self,
        filename: Option<&str>,
        content: Vec<u8>,
    ) -> Result<TrainResponse> {
        let start = Instant::now();
        let result = self.train(filename, content).await;

        TRAINING_RUNS_TOTAL
            .with_label_values(&[outcome_label(&result)])
            .inc();
        if result.is_ok() {
            TRAINING_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        }
        result
    }

    async fn train(&self, filename: Option<&str>, content: Vec<u8>) -> Result<TrainResponse> {
        let artifacts = self.artifacts.clone();
        let store_samples = self.settings.store_training_data;
        let filename = filename.map(str::to_owned);

        let fitted = tokio::task::spawn_blocking(move || {
            fit_upload(filename.as_deref(), &content, &artifacts, store_samples)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        if let Err(e) = self
            .store
            .create_model(&fitted.metadata, &fitted.samples)
            .await
        {
            warn!(
                model_id = %fitted.metadata.model_id,
                error = %e,
                "Persisting model failed, removing artifact"
            );
            self.artifacts.remove(&fitted.artifact_path);
            return Err(e);
        }

        let metadata = fitted.metadata;
        info!(
            model_id = %metadata.model_id,
            rows = metadata.rows_used,
            assets = metadata.asset_count,
            samples_stored = fitted.samples.len(),
            accuracy = metadata.metrics.get(ACCURACY).copied(),
            "Model trained"
        );
        Ok(TrainResponse::from(&metadata))
    }

    /// Score the latest row per asset with a stored model and record the results.
    ///
    /// The model is resolved before the upload is looked at, so an unknown
    /// model_id fails regardless of what was uploaded.
    pub async fn predict_upload(
        &self,
        model_id: &str,
        filename: Option<&str>,
        content: Vec<u8>,
    ) -> Result<PredictOutcome> {
        let result = self.predict(model_id, filename, content).await;

        PREDICTION_REQUESTS_TOTAL
            .with_label_values(&[outcome_label(&result)])
            .inc();
        if let Ok(outcome) = &result {
            for assessment in &outcome.assessments {
                PREDICTIONS_TOTAL
                    .with_label_values(&[&assessment.risk_level.to_string()])
                    .inc();
            }
        }
        result
    }

    async fn predict(
        &self,
        raw_model_id: &str,
        filename: Option<&str>,
        content: Vec<u8>,
    ) -> Result<PredictOutcome> {
        let unknown = || AppError::UnknownModel(raw_model_id.trim().to_string());
        let model_id = Uuid::parse_str(raw_model_id.trim()).map_err(|_| unknown())?;
        let metadata = self.store.get_model(&model_id).await?.ok_or_else(unknown)?;

        let artifacts = self.artifacts.clone();
        let filename = filename.map(str::to_owned);
        let assessments = tokio::task::spawn_blocking(move || {
            score_upload(&metadata, filename.as_deref(), &content, &artifacts)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Inference task failed: {}", e)))??;

        let records: Vec<PredictionRecord> = assessments
            .iter()
            .map(|assessment| PredictionRecord::from_assessment(model_id, assessment))
            .collect();
        self.store.save_predictions(&records).await?;

        info!(
            model_id = %model_id,
            assets = assessments.len(),
            attention = assessments.iter().filter(|a| a.risk_level.needs_attention()).count(),
            "Predictions recorded"
        );
        Ok(PredictOutcome {
            model_id,
            assessments,
            records,
        })
    }
}

fn fit_upload(
    filename: Option<&str>,
    content: &[u8],
    artifacts: &ArtifactStore,
    store_samples: bool,
) -> Result<FittedModel> {
    let table = validation::read_csv_upload(filename, content)?;
    let dataset = validation::validate_training(&table)?;
    let plan = split::plan_split(&dataset)?;
    let (artifact, metrics) = classifier::fit(&plan.fit, plan.eval.as_ref())?;

    let model_id = Uuid::new_v4();
    let training_date = Utc::now();
    let artifact_path = artifacts.save(&model_id, &artifact)?;

    let samples = if store_samples {
        dataset
            .rows()
            .iter()
            .map(|row| TrainingSampleRecord::from_row(model_id, row, training_date))
            .collect()
    } else {
        Vec::new()
    };

    let metadata = ModelMetadata {
        model_id,
        training_date,
        rows_used: dataset.len(),
        asset_count: dataset.asset_count(),
        positive_rate: dataset.positive_rate(),
        metrics,
        artifact_location: artifact_path.to_string_lossy().into_owned(),
    };

    tracing::debug!(
        model_id = %model_id,
        eval_rows = plan.eval.as_ref().map_or(0, |eval| eval.len()),
        stratified = plan.stratified,
        "Training run fitted"
    );

    Ok(FittedModel {
        metadata,
        samples,
        artifact_path,
    })
}

fn score_upload(
    metadata: &ModelMetadata,
    filename: Option<&str>,
    content: &[u8],
    artifacts: &ArtifactStore,
) -> Result<Vec<AssetAssessment>> {
    let artifact = artifacts.load(&metadata.model_id, &metadata.artifact_location)?;

    let table = validation::read_csv_upload(filename, content)?;
    let dataset = validation::validate_inference(&table)?;

    let timer = INFERENCE_DURATION_SECONDS.start_timer();
    let selected = inference::select_latest_per_asset(&dataset)?;
    let assessments = inference::assess(&selected, &artifact)?;
    timer.observe_duration();

    Ok(assessments)
}
