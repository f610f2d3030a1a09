use crate::models::{
    AssetAssessment, CleanDataset, MetricsSnapshot, PredictionRecord, TrainingRow,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Evaluation metrics by name ("accuracy", "roc_auc").
///
/// An empty map means no evaluation was performed.
pub type Metrics = BTreeMap<String, f64>;

pub const ACCURACY: &str = "accuracy";
pub const ROC_AUC: &str = "roc_auc";

/// Settings handed to the pipeline at construction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Persist every training row alongside the model metadata
    pub store_training_data: bool,

    /// Directory holding one artifact per model_id
    pub artifacts_dir: PathBuf,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            store_training_data: true,
            artifacts_dir: PathBuf::from("./artifacts/models"),
        }
    }
}

/// Record of one successful training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: Uuid,
    pub training_date: DateTime<Utc>,
    pub rows_used: usize,
    pub asset_count: usize,
    /// Share of label == 1 rows
    pub positive_rate: f64,
    pub metrics: Metrics,
    pub artifact_location: String,
}

/// Raw training row tagged with the model it was used for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSampleRecord {
    pub model_id: Uuid,
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,
    pub label: u8,
    pub created_at: DateTime<Utc>,
}

impl TrainingSampleRecord {
    pub fn from_row(model_id: Uuid, row: &TrainingRow, created_at: DateTime<Utc>) -> Self {
        Self {
            model_id,
            asset_id: row.asset_id.clone(),
            timestamp: row.timestamp,
            temperature: row.readings.temperature,
            vibration: row.readings.vibration,
            pressure: row.readings.pressure,
            current: row.readings.current,
            label: row.label,
            created_at,
        }
    }
}

/// Partition of a training dataset into fit and evaluation subsets
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub fit: CleanDataset<TrainingRow>,
    /// `None` on the small-dataset path
    pub eval: Option<CleanDataset<TrainingRow>>,
    pub stratified: bool,
}

/// Result of the training workflow, shaped for the API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResponse {
    pub model_id: Uuid,
    pub training_date: DateTime<Utc>,
    pub rows_used: usize,
    pub assets: usize,
    pub positive_rate: f64,
    pub metrics: Metrics,
    pub model_path: String,
}

impl From<&ModelMetadata> for TrainResponse {
    fn from(metadata: &ModelMetadata) -> Self {
        Self {
            model_id: metadata.model_id,
            training_date: metadata.training_date,
            rows_used: metadata.rows_used,
            assets: metadata.asset_count,
            positive_rate: metadata.positive_rate,
            metrics: metadata.metrics.clone(),
            model_path: metadata.artifact_location.clone(),
        }
    }
}

/// Result of the prediction workflow, shaped for the API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_id: Uuid,
    pub assessments: Vec<AssetAssessment>,
}

/// Assessments plus the parallel records that were persisted for them
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub model_id: Uuid,
    pub assessments: Vec<AssetAssessment>,
    pub records: Vec<PredictionRecord>,
}

impl From<PredictOutcome> for PredictResponse {
    fn from(outcome: PredictOutcome) -> Self {
        Self {
            model_id: outcome.model_id,
            assessments: outcome.assessments,
        }
    }
}

impl From<&TrainingSampleRecord> for MetricsSnapshot {
    fn from(sample: &TrainingSampleRecord) -> Self {
        Self {
            temperature: sample.temperature,
            vibration: sample.vibration,
            pressure: sample.pressure,
            current: sample.current,
        }
    }
}
