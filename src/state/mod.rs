pub mod factory;
pub mod sled_store;
pub mod store;

pub use factory::{create_in_memory_store, create_store};
pub use sled_store::SledStore;
pub use store::InMemoryStore;

use crate::error::Result;
use crate::ml::{ModelMetadata, TrainingSampleRecord};
use crate::models::{AssetDetail, AssetStatus, PredictionRecord, PredictionSummary};
use async_trait::async_trait;
use std::cmp::Ordering;
use uuid::Uuid;

/// History length returned when a caller does not ask for one
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Persistence for model metadata, training samples and predictions
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Write a model's metadata and its training samples as one unit
    async fn create_model(
        &self,
        metadata: &ModelMetadata,
        samples: &[TrainingSampleRecord],
    ) -> Result<()>;

    /// Get model metadata by ID
    async fn get_model(&self, model_id: &Uuid) -> Result<Option<ModelMetadata>>;

    /// All models, newest training_date first
    async fn list_models(&self) -> Result<Vec<ModelMetadata>>;

    /// Append prediction records as one unit
    async fn save_predictions(&self, records: &[PredictionRecord]) -> Result<()>;

    /// Training rows stored for a model, in insertion order
    async fn training_samples(&self, model_id: &Uuid) -> Result<Vec<TrainingSampleRecord>>;

    /// Every known asset with its latest prediction, sorted by asset_id
    async fn list_assets(&self) -> Result<Vec<AssetStatus>>;

    /// Prediction history and last known readings for one asset.
    ///
    /// Fails with `NotFound` when the asset has neither samples nor
    /// predictions.
    async fn asset_detail(&self, asset_id: &str, history_limit: usize) -> Result<AssetDetail>;
}

/// Chronological order for predictions; created_at breaks timestamp ties
pub(crate) fn chronological(a: &PredictionRecord, b: &PredictionRecord) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then(a.created_at.cmp(&b.created_at))
}

/// Build an asset detail from its predictions (any order) and most recent sample
pub(crate) fn build_detail(
    asset_id: &str,
    mut predictions: Vec<PredictionRecord>,
    latest_sample: Option<&TrainingSampleRecord>,
    history_limit: usize,
) -> AssetDetail {
    predictions.sort_by(chronological);
    let latest = predictions.last().map(PredictionSummary::from);
    let history = predictions
        .iter()
        .take(history_limit)
        .map(PredictionSummary::from)
        .collect();

    AssetDetail {
        asset_id: asset_id.to_string(),
        latest,
        history,
        metrics: latest_sample.map(|sample| sample.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use chrono::{Duration, TimeZone, Utc};

    fn record(hour: i64, created_offset: i64, probability: f64) -> PredictionRecord {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        PredictionRecord {
            asset_id: "PUMP_001".to_string(),
            model_id: Uuid::nil(),
            timestamp: base + Duration::hours(hour),
            failure_probability: probability,
            risk_level: crate::ml::classify(probability),
            created_at: base + Duration::days(1) + Duration::seconds(created_offset),
        }
    }

    #[test]
    fn test_detail_orders_history_and_picks_latest() {
        let predictions = vec![record(5, 0, 0.9), record(1, 0, 0.1), record(5, 10, 0.6)];

        let detail = build_detail("PUMP_001", predictions, None, DEFAULT_HISTORY_LIMIT);

        let probabilities: Vec<f64> = detail
            .history
            .iter()
            .map(|p| p.failure_probability)
            .collect();
        assert_eq!(probabilities, vec![0.1, 0.9, 0.6]);
        let latest = detail.latest.unwrap();
        assert_eq!(latest.failure_probability, 0.6);
        assert_eq!(latest.risk_level, RiskLevel::Warning);
        assert!(detail.metrics.is_none());
    }

    #[test]
    fn test_detail_history_is_truncated() {
        let predictions = (0..10).map(|h| record(h, 0, 0.2)).collect();

        let detail = build_detail("PUMP_001", predictions, None, 3);

        assert_eq!(detail.history.len(), 3);
        assert_eq!(detail.latest.unwrap().timestamp, record(9, 0, 0.2).timestamp);
    }
}
