use crate::error::{AppError, Result};
use crate::ml::{ModelMetadata, TrainingSampleRecord};
use crate::models::{AssetDetail, AssetStatus, PredictionRecord};
use crate::state::{build_detail, chronological, ModelStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory model store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    models: Arc<DashMap<Uuid, ModelMetadata>>,
    /// Every stored sample in insertion order
    samples: Arc<RwLock<Vec<TrainingSampleRecord>>>,
    predictions: Arc<RwLock<Vec<PredictionRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    async fn create_model(
        &self,
        metadata: &ModelMetadata,
        samples: &[TrainingSampleRecord],
    ) -> Result<()> {
        // Writers hold the sample lock while the metadata lands.
        let mut stored = self.samples.write().await;
        if self.models.contains_key(&metadata.model_id) {
            return Err(AppError::Database(format!(
                "Model {} already exists",
                metadata.model_id
            )));
        }
        stored.extend_from_slice(samples);
        self.models.insert(metadata.model_id, metadata.clone());

        tracing::debug!(
            model_id = %metadata.model_id,
            samples = samples.len(),
            "Model saved"
        );
        Ok(())
    }

    async fn get_model(&self, model_id: &Uuid) -> Result<Option<ModelMetadata>> {
        Ok(self.models.get(model_id).map(|entry| entry.clone()))
    }

    async fn list_models(&self) -> Result<Vec<ModelMetadata>> {
        let mut models: Vec<ModelMetadata> = self
            .models
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        // Sort by training time (newest first)
        models.sort_by(|a, b| b.training_date.cmp(&a.training_date));
        Ok(models)
    }

    async fn save_predictions(&self, records: &[PredictionRecord]) -> Result<()> {
        self.predictions.write().await.extend_from_slice(records);
        tracing::debug!(records = records.len(), "Predictions saved");
        Ok(())
    }

    async fn training_samples(&self, model_id: &Uuid) -> Result<Vec<TrainingSampleRecord>> {
        Ok(self
            .samples
            .read()
            .await
            .iter()
            .filter(|sample| sample.model_id == *model_id)
            .cloned()
            .collect())
    }

    async fn list_assets(&self) -> Result<Vec<AssetStatus>> {
        let mut asset_ids: BTreeSet<String> = self
            .samples
            .read()
            .await
            .iter()
            .map(|sample| sample.asset_id.clone())
            .collect();

        let predictions = self.predictions.read().await;
        let mut latest: BTreeMap<&str, &PredictionRecord> = BTreeMap::new();
        for record in predictions.iter() {
            asset_ids.insert(record.asset_id.clone());
            latest
                .entry(record.asset_id.as_str())
                .and_modify(|best| {
                    if chronological(record, *best).is_ge() {
                        *best = record;
                    }
                })
                .or_insert(record);
        }

        Ok(asset_ids
            .into_iter()
            .map(|asset_id| {
                let prediction = latest.get(asset_id.as_str()).copied();
                AssetStatus::new(asset_id, prediction)
            })
            .collect())
    }

    async fn asset_detail(&self, asset_id: &str, history_limit: usize) -> Result<AssetDetail> {
        let predictions: Vec<PredictionRecord> = self
            .predictions
            .read()
            .await
            .iter()
            .filter(|record| record.asset_id == asset_id)
            .cloned()
            .collect();

        let samples = self.samples.read().await;
        let latest_sample = samples.iter().rev().find(|s| s.asset_id == asset_id);

        if predictions.is_empty() && latest_sample.is_none() {
            return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
        }

        Ok(build_detail(asset_id, predictions, latest_sample, history_limit))
    }
}
