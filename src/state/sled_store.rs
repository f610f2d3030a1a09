use crate::error::{AppError, Result};
use crate::ml::{ModelMetadata, TrainingSampleRecord};
use crate::models::{AssetDetail, AssetStatus, PredictionRecord};
use crate::state::{build_detail, chronological, ModelStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, IVec};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent model store using the Sled embedded database.
///
/// Samples are keyed by `model_id ++ seq` and predictions by `seq`, where
/// `seq` is a big-endian id from `Db::generate_id`, so key order is
/// insertion order.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    models_tree: sled::Tree,
    samples_tree: sled::Tree,
    predictions_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| AppError::Database(format!("Failed to open Sled database: {}", e)))?;

        let models_tree = Self::open_tree(&db, "models")?;
        let samples_tree = Self::open_tree(&db, "training_samples")?;
        let predictions_tree = Self::open_tree(&db, "predictions")?;

        tracing::info!(path = %path.display(), "Initialized Sled store");

        Ok(Self {
            db: Arc::new(db),
            models_tree,
            samples_tree,
            predictions_tree,
        })
    }

    fn open_tree(db: &Db, name: &str) -> Result<sled::Tree> {
        db.open_tree(name)
            .map_err(|e| AppError::Database(format!("Failed to open {} tree: {}", name, e)))
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn next_seq(&self) -> Result<[u8; 8]> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }

    fn sample_key(model_id: &Uuid, seq: [u8; 8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(model_id.as_bytes());
        key.extend_from_slice(&seq);
        key
    }

    /// Insertion sequence encoded in a sample key
    fn sample_seq(key: &IVec) -> u64 {
        key.get(16..24)
            .and_then(|tail| <[u8; 8]>::try_from(tail).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0)
    }

    fn all_predictions(&self) -> Result<Vec<PredictionRecord>> {
        self.predictions_tree
            .iter()
            .values()
            .map(|value| Self::decode(&value?))
            .collect()
    }

    /// Flush pending writes to disk.
    ///
    /// Synchronous so no background flush outlives the store and keeps the
    /// database lock after drop.
    pub async fn flush(&self) -> Result<()> {
        self.sync()
    }

    fn sync(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| AppError::Database(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for SledStore {
    async fn create_model(
        &self,
        metadata: &ModelMetadata,
        samples: &[TrainingSampleRecord],
    ) -> Result<()> {
        let model_key = metadata.model_id.as_bytes().to_vec();
        let model_value = Self::encode(metadata)?;
        let sample_entries = samples
            .iter()
            .map(|sample| {
                Ok((
                    Self::sample_key(&metadata.model_id, self.next_seq()?),
                    Self::encode(sample)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        (&self.models_tree, &self.samples_tree)
            .transaction(|(models, stored_samples)| {
                if models.get(&model_key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(AppError::Database(
                        format!("Model {} already exists", metadata.model_id),
                    )));
                }
                models.insert(model_key.as_slice(), model_value.as_slice())?;
                for (key, value) in &sample_entries {
                    stored_samples.insert(key.as_slice(), value.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => {
                    AppError::Database(format!("Failed to save model: {}", err))
                }
            })?;

        self.sync()?;

        tracing::debug!(
            model_id = %metadata.model_id,
            samples = samples.len(),
            "Model saved to Sled"
        );
        Ok(())
    }

    async fn get_model(&self, model_id: &Uuid) -> Result<Option<ModelMetadata>> {
        match self.models_tree.get(model_id.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AppError::Database(format!("Failed to get model: {}", e))),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelMetadata>> {
        let mut models: Vec<ModelMetadata> = self
            .models_tree
            .iter()
            .values()
            .map(|value| Self::decode(&value?))
            .collect::<Result<_>>()?;

        // Sort by training time (newest first)
        models.sort_by(|a, b| b.training_date.cmp(&a.training_date));
        Ok(models)
    }

    async fn save_predictions(&self, records: &[PredictionRecord]) -> Result<()> {
        let mut batch = Batch::default();
        for record in records {
            batch.insert(self.next_seq()?.to_vec(), Self::encode(record)?);
        }

        self.predictions_tree
            .apply_batch(batch)
            .map_err(|e| AppError::Database(format!("Failed to save predictions: {}", e)))?;
        self.sync()?;

        tracing::debug!(records = records.len(), "Predictions saved to Sled");
        Ok(())
    }

    async fn training_samples(&self, model_id: &Uuid) -> Result<Vec<TrainingSampleRecord>> {
        self.samples_tree
            .scan_prefix(model_id.as_bytes())
            .values()
            .map(|value| Self::decode(&value?))
            .collect()
    }

    async fn list_assets(&self) -> Result<Vec<AssetStatus>> {
        let mut asset_ids = BTreeSet::new();
        for value in self.samples_tree.iter().values() {
            let sample: TrainingSampleRecord = Self::decode(&value?)?;
            asset_ids.insert(sample.asset_id);
        }

        let mut latest: BTreeMap<String, PredictionRecord> = BTreeMap::new();
        for record in self.all_predictions()? {
            asset_ids.insert(record.asset_id.clone());
            match latest.get(&record.asset_id) {
                Some(best) if chronological(&record, best).is_lt() => {}
                _ => {
                    latest.insert(record.asset_id.clone(), record);
                }
            }
        }

        Ok(asset_ids
            .into_iter()
            .map(|asset_id| {
                let prediction = latest.get(&asset_id);
                AssetStatus::new(asset_id, prediction)
            })
            .collect())
    }

    async fn asset_detail(&self, asset_id: &str, history_limit: usize) -> Result<AssetDetail> {
        let predictions: Vec<PredictionRecord> = self
            .all_predictions()?
            .into_iter()
            .filter(|record| record.asset_id == asset_id)
            .collect();

        let mut latest_sample: Option<(u64, TrainingSampleRecord)> = None;
        for entry in self.samples_tree.iter() {
            let (key, value) = entry?;
            let sample: TrainingSampleRecord = Self::decode(&value)?;
            if sample.asset_id != asset_id {
                continue;
            }
            let seq = Self::sample_seq(&key);
            if latest_sample.as_ref().map_or(true, |(best, _)| seq >= *best) {
                latest_sample = Some((seq, sample));
            }
        }

        if predictions.is_empty() && latest_sample.is_none() {
            return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
        }

        Ok(build_detail(
            asset_id,
            predictions,
            latest_sample.as_ref().map(|(_, sample)| sample),
            history_limit,
        ))
    }
}
