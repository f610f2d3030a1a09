use crate::models::{PredictionRecord, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset row for the fleet overview, joined with its latest prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatus {
    pub asset_id: String,
    pub risk_level: Option<RiskLevel>,
    pub failure_probability: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub model_id: Option<Uuid>,
}

impl AssetStatus {
    pub fn new(asset_id: String, latest: Option<&PredictionRecord>) -> Self {
        Self {
            asset_id,
            risk_level: latest.map(|p| p.risk_level),
            failure_probability: latest.map(|p| p.failure_probability),
            timestamp: latest.map(|p| p.timestamp),
            model_id: latest.map(|p| p.model_id),
        }
    }
}

/// One point of an asset's risk history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub model_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub failure_probability: f64,
}

impl From<&PredictionRecord> for PredictionSummary {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            model_id: record.model_id,
            timestamp: record.timestamp,
            risk_level: record.risk_level,
            failure_probability: record.failure_probability,
        }
    }
}

/// Sensor values from the most recent stored training sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,
}

/// Drill-down view of a single asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDetail {
    pub asset_id: String,
    pub latest: Option<PredictionSummary>,
    pub history: Vec<PredictionSummary>,
    pub metrics: Option<MetricsSnapshot>,
}
