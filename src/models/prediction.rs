use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Ordinal risk tier derived from a failure probability
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Warning,
    Critical,
}

impl RiskLevel {
    /// Check if the level calls for maintenance attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, RiskLevel::Warning | RiskLevel::Critical)
    }
}

/// Scored reading for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAssessment {
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,

    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,

    /// Positive-class probability in [0, 1]
    pub failure_probability: f64,
    pub risk_level: RiskLevel,
}

/// Persisted form of an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub asset_id: String,
    pub model_id: Uuid,
    /// Timestamp of the sensor row that was scored
    pub timestamp: DateTime<Utc>,
    pub failure_probability: f64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_assessment(model_id: Uuid, assessment: &AssetAssessment) -> Self {
        Self {
            asset_id: assessment.asset_id.clone(),
            model_id,
            timestamp: assessment.timestamp,
            failure_probability: assessment.failure_probability,
            risk_level: assessment.risk_level,
            created_at: Utc::now(),
        }
    }
}
