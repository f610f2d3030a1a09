use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Feature columns every classifier is fit on, in matrix column order
pub const FEATURE_NAMES: [&str; 4] = ["temperature", "vibration", "pressure", "current"];

/// The four raw sensor channels of one reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,
}

impl SensorReadings {
    pub fn new(temperature: f64, vibration: f64, pressure: f64, current: f64) -> Self {
        Self {
            temperature,
            vibration,
            pressure,
            current,
        }
    }

    /// Values in `FEATURE_NAMES` order
    pub fn features(&self) -> [f64; 4] {
        [self.temperature, self.vibration, self.pressure, self.current]
    }
}

/// Labeled historical reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub timestamp: DateTime<Utc>,
    pub asset_id: String,
    pub readings: SensorReadings,
    /// 0 = healthy, 1 = failure state
    pub label: u8,
}

/// Unlabeled reading to be scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRow {
    pub timestamp: DateTime<Utc>,
    pub asset_id: String,
    pub readings: SensorReadings,
}

/// Common view over both row schemas
pub trait SensorRow: Clone + Send + Sync {
    fn asset_id(&self) -> &str;
    fn readings(&self) -> &SensorReadings;
}

impl SensorRow for TrainingRow {
    fn asset_id(&self) -> &str {
        &self.asset_id
    }

    fn readings(&self) -> &SensorReadings {
        &self.readings
    }
}

impl SensorRow for InferenceRow {
    fn asset_id(&self) -> &str {
        &self.asset_id
    }

    fn readings(&self) -> &SensorReadings {
        &self.readings
    }
}

/// Fully populated, typed rows of a single schema.
///
/// Only the schema validator builds one from raw input, so every cell of
/// every row is guaranteed to be parsed. Derived datasets (splits,
/// selections) are built from rows that already passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanDataset<R> {
    rows: Vec<R>,
}

impl<R: SensorRow> CleanDataset<R> {
    pub(crate) fn from_validated(rows: Vec<R>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct asset ids
    pub fn asset_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.asset_id())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Feature matrix (n_rows × 4) in `FEATURE_NAMES` column order
    pub fn feature_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.rows.len(), FEATURE_NAMES.len()));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, value) in row.readings().features().iter().enumerate() {
                matrix[[i, j]] = *value;
            }
        }
        matrix
    }

    /// New dataset holding the rows at `indices`, in that order
    pub(crate) fn select(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

impl CleanDataset<TrainingRow> {
    pub fn labels(&self) -> Vec<u8> {
        self.rows.iter().map(|row| row.label).collect()
    }

    /// Distinct label values, ascending
    pub fn classes(&self) -> Vec<u8> {
        self.rows
            .iter()
            .map(|row| row.label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Share of rows with label 1
    pub fn positive_rate(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let positives = self.rows.iter().filter(|row| row.label == 1).count();
        positives as f64 / self.rows.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(asset: &str, hour: u32, label: u8) -> TrainingRow {
        TrainingRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            asset_id: asset.to_string(),
            readings: SensorReadings::new(60.0 + hour as f64, 0.2, 101.0, 12.5),
            label,
        }
    }

    #[test]
    fn test_feature_matrix_column_order() {
        let dataset = CleanDataset::from_validated(vec![row("PUMP_001", 3, 0)]);
        let matrix = dataset.feature_matrix();

        assert_eq!(matrix.shape(), &[1, 4]);
        assert_eq!(matrix[[0, 0]], 63.0);
        assert_eq!(matrix[[0, 1]], 0.2);
        assert_eq!(matrix[[0, 2]], 101.0);
        assert_eq!(matrix[[0, 3]], 12.5);
    }

    #[test]
    fn test_dataset_summary_statistics() {
        let dataset = CleanDataset::from_validated(vec![
            row("PUMP_001", 1, 0),
            row("PUMP_002", 2, 1),
            row("PUMP_001", 3, 0),
            row("PUMP_003", 4, 0),
        ]);

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.asset_count(), 3);
        assert_eq!(dataset.classes(), vec![0, 1]);
        assert_eq!(dataset.positive_rate(), 0.25);
    }

    #[test]
    fn test_select_preserves_requested_order() {
        let dataset = CleanDataset::from_validated(vec![
            row("A", 1, 0),
            row("B", 2, 1),
            row("C", 3, 0),
        ]);
        let subset = dataset.select(&[2, 0]);

        let ids: Vec<&str> = subset.rows().iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A"]);
    }

    #[test]
    fn test_empty_dataset_positive_rate() {
        let dataset: CleanDataset<TrainingRow> = CleanDataset::from_validated(vec![]);
        assert!(dataset.is_empty());
        assert_eq!(dataset.positive_rate(), 0.0);
    }
}
