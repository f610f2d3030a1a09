use crate::error::{AppError, Result};
use crate::ml::classifier::ProbabilisticClassifier;
use crate::ml::risk::classify;
use crate::models::{AssetAssessment, CleanDataset, InferenceRow};
use std::collections::BTreeMap;

/// Keep exactly one row per asset: the one with the latest timestamp.
///
/// Output is ordered by asset_id. When an asset has several rows sharing
/// its latest timestamp, the one appearing last in the input wins.
pub fn select_latest_per_asset(
    dataset: &CleanDataset<InferenceRow>,
) -> Result<CleanDataset<InferenceRow>> {
    if dataset.is_empty() {
        return Err(AppError::EmptyDataset);
    }

    let rows = dataset.rows();
    let mut latest: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        latest
            .entry(row.asset_id.as_str())
            .and_modify(|best| {
                if row.timestamp >= rows[*best].timestamp {
                    *best = i;
                }
            })
            .or_insert(i);
    }

    let indices: Vec<usize> = latest.into_values().collect();
    Ok(dataset.select(&indices))
}

/// Score the selected rows and attach risk levels.
///
/// The classifier output must be one row per input row with at least two
/// probability columns; column 1 is the failure probability.
pub fn assess(
    selected: &CleanDataset<InferenceRow>,
    model: &dyn ProbabilisticClassifier,
) -> Result<Vec<AssetAssessment>> {
    let proba = model.predict_proba(&selected.feature_matrix())?;

    if proba.ncols() < 2 {
        return Err(AppError::IncompatibleModel(
            "Model probability output is not compatible with binary classification".to_string(),
        ));
    }
    if proba.nrows() != selected.len() {
        return Err(AppError::IncompatibleModel(format!(
            "Prediction output length {} does not match {} assessed rows",
            proba.nrows(),
            selected.len()
        )));
    }

    let assessments = selected
        .rows()
        .iter()
        .zip(proba.column(1))
        .map(|(row, &failure_probability)| AssetAssessment {
            asset_id: row.asset_id.clone(),
            timestamp: row.timestamp,
            temperature: row.readings.temperature,
            vibration: row.readings.vibration,
            pressure: row.readings.pressure,
            current: row.readings.current,
            failure_probability,
            risk_level: classify(failure_probability),
        })
        .collect();

    Ok(assessments)
}
