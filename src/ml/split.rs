use crate::error::{AppError, Result};
use crate::ml::models::SplitPlan;
use crate::models::{CleanDataset, TrainingRow};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Below this many rows no evaluation subset is carved out
pub const SMALL_DATASET_THRESHOLD: usize = 10;

/// Target share of rows held out for evaluation
pub const EVAL_FRACTION: f64 = 0.2;

/// Seed for every split shuffle
pub const SPLIT_SEED: u64 = 42;

/// Evaluation subset size for `n` rows and `class_count` classes.
///
/// `round(0.2 * n)`, raised to at least `class_count`, capped at `n - 1`.
pub fn eval_size(n: usize, class_count: usize) -> usize {
    let target = (n as f64 * EVAL_FRACTION).round() as usize;
    target.max(class_count).min(n.saturating_sub(1))
}

/// Decide how to partition a validated training dataset.
///
/// Fails on zero rows and on single-class data. Small datasets are fit
/// whole with no evaluation subset; larger ones are split with a fixed
/// seed, stratified whenever that is statistically valid.
pub fn plan_split(dataset: &CleanDataset<TrainingRow>) -> Result<SplitPlan> {
    if dataset.is_empty() {
        return Err(AppError::EmptyDataset);
    }

    let classes = dataset.classes();
    if classes.len() < 2 {
        return Err(AppError::InsufficientClasses);
    }

    let n = dataset.len();
    if n < SMALL_DATASET_THRESHOLD {
        tracing::debug!(rows = n, "Dataset below split threshold, fitting on all rows");
        return Ok(SplitPlan {
            fit: dataset.clone(),
            eval: None,
            stratified: false,
        });
    }

    let by_class = indices_by_class(dataset);
    let class_count = by_class.len();
    let n_eval = eval_size(n, class_count);
    let minority = by_class.values().map(Vec::len).min().unwrap_or(0);

    let stratified =
        class_count == 2 && minority >= 2 && n_eval >= class_count && n - n_eval >= class_count;

    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    let (mut fit_idx, mut eval_idx) = if stratified {
        stratified_partition(by_class, n, n_eval, &mut rng)
    } else {
        random_partition(n, n_eval, &mut rng)
    };
    fit_idx.sort_unstable();
    eval_idx.sort_unstable();

    tracing::debug!(
        rows = n,
        fit_rows = fit_idx.len(),
        eval_rows = eval_idx.len(),
        stratified,
        "Planned train/eval split"
    );

    Ok(SplitPlan {
        fit: dataset.select(&fit_idx),
        eval: Some(dataset.select(&eval_idx)),
        stratified,
    })
}

fn indices_by_class(dataset: &CleanDataset<TrainingRow>) -> BTreeMap<u8, Vec<usize>> {
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, row) in dataset.rows().iter().enumerate() {
        by_class.entry(row.label).or_default().push(i);
    }
    by_class
}

fn random_partition(n: usize, n_eval: usize, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let fit = indices.split_off(n_eval);
    (fit, indices)
}

/// Per-class share of the eval set, rounded, kept within
/// `[1, class_size - 1]` and adjusted to sum to exactly `n_eval`
fn allocate_eval(class_sizes: &[usize], n: usize, n_eval: usize) -> Vec<usize> {
    let exact: Vec<f64> = class_sizes
        .iter()
        .map(|&size| n_eval as f64 * size as f64 / n as f64)
        .collect();

    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(class_sizes)
        .map(|(&share, &size)| (share.round() as usize).clamp(1, size - 1))
        .collect();

    let mut total: usize = alloc.iter().sum();
    while total > n_eval {
        // Take from the class furthest above its exact share.
        let Some(i) = (0..alloc.len())
            .filter(|&i| alloc[i] > 1)
            .max_by(|&a, &b| {
                (alloc[a] as f64 - exact[a]).total_cmp(&(alloc[b] as f64 - exact[b]))
            })
        else {
            break;
        };
        alloc[i] -= 1;
        total -= 1;
    }
    while total < n_eval {
        let Some(i) = (0..alloc.len())
            .filter(|&i| alloc[i] + 1 < class_sizes[i])
            .max_by(|&a, &b| {
                (exact[a] - alloc[a] as f64).total_cmp(&(exact[b] - alloc[b] as f64))
            })
        else {
            break;
        };
        alloc[i] += 1;
        total += 1;
    }
    alloc
}

fn stratified_partition(
    by_class: BTreeMap<u8, Vec<usize>>,
    n: usize,
    n_eval: usize,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let class_sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    let alloc = allocate_eval(&class_sizes, n, n_eval);

    let mut fit = Vec::with_capacity(n - n_eval);
    let mut eval = Vec::with_capacity(n_eval);
    for (mut members, take) in by_class.into_values().zip(alloc) {
        members.shuffle(rng);
        let rest = members.split_off(take);
        eval.extend(members);
        fit.extend(rest);
    }
    (fit, eval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorReadings;
    use chrono::{Duration, TimeZone, Utc};

    fn dataset(labels: &[u8]) -> CleanDataset<TrainingRow> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| TrainingRow {
                timestamp: start + Duration::hours(i as i64),
                asset_id: format!("PUMP_{:03}", i % 3),
                readings: SensorReadings::new(i as f64, 0.1, 100.0, 10.0),
                label,
            })
            .collect();
        CleanDataset::from_validated(rows)
    }

    fn labels_of(dataset: &CleanDataset<TrainingRow>) -> Vec<u8> {
        dataset.labels()
    }

    #[test]
    fn test_single_class_is_rejected() {
        let err = plan_split(&dataset(&[0; 15])).unwrap_err();
        assert!(matches!(err, AppError::InsufficientClasses));

        let err = plan_split(&dataset(&[1; 3])).unwrap_err();
        assert!(matches!(err, AppError::InsufficientClasses));
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert!(matches!(plan_split(&dataset(&[])), Err(AppError::EmptyDataset)));
    }

    #[test]
    fn test_small_dataset_fits_on_everything() {
        let data = dataset(&[0, 1, 0, 0, 1, 0, 0, 1, 0]);
        let plan = plan_split(&data).unwrap();

        assert!(plan.eval.is_none());
        assert!(!plan.stratified);
        assert_eq!(plan.fit, data);
    }

    #[test]
    fn test_eval_size_bounds() {
        assert_eq!(eval_size(10, 2), 2);
        assert_eq!(eval_size(12, 2), 2);
        assert_eq!(eval_size(13, 2), 3);
        assert_eq!(eval_size(100, 2), 20);
        assert_eq!(eval_size(2, 2), 1);
    }

    #[test]
    fn test_split_sizes_partition_the_dataset() {
        for n in 10..60 {
            let labels: Vec<u8> = (0..n).map(|i| u8::from(i % 3 == 0)).collect();
            let plan = plan_split(&dataset(&labels)).unwrap();
            let eval = plan.eval.expect("eval subset for n >= 10");

            assert_eq!(plan.fit.len() + eval.len(), n);
            assert!(eval.len() >= 2 && eval.len() <= n - 1);
        }
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let mut labels = vec![0u8; 8];
        labels.extend([1u8; 4]);
        let plan = plan_split(&dataset(&labels)).unwrap();
        let eval = plan.eval.unwrap();

        assert!(plan.stratified);
        assert_eq!(eval.len(), 2);
        assert_eq!(eval.classes(), vec![0, 1]);
        assert_eq!(plan.fit.classes(), vec![0, 1]);
    }

    #[test]
    fn test_stratified_allocation_is_proportional() {
        let mut labels = vec![0u8; 70];
        labels.extend([1u8; 30]);
        let plan = plan_split(&dataset(&labels)).unwrap();
        let eval = labels_of(plan.eval.as_ref().unwrap());

        assert_eq!(eval.len(), 20);
        assert_eq!(eval.iter().filter(|&&l| l == 1).count(), 6);
        assert_eq!(eval.iter().filter(|&&l| l == 0).count(), 14);
    }

    #[test]
    fn test_lone_minority_row_disables_stratification() {
        let mut labels = vec![0u8; 11];
        labels.push(1);
        let plan = plan_split(&dataset(&labels)).unwrap();

        assert!(!plan.stratified);
        assert_eq!(plan.fit.len() + plan.eval.unwrap().len(), 12);
    }

    #[test]
    fn test_split_is_reproducible() {
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i % 4 == 0)).collect();
        let data = dataset(&labels);

        let first = plan_split(&data).unwrap();
        let second = plan_split(&data).unwrap();

        assert_eq!(first.fit, second.fit);
        assert_eq!(first.eval, second.eval);
    }

    #[test]
    fn test_allocate_eval_adjusts_to_exact_total() {
        assert_eq!(allocate_eval(&[8, 4], 12, 2), vec![1, 1]);
        assert_eq!(allocate_eval(&[2, 2], 4, 2), vec![1, 1]);
        let alloc = allocate_eval(&[9, 3], 12, 3);
        assert_eq!(alloc.iter().sum::<usize>(), 3);
        assert!(alloc.iter().all(|&a| a >= 1));
    }
}
