use crate::error::{AppError, Result};
use crate::ml::models::{Metrics, ACCURACY, ROC_AUC};
use crate::models::{CleanDataset, TrainingRow, FEATURE_NAMES};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::fmt;

/// Trees in every fitted ensemble
pub const N_TREES: usize = 200;

/// Base seed; tree `t` is grown from `FOREST_SEED + t`
pub const FOREST_SEED: u64 = 42;

/// Features each tree sees (random subspace of the four sensors)
pub const SUBSPACE_SIZE: usize = 3;

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Capability every trainable model exposes: per-class probabilities.
///
/// Output is `n_rows × n_classes`; column `k` is the probability of
/// label `k`.
pub trait ProbabilisticClassifier: Send + Sync {
    /// Predict class probabilities
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict hard labels (positive iff P(1) > 0.5)
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<u8>> {
        let proba = self.predict_proba(features)?;
        if proba.ncols() < 2 {
            return Err(AppError::IncompatibleModel(
                "probability output has fewer than two columns".to_string(),
            ));
        }
        Ok(proba.column(1).iter().map(|&p| u8::from(p > 0.5)).collect())
    }
}

/// One bagged member of the ensemble
#[derive(Serialize, Deserialize)]
enum ForestMember {
    /// Tree fit on a bootstrap sample restricted to `features`
    Tree { features: Vec<usize>, tree: Tree },
    /// Bootstrap sample held a single class; always votes for it
    Constant(i32),
}

impl ForestMember {
    fn fit(x: &Array2<f64>, y: &[u8], seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = x.nrows();

        let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let mut features: Vec<usize> = (0..x.ncols()).collect();
        features.shuffle(&mut rng);
        features.truncate(SUBSPACE_SIZE.min(x.ncols()));
        features.sort_unstable();

        let labels: Vec<i32> = sample.iter().map(|&i| i32::from(y[i])).collect();
        if labels.iter().all(|&label| label == labels[0]) {
            return Ok(ForestMember::Constant(labels[0]));
        }

        let matrix = sub_matrix(x, &sample, &features);
        let params = DecisionTreeClassifierParameters::default().with_criterion(SplitCriterion::Gini);
        let tree = DecisionTreeClassifier::fit(&matrix, &labels, params)
            .map_err(|e| AppError::Training(format!("Failed to fit decision tree: {}", e)))?;

        Ok(ForestMember::Tree { features, tree })
    }

    fn vote(&self, x: &Array2<f64>) -> Result<Vec<i32>> {
        match self {
            ForestMember::Constant(label) => Ok(vec![*label; x.nrows()]),
            ForestMember::Tree { features, tree } => {
                let rows: Vec<usize> = (0..x.nrows()).collect();
                let matrix = sub_matrix(x, &rows, features);
                tree.predict(&matrix)
                    .map_err(|e| AppError::Training(format!("Tree prediction failed: {}", e)))
            }
        }
    }
}

/// Row-major copy of the selected rows and columns
fn sub_matrix(x: &Array2<f64>, rows: &[usize], columns: &[usize]) -> DenseMatrix<f64> {
    let values: Vec<f64> = rows
        .iter()
        .flat_map(|&i| columns.iter().map(move |&j| x[[i, j]]))
        .collect();
    DenseMatrix::new(rows.len(), columns.len(), values, false)
}

/// Bagged ensemble of Gini decision trees over random feature subspaces
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_features: usize,
    members: Vec<ForestMember>,
}

impl RandomForestClassifier {
    /// Fit `n_trees` members in parallel; deterministic for a given seed
    pub fn fit(x: &Array2<f64>, y: &[u8], n_trees: usize, seed: u64) -> Result<Self> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(AppError::Training(format!(
                "Feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }

        let members = (0..n_trees)
            .into_par_iter()
            .map(|t| ForestMember::fit(x, y, seed.wrapping_add(t as u64)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            n_features: x.ncols(),
            members,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }
}

impl ProbabilisticClassifier for RandomForestClassifier {
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features {
            return Err(AppError::IncompatibleModel(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }

        let votes = self
            .members
            .par_iter()
            .map(|member| member.vote(features))
            .collect::<Result<Vec<_>>>()?;

        let n_rows = features.nrows();
        let mut positive = vec![0usize; n_rows];
        for member_votes in &votes {
            for (count, &label) in positive.iter_mut().zip(member_votes) {
                *count += usize::from(label == 1);
            }
        }

        let n_members = self.members.len().max(1) as f64;
        let mut proba = Array2::zeros((n_rows, 2));
        for (i, &count) in positive.iter().enumerate() {
            let p = count as f64 / n_members;
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }
}

impl fmt::Debug for RandomForestClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomForestClassifier")
            .field("n_features", &self.n_features)
            .field("n_trees", &self.members.len())
            .finish()
    }
}

/// Fitted classifier plus the feature order it expects
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub feature_names: Vec<String>,
    model: RandomForestClassifier,
}

impl TrainedArtifact {
    pub fn new(model: RandomForestClassifier) -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            model,
        }
    }

    pub fn model(&self) -> &RandomForestClassifier {
        &self.model
    }

    /// Whether the artifact was fit on the current sensor columns
    pub fn matches_features(&self) -> bool {
        self.feature_names.iter().map(String::as_str).eq(FEATURE_NAMES)
    }
}

impl ProbabilisticClassifier for TrainedArtifact {
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.model.predict_proba(features)
    }
}

/// Fit the ensemble and, when an evaluation subset exists, score it.
///
/// Without `eval_rows` the returned metrics map is empty.
pub fn fit(
    fit_rows: &CleanDataset<TrainingRow>,
    eval_rows: Option<&CleanDataset<TrainingRow>>,
) -> Result<(TrainedArtifact, Metrics)> {
    if fit_rows.classes().len() < 2 {
        tracing::warn!(
            rows = fit_rows.len(),
            "Fit subset holds a single class; every tree will vote for it"
        );
    }

    let model = RandomForestClassifier::fit(
        &fit_rows.feature_matrix(),
        &fit_rows.labels(),
        N_TREES,
        FOREST_SEED,
    )?;
    let artifact = TrainedArtifact::new(model);

    let metrics = match eval_rows {
        Some(eval) => evaluate(&artifact, eval)?,
        None => Metrics::new(),
    };

    tracing::debug!(
        fit_rows = fit_rows.len(),
        eval_rows = eval_rows.map(|e| e.len()).unwrap_or(0),
        n_trees = artifact.model.n_trees(),
        "Fitted ensemble"
    );

    Ok((artifact, metrics))
}

/// Accuracy always; ROC AUC only when both classes are present
pub fn evaluate(
    model: &dyn ProbabilisticClassifier,
    eval: &CleanDataset<TrainingRow>,
) -> Result<Metrics> {
    let mut metrics = Metrics::new();
    if eval.is_empty() {
        return Ok(metrics);
    }

    let x = eval.feature_matrix();
    let y = eval.labels();
    let proba = model.predict_proba(&x)?;
    let scores: Vec<f64> = proba.column(1).to_vec();
    let predicted: Vec<u8> = scores.iter().map(|&p| u8::from(p > 0.5)).collect();

    metrics.insert(ACCURACY.to_string(), accuracy(&y, &predicted));

    if let Some(auc) = roc_auc(&y, &scores) {
        metrics.insert(ROC_AUC.to_string(), auc);
    }
    Ok(metrics)
}

/// Fraction of matching labels
pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
///
/// `None` unless both classes are present.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied block shares the mean rank.
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = mean_rank;
        }
        start = end;
    }

    let positive_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y == 1)
        .map(|(_, &r)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
