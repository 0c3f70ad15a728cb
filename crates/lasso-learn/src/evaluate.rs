//! Repeated stratified k-fold evaluation of fixed hyperparameters.
use crate::metrics::mean_std;
use crate::model_selection::CrossValidator;
use crate::search::{score_fold, BestParameters};
use crate::{ClassifierFamily, Dataset, LearnError, Result};
use bon::Builder;
use itertools::iproduct;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Builder)]
pub struct EvaluationConfig {
    #[builder(default = 10)]
    pub n_splits: usize,
    #[builder(default = 5)]
    pub n_repeats: usize,
    /// Seeds both the fold partitions and every classifier.
    #[builder(default = 42)]
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldScore {
    pub family: ClassifierFamily,
    pub repeat: usize,
    pub fold: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: ClassifierFamily,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationResult {
    pub folds: Vec<FoldScore>,
    /// Mean balanced accuracy of each repeat, indexed by repeat.
    pub repeat_means: BTreeMap<ClassifierFamily, Vec<f64>>,
}

impl CrossValidationResult {
    fn from_folds(folds: Vec<FoldScore>, n_repeats: usize) -> Self {
        let mut sums: BTreeMap<ClassifierFamily, Vec<(f64, usize)>> = BTreeMap::new();
        for f in &folds {
            let per_repeat = sums
                .entry(f.family)
                .or_insert_with(|| vec![(0.0, 0); n_repeats]);
            per_repeat[f.repeat].0 += f.score;
            per_repeat[f.repeat].1 += 1;
        }
        let repeat_means = sums
            .into_iter()
            .map(|(family, per_repeat)| {
                let means = per_repeat
                    .into_iter()
                    .map(|(sum, count)| sum / count as f64)
                    .collect();
                (family, means)
            })
            .collect();
        Self {
            folds,
            repeat_means,
        }
    }

    /// Mean and population standard deviation of the per-repeat means.
    pub fn summary(&self) -> Vec<FamilySummary> {
        self.repeat_means
            .iter()
            .map(|(&family, means)| {
                let (mean, std) = mean_std(means);
                FamilySummary { family, mean, std }
            })
            .collect()
    }
}

/// Score each family's parameters over the same repeated stratified partitions.
pub fn evaluate(
    dataset: &Dataset,
    params: &BestParameters,
    config: &EvaluationConfig,
) -> Result<CrossValidationResult> {
    if params.is_empty() {
        return Err(LearnError::InvalidParameter("no hyperparameters to evaluate".to_string()));
    }
    let folds = CrossValidator::repeated_stratified(config.n_splits, config.n_repeats, config.seed)
        .split(dataset.labels())?;
    let families: Vec<_> = params.iter().collect();
    tracing::info!(
        "evaluating {} families over {} repeats of {}-fold cross-validation",
        families.len(),
        config.n_repeats,
        config.n_splits
    );

    let jobs: Vec<(usize, usize)> = iproduct!(0..families.len(), 0..folds.len()).collect();
    let scores = jobs
        .par_iter()
        .map(|&(p, f)| -> Result<FoldScore> {
            let (&family, hyperparameters) = families[p];
            let fold = &folds[f];
            let score = score_fold(dataset, hyperparameters, fold, Some(config.seed))?;
            Ok(FoldScore {
                family,
                repeat: fold.repeat,
                fold: fold.fold,
                score,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let result = CrossValidationResult::from_folds(scores, config.n_repeats);
    for s in result.summary() {
        tracing::info!(
            "{}: balanced accuracy {:.4} ± {:.4}",
            s.family,
            s.mean,
            s.std
        );
    }
    Ok(result)
}

/// Per-repeat means of a flat score list laid out repeat-major, fold-minor.
pub fn reshape_repeat_major(raw: &[f64], n_repeats: usize, n_splits: usize) -> Result<Vec<f64>> {
    if n_splits == 0 || raw.len() != n_repeats * n_splits {
        return Err(LearnError::ShapeMismatch(format!(
            "{} scores cannot be arranged as {n_repeats} repeats of {n_splits} folds",
            raw.len()
        )));
    }
    Ok(raw
        .chunks(n_splits)
        .map(|group| group.iter().sum::<f64>() / n_splits as f64)
        .collect())
}
