//! Exhaustive hyperparameter search scored by cross-validated balanced accuracy.
use crate::classifiers::{
    AdaBoostParams, Classifier, ClassifierFamily, Hyperparameters, Kernel, MaxFeatures,
    MlpParams, RandomForestParams, SvcParams,
};
use crate::metrics::{balanced_accuracy, mean_std};
use crate::model_selection::{CrossValidator, Fold};
use crate::{Dataset, LearnError, Result};
use bon::Builder;
use itertools::iproduct;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Selected hyperparameters per family.
pub type BestParameters = BTreeMap<ClassifierFamily, Hyperparameters>;

#[derive(Debug, Clone, Builder)]
pub struct SearchConfig {
    #[builder(default = 10)]
    pub n_splits: usize,
    /// Seed handed to every stochastic classifier. `None` gives each fit fresh entropy,
    /// so repeated searches may disagree on near-ties.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub params: Hyperparameters,
    pub mean_score: f64,
    pub std_score: f64,
    pub fold_scores: Vec<f64>,
}

#[derive(Debug)]
pub struct SearchResult {
    pub family: ClassifierFamily,
    pub best_params: Hyperparameters,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
    /// Best candidate refit on the whole dataset.
    pub best_estimator: Box<dyn Classifier>,
}

/// The candidate grid of a family, in scikit-learn `ParameterGrid` order: parameter
/// names sorted, the last one varying fastest.
#[rustfmt::skip]
pub fn param_grid(family: ClassifierFamily) -> Vec<Hyperparameters> {
    match family {
        ClassifierFamily::RandomForest => iproduct!(
            [10, 20, 50, 100],
            [MaxFeatures::Sqrt, MaxFeatures::Log2],
            [20, 50, 100, 200]
        )
        .map(|(max_depth, max_features, n_estimators)| {
            Hyperparameters::RandomForest(RandomForestParams {
                n_estimators,
                max_depth: Some(max_depth),
                max_features,
            })
        })
        .collect(),
        ClassifierFamily::AdaBoost => iproduct!([0.1, 1.0, 5.0, 10.0], [20, 50, 100, 200])
            .map(|(learning_rate, n_estimators)| {
                Hyperparameters::AdaBoost(AdaBoostParams {
                    n_estimators,
                    learning_rate,
                })
            })
            .collect(),
        ClassifierFamily::Svc => iproduct!(
            [0.1, 1.0, 10.0],
            [Kernel::Linear, Kernel::Rbf, Kernel::Sigmoid, Kernel::Poly]
        )
        .map(|(c, kernel)| Hyperparameters::Svc(SvcParams { kernel, c }))
        .collect(),
        ClassifierFamily::Mlp => {
            let hidden: [&[usize]; 8] = [
                &[32], &[64], &[128], &[256], &[512],
                &[512, 64], &[256, 32], &[128, 32],
            ];
            iproduct!([16, 32], hidden, [0.01, 0.001])
                .map(|(batch_size, hidden_layer_sizes, learning_rate_init)| {
                    Hyperparameters::Mlp(MlpParams {
                        hidden_layer_sizes: hidden_layer_sizes.to_vec(),
                        batch_size,
                        learning_rate_init,
                        max_iter: 1000,
                        early_stopping: true,
                    })
                })
                .collect()
        }
    }
}

/// Fit `params` on the fold's training rows and score its test rows.
pub(crate) fn score_fold(
    dataset: &Dataset,
    params: &Hyperparameters,
    fold: &Fold,
    seed: Option<u64>,
) -> Result<f64> {
    let train = dataset.subset(&fold.train);
    let test = dataset.subset(&fold.test);
    let mut model = params.build(seed);
    model.fit(train.features(), train.labels())?;
    let pred = model.predict(test.features())?;
    balanced_accuracy(test.labels(), &pred)
}

/// Cross-validate every candidate on every fold. A failed fit is logged and scored NaN,
/// which makes that candidate's mean NaN.
fn score_candidates(
    dataset: &Dataset,
    candidates: Vec<Hyperparameters>,
    folds: &[Fold],
    seed: Option<u64>,
) -> Vec<CandidateScore> {
    let jobs: Vec<(usize, usize)> = iproduct!(0..candidates.len(), 0..folds.len()).collect();
    let scores: Vec<f64> = jobs
        .par_iter()
        .map(|&(c, f)| match score_fold(dataset, &candidates[c], &folds[f], seed) {
            Ok(score) => score,
            Err(err) => {
                let params = &candidates[c];
                tracing::warn!(
                    "{} {params}: fit failed on fold {f}, scored NaN: {err}",
                    params.family()
                );
                f64::NAN
            }
        })
        .collect();

    candidates
        .into_iter()
        .zip(scores.chunks(folds.len()))
        .map(|(params, fold_scores)| {
            let (mean_score, std_score) = mean_std(fold_scores);
            CandidateScore {
                params,
                mean_score,
                std_score,
                fold_scores: fold_scores.to_vec(),
            }
        })
        .collect()
}

/// Highest finite mean score, the earliest candidate on ties.
fn best_candidate(candidates: &[CandidateScore]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        if !candidate.mean_score.is_finite() {
            continue;
        }
        if best.map_or(true, |b| candidate.mean_score > candidates[b].mean_score) {
            best = Some(idx);
        }
    }
    best
}

/// Score every grid point of `family` with unshuffled stratified k-fold and refit the
/// best one on the full dataset. Ties go to the earliest candidate; a candidate with a
/// failed fit is kept in the report with a NaN score but never selected.
pub fn grid_search(
    dataset: &Dataset,
    family: ClassifierFamily,
    config: &SearchConfig,
) -> Result<SearchResult> {
    let candidates = param_grid(family);
    let folds = CrossValidator::stratified(config.n_splits).split(dataset.labels())?;
    tracing::info!(
        "{family}: fitting {} folds for each of {} candidates, totalling {} fits",
        folds.len(),
        candidates.len(),
        folds.len() * candidates.len()
    );

    let candidates = score_candidates(dataset, candidates, &folds, config.seed);
    let best = best_candidate(&candidates).ok_or_else(|| {
        LearnError::SearchFailed(format!("every {family} candidate failed to fit"))
    })?;
    let best_params = candidates[best].params.clone();
    let best_score = candidates[best].mean_score;
    tracing::info!("{family}: best balanced accuracy {best_score:.4} with {best_params}");

    let mut best_estimator = best_params.build(config.seed);
    best_estimator.fit(dataset.features(), dataset.labels())?;
    Ok(SearchResult {
        family,
        best_params,
        best_score,
        candidates,
        best_estimator,
    })
}

/// Grid search each family in turn.
pub fn search_all(
    dataset: &Dataset,
    families: &[ClassifierFamily],
    config: &SearchConfig,
) -> Result<Vec<SearchResult>> {
    families
        .iter()
        .map(|&family| grid_search(dataset, family, config))
        .collect()
}

pub fn best_parameters(results: &[SearchResult]) -> BestParameters {
    results
        .iter()
        .map(|r| (r.family, r.best_params.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use strum::IntoEnumIterator;

    fn scored(mean_score: f64) -> CandidateScore {
        CandidateScore {
            params: Hyperparameters::Svc(SvcParams::default()),
            mean_score,
            std_score: 0.0,
            fold_scores: vec![mean_score],
        }
    }

    fn separable() -> Result<Dataset> {
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i % 2 == 1)).collect();
        let features = Array2::from_shape_fn((20, 2), |(i, j)| {
            f64::from(labels[i]) * 4.0 + ((i * 3 + j * 5) % 7) as f64 * 0.1
        });
        Dataset::new(features, labels)
    }

    #[test]
    fn test_grid_sizes() {
        let sizes: Vec<usize> = ClassifierFamily::iter()
            .map(|f| param_grid(f).len())
            .collect();
        assert_eq!(sizes, vec![32, 16, 12, 32]);
        for family in ClassifierFamily::iter() {
            assert!(param_grid(family).iter().all(|p| p.family() == family));
        }
    }

    #[test]
    fn test_grid_order() {
        let rf = param_grid(ClassifierFamily::RandomForest);
        // n_estimators varies fastest, then max_features, then max_depth
        assert_eq!(
            rf[0],
            Hyperparameters::RandomForest(RandomForestParams {
                n_estimators: 20,
                max_depth: Some(10),
                max_features: MaxFeatures::Sqrt,
            })
        );
        assert_eq!(
            rf[5],
            Hyperparameters::RandomForest(RandomForestParams {
                n_estimators: 50,
                max_depth: Some(10),
                max_features: MaxFeatures::Log2,
            })
        );
        let svc = param_grid(ClassifierFamily::Svc);
        assert_eq!(svc[1].to_string(), "C=0.1, kernel=rbf");
        assert_eq!(svc[4].to_string(), "C=1, kernel=linear");
        let mlp = param_grid(ClassifierFamily::Mlp);
        assert!(mlp.iter().all(|p| match p {
            Hyperparameters::Mlp(params) => params.max_iter == 1000 && params.early_stopping,
            _ => false,
        }));
        assert_eq!(
            mlp[11],
            Hyperparameters::Mlp(MlpParams {
                hidden_layer_sizes: vec![512, 64],
                batch_size: 16,
                learning_rate_init: 0.001,
                max_iter: 1000,
                early_stopping: true,
            })
        );
    }

    #[test]
    fn test_best_candidate_skips_failed_fits() {
        let candidates: Vec<CandidateScore> = [f64::NAN, 0.7, 0.9, f64::NAN, 0.9]
            .into_iter()
            .map(scored)
            .collect();
        assert_eq!(best_candidate(&candidates), Some(2));
        let failed: Vec<CandidateScore> = [f64::NAN, f64::NAN].into_iter().map(scored).collect();
        assert_eq!(best_candidate(&failed), None);
        assert_eq!(best_candidate(&[]), None);
    }

    #[test]
    fn test_failed_fit_scored_nan() -> Result<()> {
        let dataset = separable()?;
        let folds = CrossValidator::stratified(5).split(dataset.labels())?;
        let candidates = vec![
            Hyperparameters::Svc(SvcParams {
                kernel: Kernel::Linear,
                c: -1.0,
            }),
            Hyperparameters::Svc(SvcParams {
                kernel: Kernel::Linear,
                c: 1.0,
            }),
        ];
        let scores = score_candidates(&dataset, candidates, &folds, Some(0));
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].fold_scores.len(), 5);
        assert!(scores[0].fold_scores.iter().all(|s| s.is_nan()));
        assert!(scores[0].mean_score.is_nan());
        assert!(scores[1].fold_scores.iter().all(|s| s.is_finite()));
        assert!(scores[1].mean_score > 0.9);
        assert_eq!(best_candidate(&scores), Some(1));
        Ok(())
    }

    #[test]
    fn test_every_candidate_failing() -> Result<()> {
        // a constant feature leaves every AdaBoost stump at chance on balanced folds
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i % 2 == 1)).collect();
        let dataset = Dataset::new(Array2::zeros((20, 1)), labels)?;
        let config = SearchConfig::builder().n_splits(5).seed(0).build();
        match grid_search(&dataset, ClassifierFamily::AdaBoost, &config) {
            Err(LearnError::SearchFailed(msg)) => assert!(msg.contains("adaboost")),
            other => panic!(
                "expected a failed search, got {:?}",
                other.map(|r| r.best_score)
            ),
        }
        Ok(())
    }
}
