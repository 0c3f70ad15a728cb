//! lasso-learn
//!
//! Binary classifiers over embedding matrices, with the model selection around them.
//!
//! - [`classifiers`]: random forest, AdaBoost, support vector and multilayer perceptron
//!   classifiers behind the [`Classifier`] trait.
//! - [`grid_search`]: every grid point of a family scored by 10-fold balanced accuracy.
//! - [`evaluate`]: the selected parameters scored over 5 × 10-fold repeated stratified
//!   cross-validation, every score tagged with its repeat and fold.
//!
//! ```no_run
//! # fn main() -> lasso_learn::Result<()> {
//! use lasso_learn::{best_parameters, evaluate, search_all, ClassifierFamily, Dataset};
//! use lasso_learn::{EvaluationConfig, SearchConfig};
//! # let features = ndarray::Array2::<f64>::zeros((40, 8));
//! # let labels: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
//! let dataset = Dataset::new(features, labels)?;
//! let families = [ClassifierFamily::RandomForest];
//! let results = search_all(&dataset, &families, &SearchConfig::default())?;
//! let cv = evaluate(&dataset, &best_parameters(&results), &EvaluationConfig::default())?;
//! for family in cv.summary() {
//!     println!("{}: {:.3}", family.family, family.mean);
//! }
//! # Ok(())
//! # }
//! ```
pub mod classifiers;
mod dataset;
mod error;
mod evaluate;
mod metrics;
mod model_selection;
mod search;

pub use classifiers::{
    AdaBoost, AdaBoostParams, Classifier, ClassifierFamily, DecisionTree, Hyperparameters,
    Kernel, MaxFeatures, Mlp, MlpParams, RandomForest, RandomForestParams, Svc, SvcParams,
};
pub use dataset::Dataset;
pub use error::{LearnError, Result};
pub use evaluate::{
    evaluate, reshape_repeat_major, CrossValidationResult, EvaluationConfig, FamilySummary,
    FoldScore,
};
pub use metrics::{balanced_accuracy, mean_std};
pub use model_selection::{CrossValidator, Fold};
pub use search::{
    best_parameters, grid_search, param_grid, search_all, BestParameters, CandidateScore,
    SearchConfig, SearchResult,
};
