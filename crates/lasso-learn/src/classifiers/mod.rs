//! Binary classifiers over dense feature matrices.
//!
//! Defaults for everything a grid does not set follow scikit-learn, so that a parameter
//! record selected by the search means the same thing it does there.
mod adaboost;
mod forest;
mod mlp;
mod svm;
mod tree;

pub use adaboost::{AdaBoost, AdaBoostParams};
pub use forest::{MaxFeatures, RandomForest, RandomForestParams};
pub use mlp::{Mlp, MlpParams};
pub use svm::{Kernel, Svc, SvcParams};
pub use tree::DecisionTree;

use crate::Result;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

pub trait Classifier: fmt::Debug + Send {
    /// Fit on rows of `x` with labels in {0, 1}. Refitting discards the previous model.
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()>;

    /// Predict a label for every row of `x`.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>>;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClassifierFamily {
    #[serde(rename = "rf")]
    #[strum(serialize = "rf")]
    RandomForest,
    AdaBoost,
    Svc,
    Mlp,
}

/// One point of a family's grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Hyperparameters {
    #[serde(rename = "rf")]
    RandomForest(RandomForestParams),
    AdaBoost(AdaBoostParams),
    Svc(SvcParams),
    Mlp(MlpParams),
}

impl Hyperparameters {
    pub fn family(&self) -> ClassifierFamily {
        match self {
            Self::RandomForest(_) => ClassifierFamily::RandomForest,
            Self::AdaBoost(_) => ClassifierFamily::AdaBoost,
            Self::Svc(_) => ClassifierFamily::Svc,
            Self::Mlp(_) => ClassifierFamily::Mlp,
        }
    }

    /// An unfitted classifier. `None` draws the seed from OS entropy at fit time.
    pub fn build(&self, seed: Option<u64>) -> Box<dyn Classifier> {
        match self {
            Self::RandomForest(p) => Box::new(RandomForest::new(p.clone(), seed)),
            Self::AdaBoost(p) => Box::new(AdaBoost::new(p.clone(), seed)),
            Self::Svc(p) => Box::new(Svc::new(p.clone())),
            Self::Mlp(p) => Box::new(Mlp::new(p.clone(), seed)),
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandomForest(p) => write!(
                f,
                "max_depth={}, max_features={}, n_estimators={}",
                p.max_depth
                    .map_or_else(|| "None".to_string(), |d| d.to_string()),
                p.max_features,
                p.n_estimators
            ),
            Self::AdaBoost(p) => write!(
                f,
                "learning_rate={}, n_estimators={}",
                p.learning_rate, p.n_estimators
            ),
            Self::Svc(p) => write!(f, "C={}, kernel={}", p.c, p.kernel),
            Self::Mlp(p) => {
                write!(
                    f,
                    "batch_size={}, early_stopping={}, hidden_layer_sizes={:?}, ",
                    p.batch_size, p.early_stopping, p.hidden_layer_sizes
                )?;
                write!(
                    f,
                    "learning_rate_init={}, max_iter={}",
                    p.learning_rate_init, p.max_iter
                )
            }
        }
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
