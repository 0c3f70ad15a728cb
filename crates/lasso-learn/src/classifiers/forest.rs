use super::{seeded_rng, Classifier, DecisionTree};
use crate::dataset::check_xy;
use crate::{LearnError, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            Self::Sqrt => n.sqrt() as usize,
            Self::Log2 => n.log2() as usize,
            Self::All => n_features,
        };
        k.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure.
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
        }
    }
}

/// Bagged CART trees. Each tree sees a bootstrap sample, expressed as integer sample
/// weights, and predictions average the trees' class-1 probabilities.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: RandomForestParams,
    seed: Option<u64>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: RandomForestParams, seed: Option<u64>) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(LearnError::InvalidParameter("random forest is not fitted".to_string()));
        }
        let mut sum = vec![0.0; x.nrows()];
        for tree in &self.trees {
            for (acc, p) in sum.iter_mut().zip(tree.predict_proba(x)?) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(sum.into_iter().map(|s| s / n_trees).collect())
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
        check_xy(x, y)?;
        if self.params.n_estimators == 0 {
            return Err(LearnError::InvalidParameter("n_estimators must be at least 1".to_string()));
        }
        let n = y.len();
        let mut rng = seeded_rng(self.seed);
        let tree_seeds: Vec<u64> = (0..self.params.n_estimators).map(|_| rng.gen()).collect();
        let RandomForestParams {
            max_depth,
            max_features,
            ..
        } = self.params;

        self.trees = tree_seeds
            .into_par_iter()
            .map(|tree_seed| -> Result<DecisionTree> {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let mut weights = vec![0.0; n];
                for _ in 0..n {
                    weights[rng.gen_range(0..n)] += 1.0;
                }
                let mut tree = DecisionTree::new(max_depth, max_features, Some(rng.gen()));
                tree.fit_weighted(x, y, &weights)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect())
    }
}
