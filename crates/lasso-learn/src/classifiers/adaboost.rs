use super::{seeded_rng, Classifier, DecisionTree};
use crate::dataset::{check_xy, class_counts};
use crate::{LearnError, Result};
use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
        }
    }
}

/// Discrete AdaBoost (SAMME with two classes) over decision stumps.
#[derive(Debug, Clone)]
pub struct AdaBoost {
    params: AdaBoostParams,
    seed: Option<u64>,
    estimators: Vec<DecisionTree>,
    estimator_weights: Vec<f64>,
}

impl AdaBoost {
    pub fn new(params: AdaBoostParams, seed: Option<u64>) -> Self {
        Self {
            params,
            seed,
            estimators: Vec::new(),
            estimator_weights: Vec::new(),
        }
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }

    pub fn estimator_weights(&self) -> &[f64] {
        &self.estimator_weights
    }

    /// Weighted vote: positive favours class 1.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        if self.estimators.is_empty() {
            return Err(LearnError::InvalidParameter("AdaBoost is not fitted".to_string()));
        }
        let mut votes = vec![0.0; x.nrows()];
        for (stump, &alpha) in self.estimators.iter().zip(&self.estimator_weights) {
            for (vote, label) in votes.iter_mut().zip(stump.predict(x)?) {
                *vote += if label == 1 { alpha } else { -alpha };
            }
        }
        Ok(votes)
    }
}

impl Classifier for AdaBoost {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
        check_xy(x, y)?;
        let AdaBoostParams {
            n_estimators,
            learning_rate,
        } = self.params;
        if n_estimators == 0 {
            return Err(LearnError::InvalidParameter("n_estimators must be at least 1".to_string()));
        }
        if !(learning_rate > 0.0) {
            return Err(LearnError::InvalidParameter(format!(
                "learning_rate must be positive, got {learning_rate}"
            )));
        }
        if class_counts(y).contains(&0) {
            return Err(LearnError::InsufficientData(
                "AdaBoost needs samples of both classes".to_string(),
            ));
        }
        self.estimators.clear();
        self.estimator_weights.clear();

        let n = y.len();
        let mut rng = seeded_rng(self.seed);
        let mut sample_weight = vec![1.0 / n as f64; n];
        for iboost in 0..n_estimators {
            let mut stump = DecisionTree::stump(Some(rng.gen()));
            stump.fit_weighted(x, y, &sample_weight)?;
            let incorrect: Vec<bool> = stump
                .predict(x)?
                .iter()
                .zip(y)
                .map(|(p, t)| p != t)
                .collect();
            let total: f64 = sample_weight.iter().sum();
            let error = incorrect
                .iter()
                .zip(&sample_weight)
                .filter(|(&miss, _)| miss)
                .map(|(_, w)| w)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                self.estimators.push(stump);
                self.estimator_weights.push(1.0);
                break;
            }
            // no better than chance for two classes
            if error >= 0.5 {
                if self.estimators.is_empty() {
                    return Err(LearnError::DegenerateEnsemble(format!(
                        "the first base estimator has error {error:.3}, no better than chance"
                    )));
                }
                tracing::debug!(
                    "AdaBoost stopped at iteration {iboost}: estimator error {error:.3}"
                );
                break;
            }

            let alpha = learning_rate * ((1.0 - error) / error).ln();
            self.estimators.push(stump);
            self.estimator_weights.push(alpha);
            if iboost + 1 == n_estimators {
                break;
            }

            for (w, &miss) in sample_weight.iter_mut().zip(&incorrect) {
                if miss && *w > 0.0 {
                    *w *= alpha.exp();
                }
            }
            let total: f64 = sample_weight.iter().sum();
            if !total.is_finite() {
                tracing::warn!(
                    "sample weights are not finite at iteration {iboost}, boosting stopped early"
                );
                break;
            }
            if total <= 0.0 {
                break;
            }
            sample_weight.iter_mut().for_each(|w| *w /= total);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|v| u8::from(v > 0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_perfect_stump_stops_early() -> Result<()> {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [0, 0, 1, 1];
        let mut model = AdaBoost::new(AdaBoostParams::default(), Some(0));
        model.fit(x.view(), &y)?;
        assert_eq!(model.n_estimators_fitted(), 1);
        assert_eq!(model.estimator_weights(), &[1.0]);
        assert_eq!(model.predict(x.view())?, y.to_vec());
        Ok(())
    }

    #[test]
    fn test_boosting_combines_stumps() -> Result<()> {
        // an interval on one axis is not a single threshold
        let x: Array2<f64> = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let y: Vec<u8> = (0..12).map(|i| u8::from((3..9).contains(&i))).collect();
        let params = AdaBoostParams {
            n_estimators: 50,
            learning_rate: 1.0,
        };
        let mut model = AdaBoost::new(params, Some(1));
        model.fit(x.view(), &y)?;
        assert!(model.n_estimators_fitted() > 1);
        assert_eq!(model.predict(x.view())?, y);
        Ok(())
    }

    #[test]
    fn test_large_learning_rate_does_not_panic() -> Result<()> {
        let x: Array2<f64> = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let y: Vec<u8> = (0..12).map(|i| u8::from((3..9).contains(&i))).collect();
        let params = AdaBoostParams {
            n_estimators: 200,
            learning_rate: 10.0,
        };
        let mut model = AdaBoost::new(params, Some(2));
        model.fit(x.view(), &y)?;
        assert!(model.n_estimators_fitted() >= 1);
        assert_eq!(model.predict(x.view())?.len(), 12);
        Ok(())
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[0.0], [1.0]];
        let mut model = AdaBoost::new(AdaBoostParams::default(), None);
        assert!(model.fit(x.view(), &[1, 1]).is_err());
    }
}
