//! C-support vector classification.
//!
//! The dual is solved with SMO using LIBSVM's second-order working set selection
//! (Fan, Chen & Lin 2005) over a precomputed kernel matrix.
use super::Classifier;
use crate::dataset::{check_features, check_xy, class_counts};
use crate::{LearnError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use strum::Display;

const TOLERANCE: f64 = 1e-3;
const TAU: f64 = 1e-12;
const POLY_DEGREE: i32 = 3;
const COEF0: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf,
    Sigmoid,
    Poly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcParams {
    pub kernel: Kernel,
    #[serde(rename = "C")]
    pub c: f64,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            c: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct SupportVectors {
    vectors: Array2<f64>,
    /// `alpha_i * y_i`
    dual_coef: Array1<f64>,
    rho: f64,
    gamma: f64,
}

#[derive(Debug, Clone)]
pub struct Svc {
    params: SvcParams,
    model: Option<SupportVectors>,
}

impl Svc {
    pub fn new(params: SvcParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    pub fn n_support(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.vectors.nrows())
    }

    /// Signed distance to the separating surface; positive means class 1.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| LearnError::InvalidParameter("SVC is not fitted".to_string()))?;
        check_features(x, model.vectors.ncols())?;
        let k = kernel_matrix(self.params.kernel, model.gamma, x, model.vectors.view());
        Ok(k.dot(&model.dual_coef)
            .iter()
            .map(|v| v - model.rho)
            .collect())
    }
}

/// `gamma = "scale"`: `1 / (n_features * var(X))`.
fn scale_gamma(x: ArrayView2<f64>) -> f64 {
    let var = x.var(0.0);
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

fn kernel_matrix(
    kernel: Kernel,
    gamma: f64,
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
) -> Array2<f64> {
    let dot = a.dot(&b.t());
    match kernel {
        Kernel::Linear => dot,
        Kernel::Poly => dot.mapv(|v| (gamma * v + COEF0).powi(POLY_DEGREE)),
        Kernel::Sigmoid => dot.mapv(|v| (gamma * v + COEF0).tanh()),
        Kernel::Rbf => {
            let a_sq = a.map_axis(Axis(1), |r| r.dot(&r));
            let b_sq = b.map_axis(Axis(1), |r| r.dot(&r));
            let mut k = dot;
            for ((i, j), v) in k.indexed_iter_mut() {
                let dist = (a_sq[i] + b_sq[j] - 2.0 * *v).max(0.0);
                *v = (-gamma * dist).exp();
            }
            k
        }
    }
}

struct Solution {
    alpha: Vec<f64>,
    rho: f64,
}

/// Dual SMO: min 0.5 aᵀQa - eᵀa, 0 <= a <= C, yᵀa = 0, with Q_ij = y_i y_j K_ij.
fn solve_smo(k: &Array2<f64>, y: &[f64], c: f64) -> Solution {
    let n = y.len();
    let q = |i: usize, j: usize| y[i] * y[j] * k[[i, j]];
    let qd: Vec<f64> = (0..n).map(|i| k[[i, i]]).collect();
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let is_upper = |a: f64| a >= c;
    let is_lower = |a: f64| a <= 0.0;

    let max_iter = (100 * n).max(10_000_000);
    let mut iter = 0;
    while iter < max_iter {
        // i: maximal violating index in I_up
        let mut gmax = f64::NEG_INFINITY;
        let mut gmax_idx = None;
        for t in 0..n {
            if y[t] > 0.0 {
                if !is_upper(alpha[t]) && -grad[t] >= gmax {
                    gmax = -grad[t];
                    gmax_idx = Some(t);
                }
            } else if !is_lower(alpha[t]) && grad[t] >= gmax {
                gmax = grad[t];
                gmax_idx = Some(t);
            }
        }
        // j: second-order gain among I_low
        let mut gmax2 = f64::NEG_INFINITY;
        let mut gmin_idx = None;
        let mut obj_diff_min = f64::INFINITY;
        if let Some(i) = gmax_idx {
            for t in 0..n {
                let (grad_diff, quad_coef) = if y[t] > 0.0 {
                    if is_lower(alpha[t]) {
                        continue;
                    }
                    gmax2 = gmax2.max(grad[t]);
                    (gmax + grad[t], qd[i] + qd[t] - 2.0 * y[i] * q(i, t))
                } else {
                    if is_upper(alpha[t]) {
                        continue;
                    }
                    gmax2 = gmax2.max(-grad[t]);
                    (gmax - grad[t], qd[i] + qd[t] + 2.0 * y[i] * q(i, t))
                };
                if grad_diff > 0.0 {
                    let quad = if quad_coef > 0.0 { quad_coef } else { TAU };
                    let obj_diff = -(grad_diff * grad_diff) / quad;
                    if obj_diff <= obj_diff_min {
                        gmin_idx = Some(t);
                        obj_diff_min = obj_diff;
                    }
                }
            }
        }
        let (i, j) = match (gmax_idx, gmin_idx) {
            (Some(i), Some(j)) if gmax + gmax2 >= TOLERANCE => (i, j),
            _ => break,
        };
        iter += 1;

        let (old_ai, old_aj) = (alpha[i], alpha[j]);
        if y[i] != y[j] {
            let quad = qd[i] + qd[j] + 2.0 * q(i, j);
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let quad = qd[i] + qd[j] - 2.0 * q(i, j);
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (d_ai, d_aj) = (alpha[i] - old_ai, alpha[j] - old_aj);
        for t in 0..n {
            grad[t] += q(i, t) * d_ai + q(j, t) * d_aj;
        }
    }
    if iter >= max_iter {
        tracing::warn!("SVC solver reached the iteration limit ({max_iter}) before converging");
    }

    // rho: average of y*G over free vectors, else the midpoint of the feasible range
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let (mut sum_free, mut n_free) = (0.0, 0usize);
    for t in 0..n {
        let yg = y[t] * grad[t];
        if is_upper(alpha[t]) {
            if y[t] < 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else if is_lower(alpha[t]) {
            if y[t] > 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            n_free += 1;
            sum_free += yg;
        }
    }
    let rho = if n_free > 0 {
        sum_free / n_free as f64
    } else {
        (upper + lower) / 2.0
    };
    Solution { alpha, rho }
}

impl Classifier for Svc {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
        check_xy(x, y)?;
        if !(self.params.c > 0.0) {
            return Err(LearnError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.params.c
            )));
        }
        if class_counts(y).contains(&0) {
            return Err(LearnError::InsufficientData(
                "SVC needs samples of both classes".to_string(),
            ));
        }
        let gamma = scale_gamma(x);
        let k = kernel_matrix(self.params.kernel, gamma, x, x);
        let signs: Vec<f64> = y.iter().map(|&v| if v == 1 { 1.0 } else { -1.0 }).collect();
        let Solution { alpha, rho } = solve_smo(&k, &signs, self.params.c);

        let support: Vec<usize> = (0..y.len()).filter(|&i| alpha[i] > 0.0).collect();
        let dual_coef = support.iter().map(|&i| alpha[i] * signs[i]).collect();
        self.model = Some(SupportVectors {
            vectors: x.select(Axis(0), &support),
            dual_coef,
            rho,
            gamma,
        });
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
    use ndarray::array;

    #[test]
    fn test_scale_gamma() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // var over all entries is 1
        assert!((scale_gamma(x.view()) - 0.5).abs() < 1e-12);
        assert_eq!(scale_gamma(array![[3.0], [3.0]].view()), 1.0);
    }

    #[test]
    fn test_linear_margin() -> Result<()> {
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [3.0, 3.0],
            [4.0, 3.0],
            [3.0, 4.0],
        ];
        let y = [0, 0, 0, 1, 1, 1];
        let mut svc = Svc::new(SvcParams {
            kernel: Kernel::Linear,
            c: 10.0,
        });
        svc.fit(x.view(), &y)?;
        assert_eq!(svc.predict(x.view())?, y.to_vec());
        assert!(svc.n_support() >= 2 && svc.n_support() < 6);
        let d = svc.decision_function(array![[2.0, 2.0], [0.5, 0.5]].view())?;
        assert!(d[0] > 0.0 && d[1] < 0.0, "{d:?}");
        Ok(())
    }

    #[test]
    fn test_rbf_ring() -> Result<()> {
        // class 1 inside, class 0 on a surrounding ring
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for k in 0..16 {
            let angle = k as f64 * std::f64::consts::PI / 8.0;
            rows.extend([3.0 * angle.cos(), 3.0 * angle.sin()]);
            y.push(0);
            rows.extend([0.3 * angle.cos(), 0.3 * angle.sin()]);
            y.push(1);
        }
        let x = Array2::from_shape_vec((32, 2), rows)
            .map_err(|e| LearnError::ShapeMismatch(e.to_string()))?;
        let mut svc = Svc::new(SvcParams {
            kernel: Kernel::Rbf,
            c: 10.0,
        });
        svc.fit(x.view(), &y)?;
        assert_eq!(svc.predict(x.view())?, y);
        Ok(())
    }

    #[test]
    fn test_sigmoid_runs() -> Result<()> {
        let x = array![[0.0, 1.0], [1.0, 0.0], [-1.0, 0.0], [0.0, -1.0]];
        let mut svc = Svc::new(SvcParams {
            kernel: Kernel::Sigmoid,
            c: 0.1,
        });
        svc.fit(x.view(), &[1, 1, 0, 0])?;
        assert_eq!(svc.predict(x.view())?.len(), 4);
        Ok(())
    }
}
