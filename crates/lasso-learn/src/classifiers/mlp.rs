//! Multi-layer perceptron trained with Adam on the binary log-loss.
use super::{seeded_rng, Classifier};
use crate::dataset::{check_features, check_xy};
use crate::{LearnError, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

// L2 penalty on the weights
const ALPHA: f64 = 1e-4;
const TOL: f64 = 1e-4;
const N_ITER_NO_CHANGE: usize = 10;
const VALIDATION_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_layer_sizes: Vec<usize>,
    pub batch_size: usize,
    pub learning_rate_init: f64,
    pub max_iter: usize,
    pub early_stopping: bool,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            batch_size: 200,
            learning_rate_init: 1e-3,
            max_iter: 200,
            early_stopping: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Dense {
    /// [in, out]
    weight: Tensor,
    bias: Tensor,
}

/// ReLU hidden layers and a single logistic output unit.
#[derive(Debug, Clone)]
pub struct Mlp {
    params: MlpParams,
    seed: Option<u64>,
    layers: Vec<Dense>,
    n_features: usize,
    n_iter: usize,
}

impl Mlp {
    pub fn new(params: MlpParams, seed: Option<u64>) -> Self {
        Self {
            params,
            seed,
            layers: Vec::new(),
            n_features: 0,
            n_iter: 0,
        }
    }

    /// Epochs run by the last `fit`.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.hidden_layer_sizes.is_empty() || p.hidden_layer_sizes.contains(&0) {
            return Err(LearnError::InvalidParameter(format!(
                "hidden_layer_sizes must be non-empty and positive, got {:?}",
                p.hidden_layer_sizes
            )));
        }
        if p.batch_size == 0 || p.max_iter == 0 {
            return Err(LearnError::InvalidParameter(
                "batch_size and max_iter must be at least 1".to_string(),
            ));
        }
        if !(p.learning_rate_init > 0.0) {
            return Err(LearnError::InvalidParameter(format!(
                "learning_rate_init must be positive, got {}",
                p.learning_rate_init
            )));
        }
        Ok(())
    }
}

fn to_tensor(x: ArrayView2<f64>, device: &Device) -> candle_core::Result<Tensor> {
    let data: Vec<f32> = x.iter().map(|&v| v as f32).collect();
    Tensor::from_vec(data, (x.nrows(), x.ncols()), device)
}

fn rows(indices: &[usize], device: &Device) -> candle_core::Result<Tensor> {
    let ids: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
    Tensor::from_vec(ids, indices.len(), device)
}

/// Glorot-uniform weights and biases for one layer.
fn glorot(
    fan_in: usize,
    fan_out: usize,
    rng: &mut StdRng,
    device: &Device,
) -> candle_core::Result<(Var, Var)> {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let mut draw = |len: usize| -> Vec<f32> {
        (0..len)
            .map(|_| rng.gen_range(-bound..bound) as f32)
            .collect()
    };
    let weight = Tensor::from_vec(draw(fan_in * fan_out), (fan_in, fan_out), device)?;
    let bias = Tensor::from_vec(draw(fan_out), fan_out, device)?;
    Ok((Var::from_tensor(&weight)?, Var::from_tensor(&bias)?))
}

fn parameters(vars: &[(Var, Var)]) -> impl ExactSizeIterator<Item = (&Tensor, &Tensor)> {
    vars.iter().map(|(w, b)| (w.as_tensor(), b.as_tensor()))
}

fn forward_logits<'a>(
    x: &Tensor,
    layers: impl ExactSizeIterator<Item = (&'a Tensor, &'a Tensor)>,
) -> candle_core::Result<Tensor> {
    let last = layers.len().saturating_sub(1);
    let mut h = x.clone();
    for (idx, (weight, bias)) in layers.enumerate() {
        h = h.matmul(weight)?.broadcast_add(bias)?;
        if idx < last {
            h = h.relu()?;
        }
    }
    Ok(h)
}

/// Mean binary cross-entropy on logits: `max(z, 0) - z*y + log(1 + exp(-|z|))`.
fn log_loss(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let loss = (logits.relu()? - logits.mul(targets)?)?;
    (loss + softplus)?.mean_all()
}

fn l2_penalty(vars: &[(Var, Var)], batch_len: usize) -> candle_core::Result<Tensor> {
    let mut total = Tensor::zeros((), candle_core::DType::F32, vars[0].0.device())?;
    for (weight, _) in vars {
        total = (total + weight.sqr()?.sum_all()?)?;
    }
    total.affine(0.5 * ALPHA / batch_len as f64, 0.0)
}

fn labels_from_logits(logits: &Tensor) -> candle_core::Result<Vec<u8>> {
    Ok(logits
        .flatten_all()?
        .to_vec1::<f32>()?
        .into_iter()
        .map(|z| u8::from(z > 0.0))
        .collect())
}

fn snapshot(vars: &[(Var, Var)]) -> candle_core::Result<Vec<(Tensor, Tensor)>> {
    vars.iter()
        .map(|(w, b)| -> candle_core::Result<(Tensor, Tensor)> {
            Ok((w.as_tensor().copy()?, b.as_tensor().copy()?))
        })
        .collect()
}

/// Stratified hold-out of about `VALIDATION_FRACTION` of each class.
fn stratified_holdout(y: &[u8], rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::with_capacity(y.len());
    let mut validation = Vec::new();
    for class in [0u8, 1] {
        let mut members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        members.shuffle(rng);
        let n_val = (members.len() as f64 * VALIDATION_FRACTION).round() as usize;
        let n_val = n_val.min(members.len().saturating_sub(1));
        validation.extend_from_slice(&members[..n_val]);
        train.extend_from_slice(&members[n_val..]);
    }
    train.sort_unstable();
    validation.sort_unstable();
    (train, validation)
}

impl Classifier for Mlp {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
        check_xy(x, y)?;
        self.validate()?;
        let device = Device::Cpu;
        let mut rng = seeded_rng(self.seed);

        let (train, validation) = if self.params.early_stopping {
            stratified_holdout(y, &mut rng)
        } else {
            ((0..y.len()).collect(), Vec::new())
        };
        if self.params.early_stopping && validation.is_empty() {
            tracing::warn!(
                "too few samples ({}) for a validation split, early stopping disabled",
                y.len()
            );
        }

        let x_all = to_tensor(x, &device)?;
        let targets: Vec<f32> = y.iter().map(|&v| f32::from(v)).collect();
        let y_all = Tensor::from_vec(targets, (y.len(), 1), &device)?;
        let x_val = if validation.is_empty() {
            None
        } else {
            Some(x_all.index_select(&rows(&validation, &device)?, 0)?)
        };
        let y_val: Vec<u8> = validation.iter().map(|&i| y[i]).collect();

        let mut sizes = vec![x.ncols()];
        sizes.extend_from_slice(&self.params.hidden_layer_sizes);
        sizes.push(1);
        let vars = sizes
            .windows(2)
            .map(|w| glorot(w[0], w[1], &mut rng, &device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let mut optimizer = AdamW::new(
            vars.iter()
                .flat_map(|(w, b)| [w.clone(), b.clone()])
                .collect(),
            ParamsAdamW {
                lr: self.params.learning_rate_init,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
                weight_decay: 0.0,
            },
        )?;

        let batch_size = self.params.batch_size.min(train.len());
        let mut order = train;
        let mut best_loss = f64::INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_weights = None;
        let mut no_improvement = 0;
        let mut converged = false;
        self.n_iter = 0;

        for epoch in 0..self.params.max_iter {
            order.shuffle(&mut rng);
            let mut accumulated = 0.0;
            for batch in order.chunks(batch_size) {
                let ids = rows(batch, &device)?;
                let xb = x_all.index_select(&ids, 0)?;
                let yb = y_all.index_select(&ids, 0)?;
                let logits = forward_logits(&xb, parameters(&vars))?;
                let loss = (log_loss(&logits, &yb)? + l2_penalty(&vars, batch.len())?)?;
                optimizer.backward_step(&loss)?;
                accumulated += f64::from(loss.to_scalar::<f32>()?) * batch.len() as f64;
            }
            let epoch_loss = accumulated / order.len() as f64;
            self.n_iter = epoch + 1;
            if !epoch_loss.is_finite() {
                tracing::warn!(
                    "MLP training loss diverged at epoch {epoch} (learning_rate_init={})",
                    self.params.learning_rate_init
                );
                break;
            }

            match &x_val {
                Some(x_val) => {
                    let logits = forward_logits(x_val, parameters(&vars))?;
                    let pred = labels_from_logits(&logits)?;
                    let correct = pred.iter().zip(&y_val).filter(|(p, t)| p == t).count();
                    let score = correct as f64 / y_val.len() as f64;
                    if score < best_score + TOL {
                        no_improvement += 1;
                    } else {
                        no_improvement = 0;
                    }
                    if score > best_score {
                        best_score = score;
                        best_weights = Some(snapshot(&vars)?);
                    }
                }
                None => {
                    if epoch_loss > best_loss - TOL {
                        no_improvement += 1;
                    } else {
                        no_improvement = 0;
                    }
                    best_loss = best_loss.min(epoch_loss);
                }
            }
            if no_improvement > N_ITER_NO_CHANGE {
                converged = true;
                break;
            }
        }
        if !converged {
            tracing::debug!(
                "MLP reached max_iter={} without converging",
                self.params.max_iter
            );
        }

        if let Some(best) = best_weights {
            for ((w, b), (best_w, best_b)) in vars.iter().zip(best) {
                w.set(&best_w)?;
                b.set(&best_b)?;
            }
        }
        self.layers = snapshot(&vars)?
            .into_iter()
            .map(|(weight, bias)| Dense { weight, bias })
            .collect();
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        if self.layers.is_empty() {
            return Err(LearnError::InvalidParameter("MLP is not fitted".to_string()));
        }
        check_features(x, self.n_features)?;
        let xs = to_tensor(x, &Device::Cpu)?;
        let logits = forward_logits(&xs, self.layers.iter().map(|l| (&l.weight, &l.bias)))?;
        Ok(labels_from_logits(&logits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;

    fn blobs(n: usize) -> (Array2<f64>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(11);
        let mut x = Array2::zeros((n, 4));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let label = u8::from(i % 3 == 0);
            for j in 0..4 {
                let center = if label == 1 { 1.5 } else { -1.5 };
                x[[i, j]] = center + rng.gen_range(-1.0..1.0);
            }
            y.push(label);
        }
        (x, y)
    }

    fn params(early_stopping: bool) -> MlpParams {
        MlpParams {
            hidden_layer_sizes: vec![8],
            batch_size: 16,
            learning_rate_init: 0.01,
            max_iter: 200,
            early_stopping,
        }
    }

    #[test]
    fn test_log_loss() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0f32], [2.0], [-3.0]], &device)?;
        let targets = Tensor::new(&[[1f32], [0.0], [0.0]], &device)?;
        let got = log_loss(&logits, &targets)?.to_scalar::<f32>()?;
        let expected = (2f32.ln() + (1.0 + 2f32.exp()).ln() + (1.0 + (-3f32).exp()).ln()) / 3.0;
        assert!((got - expected).abs() < 1e-5, "{got} vs {expected}");
        Ok(())
    }

    fn training_accuracy(mlp: &Mlp, x: &Array2<f64>, y: &[u8]) -> Result<f64> {
        let pred = mlp.predict(x.view())?;
        let correct = pred.iter().zip(y).filter(|(p, t)| p == t).count();
        Ok(correct as f64 / y.len() as f64)
    }

    #[test]
    fn test_learns_blobs() -> Result<()> {
        let (x, y) = blobs(60);
        let mut mlp = Mlp::new(params(false), Some(42));
        mlp.fit(x.view(), &y)?;
        assert!(mlp.n_iter() > N_ITER_NO_CHANGE);
        let acc = training_accuracy(&mlp, &x, &y)?;
        assert!(acc >= 0.95, "{acc}");
        Ok(())
    }

    #[test]
    fn test_learns_blobs_with_early_stopping() -> Result<()> {
        // large enough that a perfect validation score means a trained network
        let (x, y) = blobs(300);
        let mut mlp = Mlp::new(params(true), Some(42));
        mlp.fit(x.view(), &y)?;
        assert!(mlp.n_iter() < 200);
        let acc = training_accuracy(&mlp, &x, &y)?;
        assert!(acc >= 0.95, "{acc}");
        Ok(())
    }

    #[test]
    fn test_seeded_fit_is_reproducible() -> Result<()> {
        let (x, y) = blobs(30);
        let mut a = Mlp::new(params(true), Some(5));
        let mut b = Mlp::new(params(true), Some(5));
        a.fit(x.view(), &y)?;
        b.fit(x.view(), &y)?;
        assert_eq!(a.n_iter(), b.n_iter());
        assert_eq!(a.predict(x.view())?, b.predict(x.view())?);
        Ok(())
    }

    #[test]
    fn test_holdout_is_stratified() {
        let y: Vec<u8> = (0..50).map(|i| u8::from(i < 20)).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let (train, validation) = stratified_holdout(&y, &mut rng);
        assert_eq!(validation.len(), 5);
        assert_eq!(validation.iter().filter(|&&i| y[i] == 1).count(), 2);
        assert_eq!(train.len() + validation.len(), 50);
    }

    #[test]
    fn test_invalid_params() {
        let (x, y) = blobs(10);
        let mut mlp = Mlp::new(
            MlpParams {
                hidden_layer_sizes: vec![],
                ..params(false)
            },
            None,
        );
        assert!(matches!(mlp.fit(x.view(), &y), Err(LearnError::InvalidParameter(_))));
    }
}
