//! CART decision tree (Gini impurity, weighted samples).
use super::{seeded_rng, Classifier, MaxFeatures};
use crate::dataset::{check_features, check_xy};
use crate::{LearnError, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

// Feature values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Weighted fraction of class 1.
        proba: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted impurity decrease (up to a constant).
    gain: f64,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    max_depth: Option<usize>,
    max_features: MaxFeatures,
    seed: Option<u64>,
    nodes: Vec<Node>,
    n_features: usize,
}

impl DecisionTree {
    pub fn new(max_depth: Option<usize>, max_features: MaxFeatures, seed: Option<u64>) -> Self {
        Self {
            max_depth,
            max_features,
            seed,
            nodes: Vec::new(),
            n_features: 0,
        }
    }

    /// Depth-one tree over all features, the AdaBoost base learner.
    pub fn stump(seed: Option<u64>) -> Self {
        Self::new(Some(1), MaxFeatures::All, seed)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + depth_of(nodes, left).max(depth_of(nodes, right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            depth_of(&self.nodes, 0)
        }
    }

    /// Fit with per-sample weights. Samples with zero weight are ignored.
    pub fn fit_weighted(&mut self, x: ArrayView2<f64>, y: &[u8], weights: &[f64]) -> Result<()> {
        check_xy(x, y)?;
        if weights.len() != y.len() {
            return Err(LearnError::ShapeMismatch(format!(
                "{} sample weights for {} samples",
                weights.len(), y.len()
            )));
        }
        if let Some(0) = self.max_depth {
            return Err(LearnError::InvalidParameter("max_depth must be at least 1".to_string()));
        }
        let samples: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();
        if samples.is_empty() {
            return Err(LearnError::InsufficientData("all sample weights are zero".to_string()));
        }
        self.n_features = x.ncols();
        self.nodes.clear();
        let mut builder = TreeBuilder {
            x: x.reborrow(),
            y,
            weights,
            max_depth: self.max_depth,
            max_features: self.max_features.resolve(x.ncols()),
            rng: seeded_rng(self.seed),
            nodes: Vec::new(),
        };
        builder.build(samples, 0);
        self.nodes = builder.nodes;
        Ok(())
    }

    /// Probability of class 1 for every row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        if self.nodes.is_empty() {
            return Err(LearnError::InvalidParameter("decision tree is not fitted".to_string()));
        }
        check_features(x, self.n_features)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                let mut idx = 0;
                loop {
                    match self.nodes[idx] {
                        Node::Leaf { proba } => return proba,
                        Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => idx = if row[feature] <= threshold { left } else { right },
                    }
                }
            })
            .collect())
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
        self.fit_weighted(x, y, &vec![1.0; y.len()])
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect())
    }
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: &'a [u8],
    weights: &'a [f64],
    max_depth: Option<usize>,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let (p0, p1) = (w0 / total, w1 / total);
    1.0 - p0 * p0 - p1 * p1
}

impl TreeBuilder<'_> {
    fn class_weights(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(w0, w1), &i| {
            if self.y[i] == 1 {
                (w0, w1 + self.weights[i])
            } else {
                (w0 + self.weights[i], w1)
            }
        })
    }

    /// Appends the subtree for `samples` and returns its root index.
    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let (w0, w1) = self.class_weights(&samples);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            proba: w1 / (w0 + w1),
        });

        let at_max_depth = self.max_depth.is_some_and(|d| depth >= d);
        if at_max_depth || samples.len() < 2 || gini(w0, w1) <= f64::EPSILON {
            return idx;
        }
        let Some(split) = self.best_split(&samples, w0, w1) else {
            return idx;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    /// Features are visited in random order; the search stops once `max_features` have
    /// been tried and at least one of them gave a valid split.
    fn best_split(&mut self, samples: &[usize], w0: f64, w1: f64) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if self.max_features < n_features {
            features.shuffle(&mut self.rng);
        }
        let parent = (w0 + w1) * gini(w0, w1);

        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let (mut l0, mut l1) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                if self.y[i] == 1 {
                    l1 += self.weights[i];
                } else {
                    l0 += self.weights[i];
                }
                let here = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if next <= here + FEATURE_THRESHOLD {
                    continue;
                }
                let (r0, r1) = (w0 - l0, w1 - l1);
                let children = (l0 + l1) * gini(l0, l1) + (r0 + r1) * gini(r0, r1);
                let gain = parent - children;
                if best.map_or(true, |b| gain > b.gain) {
                    let mut threshold = here / 2.0 + next / 2.0;
                    if threshold == next || !threshold.is_finite() {
                        threshold = here;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}
