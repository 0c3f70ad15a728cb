//! K-fold splitters.
//!
//! Stratified allocation follows scikit-learn's `StratifiedKFold`: classes are encoded in
//! order of first appearance, the sorted label vector is dealt round-robin over the folds
//! to fix how many members of each class every fold receives, and each class's fold
//! assignments are (optionally) shuffled.
use crate::dataset::class_counts;
use crate::{LearnError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

/// One train/test split tagged with its position in a repeated cross-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fold {
    pub repeat: usize,
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossValidator {
    pub n_splits: usize,
    pub n_repeats: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub stratified: bool,
}

impl CrossValidator {
    /// Unshuffled stratified k-fold, a single repeat.
    pub fn stratified(n_splits: usize) -> Self {
        Self {
            n_splits,
            n_repeats: 1,
            shuffle: false,
            seed: None,
            stratified: true,
        }
    }

    /// Repeated stratified k-fold: a fresh shuffled partition per repeat, all drawn
    /// from one RNG stream seeded once.
    pub fn repeated_stratified(n_splits: usize, n_repeats: usize, seed: u64) -> Self {
        Self {
            n_splits,
            n_repeats,
            shuffle: true,
            seed: Some(seed),
            stratified: true,
        }
    }

    /// Plain k-fold over contiguous (optionally shuffled) blocks.
    pub fn kfold(n_splits: usize, shuffle: bool, seed: Option<u64>) -> Self {
        Self {
            n_splits,
            n_repeats: 1,
            shuffle,
            seed,
            stratified: false,
        }
    }

    pub fn n_folds(&self) -> usize {
        self.n_splits * self.n_repeats
    }

    /// All folds, repeat-major. Test sets are sorted; train is the complement.
    pub fn split(&self, labels: &[u8]) -> Result<Vec<Fold>> {
        let n = labels.len();
        if self.n_splits < 2 {
            return Err(LearnError::InvalidParameter(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.n_repeats == 0 {
            return Err(LearnError::InvalidParameter("n_repeats must be at least 1".to_string()));
        }
        if self.n_splits > n {
            return Err(LearnError::InsufficientData(format!(
                "cannot split {n} samples into {} folds",
                self.n_splits
            )));
        }
        if self.stratified {
            check_class_sizes(labels, self.n_splits)?;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut folds = Vec::with_capacity(self.n_folds());
        for repeat in 0..self.n_repeats {
            let rng = self.shuffle.then_some(&mut rng);
            let test_sets = if self.stratified {
                stratified_test_sets(labels, self.n_splits, rng)
            } else {
                kfold_test_sets(n, self.n_splits, rng)
            };
            for (fold, test) in test_sets.into_iter().enumerate() {
                let mut in_test = vec![false; n];
                test.iter().for_each(|&i| in_test[i] = true);
                let train = (0..n).filter(|&i| !in_test[i]).collect();
                folds.push(Fold {
                    repeat,
                    fold,
                    train,
                    test,
                });
            }
        }
        Ok(folds)
    }
}

fn check_class_sizes(labels: &[u8], n_splits: usize) -> Result<()> {
    let counts: Vec<usize> = class_counts(labels)
        .into_iter()
        .filter(|&c| c > 0)
        .collect();
    if counts.iter().all(|&c| c < n_splits) {
        return Err(LearnError::InsufficientData(format!(
            "n_splits={n_splits} cannot be greater than the number of members in each class"
        )));
    }
    if let Some(&smallest) = counts.iter().min() {
        if smallest < n_splits {
            tracing::warn!(
                "the least populated class has {smallest} members, fewer than n_splits={n_splits}"
            );
        }
    }
    Ok(())
}

fn kfold_test_sets(n: usize, n_splits: usize, rng: Option<&mut StdRng>) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..n).collect();
    if let Some(rng) = rng {
        indices.shuffle(rng);
    }
    let mut start = 0;
    (0..n_splits)
        .map(|k| {
            let size = n / n_splits + usize::from(k < n % n_splits);
            let mut test = indices[start..start + size].to_vec();
            test.sort_unstable();
            start += size;
            test
        })
        .collect()
}

fn stratified_test_sets(
    labels: &[u8],
    n_splits: usize,
    mut rng: Option<&mut StdRng>,
) -> Vec<Vec<usize>> {
    // classes in order of first appearance
    let mut classes: Vec<u8> = Vec::new();
    for &y in labels {
        if !classes.contains(&y) {
            classes.push(y);
        }
    }
    let encoded: Vec<usize> = labels
        .iter()
        .map(|y| classes.iter().position(|c| c == y).unwrap_or_default())
        .collect();
    let mut sorted = encoded.clone();
    sorted.sort_unstable();

    // allocation[fold][class]: members of `class` among sorted[fold::n_splits]
    let mut allocation = vec![vec![0usize; classes.len()]; n_splits];
    for (pos, &class) in sorted.iter().enumerate() {
        allocation[pos % n_splits][class] += 1;
    }

    let mut test_fold = vec![0usize; labels.len()];
    for class in 0..classes.len() {
        let mut folds_for_class: Vec<usize> = (0..n_splits)
            .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]))
            .collect();
        if let Some(rng) = rng.as_deref_mut() {
            folds_for_class.shuffle(rng);
        }
        let members = encoded
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == class)
            .map(|(i, _)| i);
        for (sample, fold) in members.zip(folds_for_class) {
            test_fold[sample] = fold;
        }
    }

    (0..n_splits)
        .map(|fold| (0..labels.len()).filter(|&i| test_fold[i] == fold).collect())
        .collect()
}
