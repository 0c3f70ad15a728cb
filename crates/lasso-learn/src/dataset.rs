use crate::{LearnError, Result};
use ndarray::{Array2, ArrayView2, Axis};

/// Feature matrix with row-aligned binary labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<u8>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<u8>) -> Result<Self> {
        check_xy(features.view(), &labels)?;
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of samples per class, `[class 0, class 1]`.
    pub fn class_counts(&self) -> [usize; 2] {
        class_counts(&self.labels)
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

pub(crate) fn class_counts(labels: &[u8]) -> [usize; 2] {
    labels.iter().fold([0, 0], |mut acc, &y| {
        acc[usize::from(y == 1)] += 1;
        acc
    })
}

/// Shared input validation for `fit`: non-empty, aligned, labels in {0, 1}.
pub(crate) fn check_xy(x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(LearnError::ShapeMismatch(format!(
            "{} feature rows but {} labels",
            x.nrows(), y.len()
        )));
    }
    if y.is_empty() || x.ncols() == 0 {
        return Err(LearnError::InsufficientData(
            "at least one sample and one feature are required".to_string(),
        ));
    }
    if let Some(bad) = y.iter().find(|&&v| v > 1) {
        return Err(LearnError::InvalidParameter(format!("labels must be 0 or 1, found {bad}")));
    }
    Ok(())
}

pub(crate) fn check_features(x: ArrayView2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(LearnError::ShapeMismatch(format!(
            "fitted on {expected} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_subset_keeps_alignment() -> Result<()> {
        let ds = Dataset::new(array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]], vec![0, 1, 1])?;
        let sub = ds.subset(&[2, 0]);
        assert_eq!(sub.features(), array![[4.0, 5.0], [0.0, 1.0]]);
        assert_eq!(sub.labels(), &[1, 0]);
        assert_eq!(ds.class_counts(), [1, 2]);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Dataset::new(array![[0.0], [1.0]], vec![0]),
            Err(LearnError::ShapeMismatch(_))
        ));
        assert!(matches!(
            Dataset::new(array![[0.0], [1.0]], vec![0, 2]),
            Err(LearnError::InvalidParameter(_))
        ));
    }
}
