use crate::{LearnError, Result};

/// Mean per-class recall over the classes present in `y_true`.
pub fn balanced_accuracy(y_true: &[u8], y_pred: &[u8]) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(LearnError::ShapeMismatch(format!(
            "{} true labels but {} predictions",
            y_true.len(), y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(LearnError::InsufficientData("balanced accuracy of an empty set".to_string()));
    }
    let mut support = [0usize; 256];
    let mut hits = [0usize; 256];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        support[t as usize] += 1;
        if t == p {
            hits[t as usize] += 1;
        }
    }
    let recalls: Vec<f64> = support
        .iter()
        .zip(hits.iter())
        .filter(|(&s, _)| s > 0)
        .map(|(&s, &h)| h as f64 / s as f64)
        .collect();
    Ok(recalls.iter().sum::<f64>() / recalls.len() as f64)
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_accuracy() -> Result<()> {
        // class 0 recall 2/4, class 1 recall 1/2
        let y_true = [0, 0, 0, 0, 1, 1];
        let y_pred = [0, 0, 1, 1, 1, 0];
        assert!((balanced_accuracy(&y_true, &y_pred)? - 0.5).abs() < 1e-12);

        // imbalanced: predicting the majority scores 0.5, not 0.9
        let y_true = [1, 1, 1, 1, 1, 1, 1, 1, 1, 0];
        let y_pred = [1; 10];
        assert!((balanced_accuracy(&y_true, &y_pred)? - 0.5).abs() < 1e-12);

        // only one class present in y_true
        assert_eq!(balanced_accuracy(&[1, 1], &[1, 0])?, 0.5);
        assert_eq!(balanced_accuracy(&[0, 1], &[0, 1])?, 1.0);
        Ok(())
    }

    #[test]
    fn test_balanced_accuracy_errors() {
        assert!(balanced_accuracy(&[], &[]).is_err());
        assert!(balanced_accuracy(&[0, 1], &[0]).is_err());
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mean, 2.5);
        assert!((std - 1.118033988749895).abs() < 1e-12);
    }
}
