use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Boosting could not keep a single estimator better than chance.
    #[error("degenerate ensemble: {0}")]
    DegenerateEnsemble(String),

    /// No candidate of a grid search fit on every fold.
    #[error("grid search failed: {0}")]
    SearchFailed(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, LearnError>;
