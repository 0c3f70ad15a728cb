use lasso_io::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The requested model name is not part of the configuration.
    #[error("model {name} is not configured; available models: {}", .available.join(", "))]
    Configuration { name: String, available: Vec<String> },

    /// Model weights, config or vocabulary could not be fetched or parsed.
    #[error("could not load {model_path}: {reason}")]
    Resource { model_path: String, reason: String },

    #[error(
        "could not tokenize sequence {}: {reason}",
        .index.map_or_else(|| "<input>".to_string(), |i| i.to_string())
    )]
    Tokenization { index: Option<usize>, reason: String },

    #[error("no sequences to embed")]
    EmptyInput,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl EmbedError {
    pub(crate) fn tokenization(reason: impl Into<String>) -> Self {
        Self::Tokenization {
            index: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn resource(model_path: &str, reason: impl ToString) -> Self {
        Self::Resource {
            model_path: model_path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Attach the row index of the failing sequence.
    pub(crate) fn at_index(self, idx: usize) -> Self {
        match self {
            Self::Tokenization { reason, .. } => Self::Tokenization {
                index: Some(idx),
                reason,
            },
            other => other,
        }
    }
}
