use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// The table is readable but does not have the expected shape or content.
    #[error("{}: {reason}", .path.display())]
    InputFormat { path: PathBuf, reason: String },

    #[error("could not parse {} as CSV", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("could not read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid embedding file: {reason}", .path.display())]
    Safetensors { path: PathBuf, reason: String },

    #[error("inconsistent embedding matrix: {0}")]
    Shape(String),
}
