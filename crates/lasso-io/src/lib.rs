//! lasso-io
//!
//! Reading labelled peptide tables and persisting embedding matrices.
//!
//! - [`read_labeled_sequences`]: CSV → ordered sequences (+ optional 0/1 labels) via polars.
//! - [`EmbeddingMatrix`]: one row per sequence, saved as a safetensors file holding a
//!   single `embeddings` tensor. Writes are atomic: a failed run never leaves a
//!   truncated artifact behind.
mod dataset;
mod embeddings;
mod error;

pub use dataset::{read_labeled_sequences, CsvColumns, LabeledSequences};
pub use embeddings::{write_atomic, EmbeddingMatrix, EMBEDDINGS_KEY};
pub use error::DataError;
