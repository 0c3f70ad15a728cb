pub mod embed;
pub mod evaluate;
pub mod search;

use anyhow::{bail, Context};
use lasso_io::{read_labeled_sequences, CsvColumns, EmbeddingMatrix};
use lasso_learn::Dataset;
use std::path::Path;

/// Labels from `input` paired row-for-row with the matrix in `embeddings`.
pub(crate) fn load_dataset(
    input: &Path,
    embeddings: &Path,
    sequence_column: usize,
    label_column: usize,
) -> anyhow::Result<Dataset> {
    let columns = CsvColumns {
        sequence: sequence_column,
        label: Some(label_column),
        has_header: true,
    };
    let table = read_labeled_sequences(input, &columns)?;
    let matrix = EmbeddingMatrix::load(embeddings)?;
    if matrix.nrows() != table.len() {
        bail!(
            "{} has {} rows but {} holds {} embeddings",
            input.display(),
            table.len(),
            embeddings.display(),
            matrix.nrows()
        );
    }
    if let Some(model) = matrix.metadata().get("model_name") {
        tracing::info!("using {model} embeddings of width {}", matrix.dim());
    }
    let dataset = Dataset::new(matrix.to_f64(), table.labels()?.to_vec())?;
    let [negatives, positives] = dataset.class_counts();
    tracing::info!(
        "{} samples: {positives} positive, {negatives} negative",
        dataset.len()
    );
    Ok(dataset)
}

pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    lasso_io::write_atomic(path, text.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}
