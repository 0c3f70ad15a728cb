//! Labelled peptide tables.
//!
//! Row order in the file is the canonical order for everything downstream: the
//! embedding matrix rows and the label vector are both aligned to it.
use crate::DataError;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Which columns (by zero-based index) hold the sequence and the label.
#[derive(Debug, Clone)]
pub struct CsvColumns {
    pub sequence: usize,
    /// `None` when only sequences are needed (embedding extraction).
    pub label: Option<usize>,
    pub has_header: bool,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            sequence: 0,
            label: Some(1),
            has_header: true,
        }
    }
}

impl CsvColumns {
    pub fn sequences_only(sequence: usize) -> Self {
        Self {
            sequence,
            label: None,
            has_header: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabeledSequences {
    pub sequences: Vec<String>,
    pub labels: Option<Vec<u8>>,
    source: PathBuf,
}

impl LabeledSequences {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The label vector, or an input-format error if the table was read without one.
    pub fn labels(&self) -> Result<&[u8], DataError> {
        self.labels
            .as_deref()
            .ok_or_else(|| DataError::InputFormat {
                path: self.source.clone(),
                reason: "no label column was read".to_string(),
            })
    }
}

/// Read sequences (and labels, when requested) from a CSV file.
///
/// Fails with [`DataError::InputFormat`] when the table is empty, lacks the requested
/// columns, has missing sequences, or has labels other than 0/1.
pub fn read_labeled_sequences(
    path: impl AsRef<Path>,
    columns: &CsvColumns,
) -> Result<LabeledSequences, DataError> {
    let path = path.as_ref();
    let csv_err = |source: PolarsError| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let format_err = |reason: String| DataError::InputFormat {
        path: path.to_path_buf(),
        reason,
    };

    let df = CsvReadOptions::default()
        .with_has_header(columns.has_header)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(csv_err)?;

    if df.height() == 0 {
        return Err(format_err("table has no rows".to_string()));
    }
    let needed = columns.label.unwrap_or(0).max(columns.sequence) + 1;
    let found = df.width();
    if found < needed {
        return Err(format_err(format!("expected at least {needed} columns, found {found}")));
    }

    let sequence_column = df
        .select_at_idx(columns.sequence)
        .ok_or_else(|| format_err(format!("missing column {}", columns.sequence)))?
        .as_materialized_series()
        .cast(&DataType::String)
        .map_err(csv_err)?;
    let mut sequences = Vec::with_capacity(df.height());
    for (row, value) in sequence_column
        .str()
        .map_err(csv_err)?
        .into_iter()
        .enumerate()
    {
        match value.map(str::trim) {
            Some(seq) if !seq.is_empty() => sequences.push(seq.to_string()),
            _ => return Err(format_err(format!("row {row}: missing sequence"))),
        }
    }

    let labels = match columns.label {
        Some(idx) => {
            let label_column = df
                .select_at_idx(idx)
                .ok_or_else(|| format_err(format!("missing column {idx}")))?
                .as_materialized_series()
                .cast(&DataType::Float64)
                .map_err(csv_err)?;
            let mut labels = Vec::with_capacity(df.height());
            for (row, value) in label_column.f64().map_err(csv_err)?.into_iter().enumerate() {
                match value {
                    Some(v) if v == 0.0 => labels.push(0u8),
                    Some(v) if v == 1.0 => labels.push(1u8),
                    _ => return Err(format_err(format!("row {row}: label must be 0 or 1"))),
                }
            }
            Some(labels)
        }
        None => None,
    };

    tracing::debug!(
        path = %path.display(),
        rows = sequences.len(),
        labelled = labels.is_some(),
        "read peptide table"
    );

    Ok(LabeledSequences {
        sequences,
        labels,
        source: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasso_test_data::TestFile;

    #[test]
    fn test_read_sequences_and_labels() -> anyhow::Result<()> {
        let (csv, _tmp) = TestFile::fusilassin_variants().create_temp()?;
        let data = read_labeled_sequences(&csv, &CsvColumns::default())?;
        assert_eq!(data.len(), 30);
        assert_eq!(data.sequences[0], "WYTAEWGLELIFVFPRFI");
        let labels = data.labels()?;
        assert_eq!(labels.len(), 30);
        assert_eq!(labels[0], 1);
        assert!(labels.iter().all(|&l| l <= 1));
        Ok(())
    }

    #[test]
    fn test_sequence_column_selection() -> anyhow::Result<()> {
        let (csv, _tmp) = TestFile::ubonodin_scores().create_temp()?;
        let data = read_labeled_sequences(&csv, &CsvColumns::sequences_only(2))?;
        assert_eq!(data.len(), 5);
        assert_eq!(data.sequences[3], "GGAGSIAEYFNRPMHIHDWQIMDSGYYG");
        assert!(data.labels.is_none());
        assert!(data.labels().is_err());
        Ok(())
    }

    #[test]
    fn test_bad_labels_are_rejected() -> anyhow::Result<()> {
        let (csv, _tmp) = TestFile::bad_labels().create_temp()?;
        let err = read_labeled_sequences(&csv, &CsvColumns::default()).unwrap_err();
        assert!(matches!(err, DataError::InputFormat { .. }), "{err:?}");
        Ok(())
    }

    #[test]
    fn test_missing_column() -> anyhow::Result<()> {
        let (csv, _tmp) = TestFile::fusilassin_variants().create_temp()?;
        let columns = CsvColumns {
            sequence: 0,
            label: Some(5),
            has_header: true,
        };
        let err = read_labeled_sequences(&csv, &columns).unwrap_err();
        assert!(matches!(err, DataError::InputFormat { .. }));
        Ok(())
    }

    #[test]
    fn test_header_only_table() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "sequence,label\n")?;
        let err = read_labeled_sequences(&path, &CsvColumns::default()).unwrap_err();
        assert!(matches!(err, DataError::InputFormat { .. }));
        Ok(())
    }
}
