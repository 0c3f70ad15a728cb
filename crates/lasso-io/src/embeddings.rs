//! Embedding matrix persistence.
//!
//! The artifact is a safetensors file with one F32 tensor named [`EMBEDDINGS_KEY`] of
//! shape `[n_sequences, hidden_dim]`, plus string metadata (model name, model path).
//! numpy users can read it with `safetensors.numpy.load_file`.
use crate::DataError;
use ndarray::Array2;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const EMBEDDINGS_KEY: &str = "embeddings";

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    values: Array2<f32>,
    metadata: BTreeMap<String, String>,
}

impl EmbeddingMatrix {
    pub fn new(values: Array2<f32>) -> Self {
        Self {
            values,
            metadata: BTreeMap::new(),
        }
    }

    /// Stack per-sequence vectors. Every row must have the same width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, DataError> {
        let nrows = rows.len();
        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
            return Err(DataError::Shape(format!(
                "row {idx} has width {}, expected {ncols}",
                row.len()
            )));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| DataError::Shape(e.to_string()))?;
        Ok(Self::new(values))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Embedding width (the model hidden size).
    pub fn dim(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f32> {
        self.values
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Features as f64 for the classifiers.
    pub fn to_f64(&self) -> Array2<f64> {
        self.values.mapv(f64::from)
    }

    /// Serialize and atomically replace `path`. Any previous artifact is overwritten
    /// only once the new one is fully written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DataError> {
        let path = path.as_ref();
        let invalid = |reason: String| DataError::Safetensors {
            path: path.to_path_buf(),
            reason,
        };
        let data: Vec<u8> = self.values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![self.nrows(), self.dim()], &data)
            .map_err(|e| invalid(e.to_string()))?;
        let metadata: HashMap<String, String> = self.metadata.clone().into_iter().collect();
        let bytes = safetensors::serialize([(EMBEDDINGS_KEY, view)], &Some(metadata))
            .map_err(|e| invalid(e.to_string()))?;
        write_atomic(path, &bytes)?;
        tracing::info!(
            path = %path.display(),
            rows = self.nrows(),
            dim = self.dim(),
            "saved embeddings"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let invalid = |reason: String| DataError::Safetensors {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|source| DataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let (_, header) = SafeTensors::read_metadata(&bytes).map_err(|e| invalid(e.to_string()))?;
        let metadata: BTreeMap<String, String> = header
            .metadata()
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();
        let tensors = SafeTensors::deserialize(&bytes).map_err(|e| invalid(e.to_string()))?;
        let view = tensors
            .tensor(EMBEDDINGS_KEY)
            .map_err(|e| invalid(e.to_string()))?;
        if view.dtype() != Dtype::F32 {
            return Err(invalid(format!("expected F32, found {:?}", view.dtype())));
        }
        let (nrows, ncols) = match view.shape() {
            [r, c] => (*r, *c),
            other => return Err(invalid(format!("expected a matrix, found shape {other:?}"))),
        };
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let values =
            Array2::from_shape_vec((nrows, ncols), values).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { values, metadata })
    }
}

/// Write `bytes` to a temporary file next to `path`, then rename it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    let storage = |source: std::io::Error| DataError::Storage {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(storage)?;
    tmp.write_all(bytes).map_err(storage)?;
    tmp.as_file().sync_all().map_err(storage)?;
    tmp.persist(path).map_err(|e| storage(e.error))?;
    Ok(())
}
