//! Mean-pooled embeddings for peptide datasets.
use crate::config::{ModelConfiguration, ModelSpec};
use crate::pretrained::{HubSource, ModelSource, PretrainedEncoder};
use crate::{EmbedError, EsmTokenizer, ESM2};
use candle_core::{Device, Tensor};
use lasso_io::EmbeddingMatrix;
use std::path::{Path, PathBuf};

const PROGRESS_EVERY: usize = 100;

/// Embed a single sequence: the last hidden state averaged over every token, `<cls>`
/// and `<eos>` included. The result has `model.hidden_size()` entries whatever the
/// sequence length.
pub fn embed_one(
    sequence: &str,
    model: &ESM2,
    tokenizer: &EsmTokenizer,
) -> Result<Vec<f32>, EmbedError> {
    let tokens = tokenizer.encode(sequence)?;
    let token_ids = Tensor::new(tokens.as_slice(), model.get_device())?.unsqueeze(0)?;
    let hidden = model.forward(&token_ids)?;
    let pooled = hidden.squeeze(0)?.mean(0)?;
    Ok(pooled.to_vec1::<f32>()?)
}

/// Runs the configured models over sequence lists and writes one matrix per model.
pub struct EmbeddingExtractor<S: ModelSource = HubSource> {
    config: ModelConfiguration,
    source: S,
    device: Device,
    output_dir: PathBuf,
}

impl EmbeddingExtractor<HubSource> {
    pub fn new(config: ModelConfiguration, device: Device, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_source(config, HubSource::default(), device, output_dir)
    }
}

impl<S: ModelSource> EmbeddingExtractor<S> {
    pub fn with_source(
        config: ModelConfiguration,
        source: S,
        device: Device,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            source,
            device,
            output_dir: output_dir.into(),
        }
    }

    pub fn config(&self) -> &ModelConfiguration {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Artifact path of a configured model.
    pub fn output_path(&self, model_name: &str) -> Result<PathBuf, EmbedError> {
        Ok(self.output_dir.join(&self.config.get(model_name)?.output_file))
    }

    /// Embed every sequence with `model_name` and overwrite its artifact.
    ///
    /// Nothing is written unless every sequence embeds: the matrix is assembled in
    /// memory first and then written atomically.
    pub fn embed_dataset(
        &self,
        sequences: &[String],
        model_name: &str,
    ) -> Result<EmbeddingMatrix, EmbedError> {
        let spec = self.config.get(model_name)?;
        if sequences.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let encoder = self.source.load(spec, &self.device)?;
        self.embed_with(&encoder, spec, sequences)
    }

    /// Every configured model in order. Each encoder is dropped before the next loads.
    pub fn embed_all(&self, sequences: &[String]) -> Result<Vec<PathBuf>, EmbedError> {
        let mut written = Vec::new();
        for spec in self.config.iter() {
            self.embed_dataset(sequences, &spec.name)?;
            written.push(self.output_dir.join(&spec.output_file));
        }
        Ok(written)
    }

    fn embed_with(
        &self,
        encoder: &PretrainedEncoder,
        spec: &ModelSpec,
        sequences: &[String],
    ) -> Result<EmbeddingMatrix, EmbedError> {
        let total = sequences.len();
        let mut rows = Vec::with_capacity(total);
        for (idx, sequence) in sequences.iter().enumerate() {
            let row = embed_one(sequence, &encoder.model, &encoder.tokenizer)
                .map_err(|e| e.at_index(idx))?;
            rows.push(row);
            if (idx + 1) % PROGRESS_EVERY == 0 {
                tracing::info!("{}: embedded {}/{total} sequences", spec.name, idx + 1);
            }
        }

        let matrix = EmbeddingMatrix::from_rows(rows)?
            .with_metadata("model_name", spec.name.as_str())
            .with_metadata("model_path", spec.model_path.as_str());
        tracing::info!(
            "{}: embedding matrix {} x {}",
            spec.name,
            matrix.nrows(),
            matrix.dim()
        );
        let path = self.output_dir.join(&spec.output_file);
        matrix.save(&path)?;
        Ok(matrix)
    }
}
