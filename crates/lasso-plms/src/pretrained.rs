//! Locating and loading ESM-2 checkpoints.
//!
//! A checkpoint is a directory (local, or a HuggingFace repo snapshot) with
//! `config.json`, `vocab.txt` and either `model.safetensors` or `pytorch_model.bin`.
use crate::config::ModelSpec;
use crate::esm2::{ESM2Config, ESM2};
use crate::{EmbedError, EsmTokenizer};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";
const VOCAB_FILE: &str = "vocab.txt";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";

/// A loaded encoder and its tokenizer.
#[derive(Debug, Clone)]
pub struct PretrainedEncoder {
    pub model: ESM2,
    pub tokenizer: EsmTokenizer,
}

/// Where encoders come from. The extractor only talks to this trait, so tests and
/// offline setups can hand it prebuilt models.
pub trait ModelSource {
    fn load(&self, spec: &ModelSpec, device: &Device) -> Result<PretrainedEncoder, EmbedError>;
}

#[derive(Debug, Clone)]
pub struct CheckpointFiles {
    pub config: PathBuf,
    pub vocab: PathBuf,
    pub weights: PathBuf,
}

impl CheckpointFiles {
    /// Files of a checkpoint directory on disk.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, EmbedError> {
        let dir = dir.as_ref();
        let model_path = dir.display().to_string();
        let existing = |name: &str| -> Result<PathBuf, EmbedError> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(EmbedError::resource(&model_path, format!("missing {name}")))
            }
        };
        let weights = existing(SAFETENSORS_FILE).or_else(|_| existing(PYTORCH_FILE))?;
        Ok(Self {
            config: existing(CONFIG_FILE)?,
            vocab: existing(VOCAB_FILE)?,
            weights,
        })
    }
}

/// Resolves `model_path` as a local directory first, then as a HuggingFace repo id.
/// Downloads go through the hf-hub cache, so each checkpoint is fetched once.
#[derive(Debug, Clone, Default)]
pub struct HubSource {
    pub revision: Option<String>,
}

impl HubSource {
    pub fn with_revision(revision: impl Into<String>) -> Self {
        Self {
            revision: Some(revision.into()),
        }
    }

    fn fetch(&self, model_path: &str) -> Result<CheckpointFiles, EmbedError> {
        let local = Path::new(model_path);
        if local.is_dir() {
            return CheckpointFiles::from_dir(local);
        }
        let revision = self.revision.clone().unwrap_or_else(|| "main".to_string());
        let repo = Repo::with_revision(model_path.to_string(), RepoType::Model, revision);
        let api = Api::new().map_err(|e| EmbedError::resource(model_path, e))?;
        let api = api.repo(repo);
        let get = |f: &str| api.get(f).map_err(|e| EmbedError::resource(model_path, e));
        let config = get(CONFIG_FILE)?;
        let vocab = get(VOCAB_FILE)?;
        let weights = match api.get(SAFETENSORS_FILE) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!(
                    "{model_path}: no {SAFETENSORS_FILE} ({err}), trying {PYTORCH_FILE}"
                );
                get(PYTORCH_FILE)?
            }
        };
        Ok(CheckpointFiles {
            config,
            vocab,
            weights,
        })
    }
}

impl ModelSource for HubSource {
    fn load(&self, spec: &ModelSpec, device: &Device) -> Result<PretrainedEncoder, EmbedError> {
        tracing::info!("loading {} from {}", spec.name, spec.model_path);
        let files = self.fetch(&spec.model_path)?;
        load_checkpoint(&files, device).map_err(|err| match err {
            EmbedError::Candle(e) => EmbedError::resource(&spec.model_path, e),
            other => other,
        })
    }
}

/// Build the encoder in F32 from checkpoint files.
pub fn load_checkpoint(
    files: &CheckpointFiles,
    device: &Device,
) -> Result<PretrainedEncoder, EmbedError> {
    let config_path = files.config.display().to_string();
    let config_str =
        std::fs::read_to_string(&files.config).map_err(|e| EmbedError::resource(&config_path, e))?;
    let config =
        ESM2Config::from_json_str(&config_str).map_err(|e| EmbedError::resource(&config_path, e))?;
    let tokenizer = EsmTokenizer::from_vocab_file(&files.vocab, config.max_position_embeddings)?;
    if tokenizer.vocab_size() != config.vocab_size {
        return Err(EmbedError::resource(
            &files.vocab.display().to_string(),
            format!(
                "{} tokens in the vocabulary but vocab_size is {}",
                tokenizer.vocab_size(), config.vocab_size
            ),
        ));
    }

    let is_safetensors = files
        .weights
        .extension()
        .is_some_and(|ext| ext == "safetensors");
    let vb = if is_safetensors {
        unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, device)? }
    } else {
        VarBuilder::from_pth(&files.weights, DType::F32, device)?
    };
    let model = ESM2::load(vb, &config)?;
    Ok(PretrainedEncoder { model, tokenizer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;
    use lasso_test_data::tiny_esm2_dir;

    fn tiny_config(dir: &Path) -> anyhow::Result<ESM2Config> {
        let config_str = std::fs::read_to_string(dir.join(CONFIG_FILE))?;
        Ok(ESM2Config::from_json_str(&config_str)?)
    }

    fn local_spec(dir: &Path) -> ModelSpec {
        ModelSpec {
            name: "Tiny".into(),
            model_path: dir.display().to_string(),
            output_file: "tiny.safetensors".into(),
        }
    }

    #[test]
    fn test_missing_weights() -> anyhow::Result<()> {
        let dir = tiny_esm2_dir()?;
        match CheckpointFiles::from_dir(dir.path()) {
            Err(EmbedError::Resource { reason, .. }) => assert!(reason.contains("missing")),
            other => panic!("expected a resource error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_load_local_checkpoint() -> anyhow::Result<()> {
        let dir = tiny_esm2_dir()?;
        let config = tiny_config(dir.path())?;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        ESM2::load(vb, &config)?;
        varmap.save(dir.path().join(SAFETENSORS_FILE))?;

        let encoder = HubSource::default().load(&local_spec(dir.path()), &Device::Cpu)?;
        assert_eq!(encoder.model.hidden_size(), 16);
        assert_eq!(encoder.tokenizer.max_length(), 24);
        Ok(())
    }

    #[test]
    fn test_load_masked_lm_checkpoint() -> anyhow::Result<()> {
        // EsmForMaskedLM layout: encoder tensors under `esm.` next to an unused head
        let dir = tiny_esm2_dir()?;
        let config = tiny_config(dir.path())?;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let reference = ESM2::load(vb.pp("esm"), &config)?;
        vb.get_with_hints(config.vocab_size, "lm_head.bias", candle_nn::Init::Const(0.))?;
        varmap.save(dir.path().join(SAFETENSORS_FILE))?;

        let encoder = HubSource::default().load(&local_spec(dir.path()), &Device::Cpu)?;
        // <cls> M K T <eos>
        let ids = Tensor::new(&[[0u32, 20, 15, 11, 2]], &Device::Cpu)?;
        let loaded = encoder.model.forward(&ids)?;
        let expected = reference.forward(&ids)?;
        assert_eq!(loaded.dims3()?, (1, 5, 16));
        let diff = (loaded - expected)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-6, "max abs diff {diff}");
        Ok(())
    }

    #[test]
    fn test_pytorch_weights_fallback() -> anyhow::Result<()> {
        let dir = tiny_esm2_dir()?;
        std::fs::write(dir.path().join(PYTORCH_FILE), b"")?;
        let files = CheckpointFiles::from_dir(dir.path())?;
        assert_eq!(files.weights, dir.path().join(PYTORCH_FILE));
        assert_eq!(files.config, dir.path().join(CONFIG_FILE));
        assert_eq!(files.vocab, dir.path().join(VOCAB_FILE));

        // an unreadable .bin surfaces as a resource error naming the checkpoint
        let spec = local_spec(dir.path());
        match HubSource::default().load(&spec, &Device::Cpu) {
            Err(EmbedError::Resource { model_path, .. }) => assert_eq!(model_path, spec.model_path),
            other => panic!("expected a resource error, got {other:?}"),
        }

        std::fs::write(dir.path().join(SAFETENSORS_FILE), b"")?;
        let files = CheckpointFiles::from_dir(dir.path())?;
        assert_eq!(files.weights, dir.path().join(SAFETENSORS_FILE));
        Ok(())
    }
}
