//! lasso-plms
//!
//! Mean-pooled sequence embeddings from ESM-2 protein language models.
//!
//! - [ESM2](https://github.com/facebookresearch/esm) encoder implemented in candle,
//!   loading HuggingFace `EsmForMaskedLM` / `EsmModel` checkpoints.
//! - [LassoESM](https://huggingface.co/ShuklaGroupIllinois/LassoESM),
//!   [PeptideESM](https://huggingface.co/ShuklaGroupIllinois/PeptideESM2_650M) and the
//!   [vanilla 650M model](https://huggingface.co/facebook/esm2_t33_650M_UR50D) are the
//!   default configuration.
//!
//! ```shell
//! cargo run -p lasso-cli -- embed --input variants.csv --target Fusilassin
//! cargo run -p lasso-cli --features metal -- embed --input variants.csv --target Fusilassin
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Result};

pub use config::{ModelConfiguration, ModelSpec, LASSO_ESM, PEPTIDE_ESM, VANILLA_ESM};
pub use error::EmbedError;
pub use esm2::{ESM2Config, ESM2};
pub use extractor::{embed_one, EmbeddingExtractor};
pub use pretrained::{load_checkpoint, CheckpointFiles, HubSource, ModelSource, PretrainedEncoder};
pub use tokenizer::EsmTokenizer;

mod config;
mod error;
pub mod esm2;
mod extractor;
mod pretrained;
mod tokenizer;

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::info!("running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::info!("running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
