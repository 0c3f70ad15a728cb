//! ESM-2 encoder.
//!
//! Follows the HuggingFace `EsmModel` layout so that `EsmForMaskedLM` checkpoints load
//! directly: pre-LayerNorm transformer blocks with rotary self-attention and a final
//! `emb_layer_norm_after`.
mod config;
mod model;
mod rotary;

pub use config::ESM2Config;
pub use model::ESM2;
