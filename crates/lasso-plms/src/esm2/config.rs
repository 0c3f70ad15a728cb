use serde::Deserialize;

/// Subset of the HuggingFace ESM `config.json` needed for inference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ESM2Config {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    /// Context length including `<cls>` and `<eos>`.
    pub max_position_embeddings: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_position_embedding_type")]
    pub position_embedding_type: String,
    #[serde(default)]
    pub token_dropout: bool,
    #[serde(default)]
    pub emb_layer_norm_before: bool,
    #[serde(default = "default_mask_token_id")]
    pub mask_token_id: u32,
    #[serde(default = "default_pad_token_id")]
    pub pad_token_id: u32,
}

fn default_layer_norm_eps() -> f64 {
    1e-5
}

fn default_position_embedding_type() -> String {
    "rotary".to_string()
}

fn default_mask_token_id() -> u32 {
    32
}

fn default_pad_token_id() -> u32 {
    1
}

impl ESM2Config {
    /// `facebook/esm2_t33_650M_UR50D`; LassoESM and PeptideESM share the architecture.
    pub fn esm2_t33_650m() -> Self {
        Self {
            vocab_size: 33,
            hidden_size: 1280,
            num_hidden_layers: 33,
            num_attention_heads: 20,
            intermediate_size: 5120,
            max_position_embeddings: 1026,
            layer_norm_eps: 1e-5,
            position_embedding_type: default_position_embedding_type(),
            token_dropout: true,
            emb_layer_norm_before: false,
            mask_token_id: 32,
            pad_token_id: 1,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
