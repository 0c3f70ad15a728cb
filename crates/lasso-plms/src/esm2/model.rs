use super::config::ESM2Config;
use super::rotary::RotaryEmbedding;
use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::{embedding, layer_norm, Embedding, LayerNorm, VarBuilder};
use candle_transformers::models::with_tracing::{linear, Linear};

// ESM-2 was pre-trained with 15% of positions selected and 80% of those masked.
const MASK_RATIO_TRAIN: f64 = 0.15 * 0.8;

#[derive(Debug, Clone)]
struct EsmSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    rotary: RotaryEmbedding,
    num_heads: usize,
    head_dim: usize,
}

impl EsmSelfAttention {
    fn load(vb: VarBuilder, config: &ESM2Config) -> Result<Self> {
        let ESM2Config {
            hidden_size,
            num_attention_heads,
            ..
        } = *config;
        if hidden_size % num_attention_heads != 0 {
            candle_core::bail!(
                "hidden_size {hidden_size} is not divisible by {num_attention_heads} heads"
            )
        }
        let head_dim = config.head_dim();
        Ok(Self {
            query: linear(hidden_size, hidden_size, vb.pp("query"))?,
            key: linear(hidden_size, hidden_size, vb.pp("key"))?,
            value: linear(hidden_size, hidden_size, vb.pp("value"))?,
            rotary: RotaryEmbedding::new(head_dim, vb.device())?,
            num_heads: num_attention_heads,
            head_dim,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        let split_heads = |x: Tensor| -> Result<Tensor> {
            x.reshape((b, t, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        // the query is scaled before the rotation, as in fair-esm
        let scale = (self.head_dim as f64).powf(-0.5);
        let q = split_heads(self.query.forward(xs)?)?.affine(scale, 0.0)?;
        let k = split_heads(self.key.forward(xs)?)?;
        let v = split_heads(self.value.forward(xs)?)?;
        let (q, k) = self.rotary.apply(&q, &k)?;

        let scores = q.contiguous()?.matmul(&k.t()?.contiguous()?)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = probs.matmul(&v)?.transpose(1, 2)?.contiguous()?;
        context.reshape((b, t, self.num_heads * self.head_dim))
    }
}

#[derive(Debug, Clone)]
struct EsmLayer {
    attention: EsmSelfAttention,
    attention_output: Linear,
    attention_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
    norm: LayerNorm,
}

impl EsmLayer {
    fn load(vb: VarBuilder, config: &ESM2Config) -> Result<Self> {
        let h = config.hidden_size;
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: EsmSelfAttention::load(vb.pp("attention.self"), config)?,
            attention_output: linear(h, h, vb.pp("attention.output.dense"))?,
            attention_norm: layer_norm(h, eps, vb.pp("attention.LayerNorm"))?,
            intermediate: linear(h, config.intermediate_size, vb.pp("intermediate.dense"))?,
            output: linear(config.intermediate_size, h, vb.pp("output.dense"))?,
            norm: layer_norm(h, eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let attn = self.attention.forward(&self.attention_norm.forward(xs)?)?;
        let xs = (self.attention_output.forward(&attn)? + xs)?;
        let ff = self
            .intermediate
            .forward(&self.norm.forward(&xs)?)?
            .gelu_erf()?;
        self.output.forward(&ff)? + xs
    }
}

/// ESM-2 encoder without the language-model head.
///
/// There is no dropout anywhere in this module and the weights are plain tensors, so a
/// forward pass is always inference-only.
#[derive(Debug, Clone)]
pub struct ESM2 {
    word_embeddings: Embedding,
    emb_layer_norm_before: Option<LayerNorm>,
    layers: Vec<EsmLayer>,
    emb_layer_norm_after: LayerNorm,
    config: ESM2Config,
    device: Device,
}

impl ESM2 {
    /// Build the encoder from a `VarBuilder`. Weights saved from `EsmForMaskedLM` carry an
    /// `esm.` prefix; both layouts are accepted.
    pub fn load(vb: VarBuilder, config: &ESM2Config) -> Result<Self> {
        if config.position_embedding_type != "rotary" {
            candle_core::bail!(
                "position_embedding_type {:?} is not supported, only rotary",
                config.position_embedding_type
            )
        }
        let vb = if vb.contains_tensor("esm.embeddings.word_embeddings.weight") {
            vb.pp("esm")
        } else {
            vb
        };
        let h = config.hidden_size;
        let word_embeddings = embedding(config.vocab_size, h, vb.pp("embeddings.word_embeddings"))?;
        let emb_layer_norm_before = if config.emb_layer_norm_before {
            Some(layer_norm(h, config.layer_norm_eps, vb.pp("embeddings.layer_norm"))?)
        } else {
            None
        };
        let layers = (0..config.num_hidden_layers)
            .map(|i| EsmLayer::load(vb.pp(format!("encoder.layer.{i}")), config))
            .collect::<Result<Vec<_>>>()?;
        let emb_layer_norm_after = layer_norm(
            h,
            config.layer_norm_eps,
            vb.pp("encoder.emb_layer_norm_after"),
        )?;
        Ok(Self {
            word_embeddings,
            emb_layer_norm_before,
            layers,
            emb_layer_norm_after,
            config: config.clone(),
            device: vb.device().clone(),
        })
    }

    pub fn config(&self) -> &ESM2Config {
        &self.config
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn get_device(&self) -> &Device {
        &self.device
    }

    fn embed(&self, input_ids: &Tensor) -> Result<Tensor> {
        let mut xs = self.word_embeddings.forward(input_ids)?;
        if self.config.token_dropout {
            // zero the <mask> rows and rescale by the observed mask ratio
            let is_mask = input_ids
                .eq(self.config.mask_token_id)?
                .to_dtype(xs.dtype())?;
            let keep = is_mask.affine(-1.0, 1.0)?.unsqueeze(D::Minus1)?;
            xs = xs.broadcast_mul(&keep)?;
            let seq_len = input_ids.dim(1)? as f64;
            let observed = is_mask.sum_keepdim(1)?.affine(1.0 / seq_len, 0.0)?;
            let scale = observed
                .affine(-1.0, 1.0)?
                .recip()?
                .affine(1.0 - MASK_RATIO_TRAIN, 0.0)?;
            xs = xs.broadcast_mul(&scale.unsqueeze(D::Minus1)?)?;
        }
        match &self.emb_layer_norm_before {
            Some(norm) => norm.forward(&xs),
            None => Ok(xs),
        }
    }

    /// Hidden states for `input_ids` of shape [batch, seq]: the embedding output, the
    /// output of every layer but the last, and finally the last layer's output after
    /// `emb_layer_norm_after`. Length is `num_hidden_layers + 1`.
    pub fn forward_hidden_states(&self, input_ids: &Tensor) -> Result<Vec<Tensor>> {
        let mut xs = self.embed(input_ids)?;
        let mut hidden_states = Vec::with_capacity(self.layers.len() + 1);
        for layer in &self.layers {
            hidden_states.push(xs.clone());
            xs = layer.forward(&xs)?;
        }
        hidden_states.push(self.emb_layer_norm_after.forward(&xs)?);
        Ok(hidden_states)
    }

    /// Last hidden state, [batch, seq, hidden].
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let mut xs = self.embed(input_ids)?;
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        self.emb_layer_norm_after.forward(&xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny_model() -> anyhow::Result<ESM2> {
        let text = std::str::from_utf8(lasso_test_data::TestFile::esm2_tiny_config().bytes())?;
        let config = ESM2Config::from_json_str(text)?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        Ok(ESM2::load(vb, &config)?)
    }

    #[test]
    fn test_hidden_state_shapes() -> anyhow::Result<()> {
        let model = tiny_model()?;
        // <cls> M K T <eos>
        let ids = Tensor::new(&[[0u32, 20, 15, 11, 2]], &Device::Cpu)?;
        let hidden = model.forward_hidden_states(&ids)?;
        assert_eq!(hidden.len(), 3);
        for h in &hidden {
            assert_eq!(h.dims3()?, (1, 5, 16));
        }
        let last = model.forward(&ids)?;
        let diff = (&hidden[2] - &last)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn test_token_dropout_scaling() -> anyhow::Result<()> {
        let model = tiny_model()?;
        let ids = Tensor::new(&[[0u32, 20, 15, 2]], &Device::Cpu)?;
        let raw = model.word_embeddings.forward(&ids)?;
        let scaled = model.embed(&ids)?;
        let expected = raw.affine(1.0 - MASK_RATIO_TRAIN, 0.0)?;
        let diff = (scaled - expected)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-6);

        // a masked position is zeroed and the rest rescaled by (1 - 0.12) / (1 - 1/4)
        let masked = Tensor::new(&[[0u32, 32, 15, 2]], &Device::Cpu)?;
        let out = model.embed(&masked)?;
        let zero_row = out.narrow(1, 1, 1)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert_eq!(zero_row, 0.0);
        let raw = model.word_embeddings.forward(&masked)?;
        let factor = (1.0 - MASK_RATIO_TRAIN) / (1.0 - 0.25);
        let expected = raw.narrow(1, 2, 1)?.affine(factor, 0.0)?;
        let diff = (out.narrow(1, 2, 1)? - expected)?
            .abs()?
            .max_all()?
            .to_scalar::<f32>()?;
        assert!(diff < 1e-5);
        Ok(())
    }

    #[test]
    fn test_absolute_positions_rejected() -> anyhow::Result<()> {
        let mut config = ESM2Config::esm2_t33_650m();
        config.position_embedding_type = "absolute".to_string();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(ESM2::load(vb, &config).is_err());
        Ok(())
    }
}
