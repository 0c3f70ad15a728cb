use candle_core::{DType, Device, Result, Tensor, D};

fn rotate_half(x: &Tensor) -> Result<Tensor> {
    let half = x.dim(D::Minus1)? / 2;
    let x1 = x.narrow(D::Minus1, 0, half)?;
    let x2 = x.narrow(D::Minus1, half, half)?;
    Tensor::cat(&[&x2.neg()?, &x1], D::Minus1)
}

fn apply_rotary_pos_emb(x: &Tensor, cos: &Tensor, sin: &Tensor) -> Result<Tensor> {
    let x_cos = x.broadcast_mul(cos)?;
    let x_sin = rotate_half(x)?.broadcast_mul(sin)?;
    x_cos + x_sin
}

/// Rotary position embedding over the head dimension (`rotate_half` convention).
///
/// The checkpoints also store `rotary_embeddings.inv_freq`; it is a pure function of
/// the head size, so it is recomputed here instead of read.
#[derive(Debug, Clone)]
pub struct RotaryEmbedding {
    inv_freq: Tensor,
}

impl RotaryEmbedding {
    pub fn new(head_dim: usize, device: &Device) -> Result<Self> {
        let inv_freq = (0..head_dim)
            .step_by(2)
            .map(|i| 1f32 / 10000f32.powf(i as f32 / head_dim as f32))
            .collect::<Vec<_>>();
        let inv_freq = Tensor::new(inv_freq.as_slice(), device)?;
        Ok(Self { inv_freq })
    }

    fn cos_sin(&self, seq_len: usize, dtype: DType) -> Result<(Tensor, Tensor)> {
        let positions = Tensor::arange(0u32, seq_len as u32, self.inv_freq.device())?
            .to_dtype(DType::F32)?
            .unsqueeze(1)?;
        // [seq, head_dim / 2]
        let freqs = positions.matmul(&self.inv_freq.unsqueeze(0)?)?;
        // [seq, head_dim]
        let emb = Tensor::cat(&[&freqs, &freqs], D::Minus1)?;
        Ok((emb.cos()?.to_dtype(dtype)?, emb.sin()?.to_dtype(dtype)?))
    }

    /// `q`, `k`: [batch, heads, seq, head_dim]
    pub fn apply(&self, q: &Tensor, k: &Tensor) -> Result<(Tensor, Tensor)> {
        let seq_len = q.dim(2)?;
        let (cos, sin) = self.cos_sin(seq_len, q.dtype())?;
        Ok((
            apply_rotary_pos_emb(q, &cos, &sin)?,
            apply_rotary_pos_emb(k, &cos, &sin)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_zero_is_identity() -> Result<()> {
        let device = Device::Cpu;
        let rotary = RotaryEmbedding::new(4, &device)?;
        let q = Tensor::new(&[1f32, 2., 3., 4.], &device)?.reshape((1, 1, 1, 4))?;
        let (rq, rk) = rotary.apply(&q, &q)?;
        assert_eq!(rq.flatten_all()?.to_vec1::<f32>()?, vec![1., 2., 3., 4.]);
        assert_eq!(rk.flatten_all()?.to_vec1::<f32>()?, vec![1., 2., 3., 4.]);
        Ok(())
    }

    #[test]
    fn test_rotation_preserves_norm() -> Result<()> {
        let device = Device::Cpu;
        let rotary = RotaryEmbedding::new(4, &device)?;
        let q = Tensor::new(&[[1f32, 2., 3., 4.], [0.5, -1., 2., 0.]], &device)?;
        let q = q.reshape((1, 1, 2, 4))?;
        let (rq, _) = rotary.apply(&q, &q)?;
        let before = q.sqr()?.sum(D::Minus1)?.flatten_all()?.to_vec1::<f32>()?;
        let after = rq.sqr()?.sum(D::Minus1)?.flatten_all()?.to_vec1::<f32>()?;
        for (b, a) in before.iter().zip(after.iter()) {
            assert!((b - a).abs() < 1e-4, "{b} vs {a}");
        }
        Ok(())
    }
}
