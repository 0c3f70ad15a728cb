//! ESM tokenizer.
//!
//! ESM checkpoints ship a `vocab.txt` (one token per line, line number = id) rather than
//! a `tokenizer.json`. Every residue is a token, `<...>` markers are kept whole, and a
//! sequence is framed as `<cls> residues <eos>`.
use crate::EmbedError;
use std::path::Path;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::Tokenizer;

const CLS: &str = "<cls>";
const EOS: &str = "<eos>";
const UNK: &str = "<unk>";

#[derive(Debug, Clone)]
pub struct EsmTokenizer {
    tokenizer: Tokenizer,
    cls_token_id: u32,
    eos_token_id: u32,
    unk_token_id: u32,
    max_length: usize,
}

impl EsmTokenizer {
    /// `max_length` counts the `<cls>`/`<eos>` framing (1026 for ESM-2).
    pub fn from_vocab(vocab_text: &str, max_length: usize) -> Result<Self, EmbedError> {
        let tokens: Vec<&str> = vocab_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let id_of = |token: &str| {
            tokens
                .iter()
                .position(|t| *t == token)
                .map(|idx| idx as u32)
                .ok_or_else(|| EmbedError::resource("vocab.txt", format!("missing {token} token")))
        };
        let cls_token_id = id_of(CLS)?;
        let eos_token_id = id_of(EOS)?;
        let unk_token_id = id_of(UNK)?;

        let model = WordLevel::builder()
            .vocab(
                tokens
                    .iter()
                    .enumerate()
                    .map(|(idx, token)| (token.to_string(), idx as u32))
                    .collect(),
            )
            .unk_token(UNK.to_string())
            .build()
            .map_err(|e| EmbedError::resource("vocab.txt", e))?;
        Ok(Self {
            tokenizer: Tokenizer::new(model),
            cls_token_id,
            eos_token_id,
            unk_token_id,
            max_length,
        })
    }

    pub fn from_vocab_file(path: impl AsRef<Path>, max_length: usize) -> Result<Self, EmbedError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EmbedError::resource(&path.display().to_string(), e))?;
        Self::from_vocab(&text, max_length)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Token ids for one sequence, framed with `<cls>` and `<eos>`.
    ///
    /// Unknown residues and sequences longer than the model context are errors: the
    /// sequence is never truncated or silently mapped to `<unk>`.
    pub fn encode(&self, sequence: &str) -> Result<Vec<u32>, EmbedError> {
        let residues = split_residues(sequence);
        if residues.is_empty() {
            return Err(EmbedError::tokenization("empty sequence"));
        }
        let n_tokens = residues.len() + 2;
        if n_tokens > self.max_length {
            return Err(EmbedError::tokenization(format!(
                "{n_tokens} tokens exceed the model context of {}",
                self.max_length
            )));
        }
        let encoding = self
            .tokenizer
            .encode(residues.as_slice(), false)
            .map_err(|e| EmbedError::tokenization(e.to_string()))?;
        let ids = encoding.get_ids();
        if let Some(pos) = ids.iter().position(|&id| id == self.unk_token_id) {
            return Err(EmbedError::tokenization(format!(
                "unsupported residue {:?} at position {pos}",
                residues[pos]
            )));
        }

        let mut framed = Vec::with_capacity(n_tokens);
        framed.push(self.cls_token_id);
        framed.extend_from_slice(ids);
        framed.push(self.eos_token_id);
        Ok(framed)
    }
}

/// One token per character, except `<...>` special tokens which stay whole.
/// Whitespace between residues is dropped.
fn split_residues(sequence: &str) -> Vec<&str> {
    let mut residues = Vec::with_capacity(sequence.len());
    let mut rest = sequence;
    while let Some(c) = rest.chars().next() {
        let len = match (c, rest.find('>')) {
            ('<', Some(end)) => end + 1,
            _ => c.len_utf8(),
        };
        if !c.is_whitespace() {
            residues.push(&rest[..len]);
        }
        rest = &rest[len..];
    }
    residues
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasso_test_data::TestFile;

    fn tokenizer() -> anyhow::Result<EsmTokenizer> {
        let vocab = std::str::from_utf8(TestFile::esm2_vocab().bytes())?;
        Ok(EsmTokenizer::from_vocab(vocab, 24)?)
    }

    #[test]
    fn test_encode() -> anyhow::Result<()> {
        let tok = tokenizer()?;
        assert_eq!(tok.vocab_size(), 33);
        assert_eq!(tok.encode("MKT")?, vec![0, 20, 15, 11, 2]);
        assert_eq!(tok.encode("MK<mask>T")?, vec![0, 20, 15, 32, 11, 2]);
        Ok(())
    }

    #[test]
    fn test_unknown_residue() -> anyhow::Result<()> {
        let tok = tokenizer()?;
        for seq in ["MKJ", "mkt"] {
            match tok.encode(seq) {
                Err(EmbedError::Tokenization { reason, .. }) => {
                    assert!(reason.contains("unsupported residue"), "{reason}")
                }
                other => panic!("expected tokenization error for {seq}, got {other:?}"),
            }
        }
        Ok(())
    }

    #[test]
    fn test_context_length() -> anyhow::Result<()> {
        let tok = tokenizer()?;
        let fits = "A".repeat(22);
        assert_eq!(tok.encode(&fits)?.len(), 24);
        let too_long = "A".repeat(23);
        assert!(matches!(tok.encode(&too_long), Err(EmbedError::Tokenization { .. })));
        Ok(())
    }

    #[test]
    fn test_empty_sequence() -> anyhow::Result<()> {
        let tok = tokenizer()?;
        assert!(tok.encode("  ").is_err());
        Ok(())
    }

    #[test]
    fn test_split_residues() {
        assert_eq!(split_residues("GA<mask>Y"), vec!["G", "A", "<mask>", "Y"]);
        assert_eq!(split_residues("<"), vec!["<"]);
        assert_eq!(split_residues(" G A\tY\n"), vec!["G", "A", "Y"]);
    }

    #[test]
    fn test_whitespace_between_residues() -> anyhow::Result<()> {
        let tok = tokenizer()?;
        assert_eq!(tok.encode("MK T")?, tok.encode("MKT")?);
        assert_eq!(tok.encode(" M K <mask> T ")?, vec![0, 20, 15, 32, 11, 2]);
        Ok(())
    }
}
