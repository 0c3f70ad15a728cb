//! lasso-test-data
//!
//! A module to provide test files embedded in the crate for use in testing.
//! Small peptide tables and an ESM-2 vocabulary/config are included in the crate
//! distribution so tests never need the network.
//!
//! The test files are represented as `TestFile` objects which package the raw binary data
//! and create temporary files for programs to operate on.
use std::fs;
use std::path::Path;
use tempfile::{Builder, NamedTempFile, TempDir};

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle ensures the tempfile remains in scope
/// use lasso_test_data::TestFile;
/// let (csv_file, _temp) = TestFile::fusilassin_variants().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Thirty single-substitution variants of the fusilassin core peptide.
    /// Columns: `sequence,label`.
    pub fn fusilassin_variants() -> Self {
        Self {
            filebinary: include_bytes!("../data/peptides/fusilassin_variants.csv"),
            suffix: "csv",
        }
    }
    /// Ubonodin variants laid out as `variant,score,sequence`.
    /// The sequence lives in the third column.
    pub fn ubonodin_scores() -> Self {
        Self {
            filebinary: include_bytes!("../data/peptides/ubonodin_scores.csv"),
            suffix: "csv",
        }
    }
    /// A table whose label column contains a non-integer entry.
    pub fn bad_labels() -> Self {
        Self {
            filebinary: include_bytes!("../data/peptides/bad_labels.csv"),
            suffix: "csv",
        }
    }
    /// `vocab.txt` shipped with the ESM-2 checkpoints (33 tokens).
    pub fn esm2_vocab() -> Self {
        Self {
            filebinary: include_bytes!("../data/esm2/vocab.txt"),
            suffix: "txt",
        }
    }
    /// A tiny ESM-2 `config.json`: 2 layers, hidden size 16, 4 heads, 24 positions.
    pub fn esm2_tiny_config() -> Self {
        Self {
            filebinary: include_bytes!("../data/esm2/config_tiny.json"),
            suffix: "json",
        }
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.filebinary
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }

    /// Write the file under `dir` with a fixed name. Useful when a loader expects
    /// a checkpoint directory (`config.json`, `vocab.txt`, ...).
    pub fn write_to(&self, dir: &Path, name: &str) -> std::io::Result<()> {
        fs::write(dir.join(name), self.filebinary)
    }
}

/// A temporary checkpoint directory holding the tiny ESM-2 `config.json` and `vocab.txt`.
/// Weights are not included; callers initialise them as needed.
pub fn tiny_esm2_dir() -> std::io::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    TestFile::esm2_tiny_config().write_to(dir.path(), "config.json")?;
    TestFile::esm2_vocab().write_to(dir.path(), "vocab.txt")?;
    Ok(dir)
}
