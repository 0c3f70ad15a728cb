use anyhow::Result;
use assert_cmd::Command;
use lasso_io::EmbeddingMatrix;
use lasso_test_data::TestFile;
use ndarray::Array2;
use std::path::Path;

/// Separable embeddings aligned with the fusilassin table (8 negatives, 22 positives).
fn write_embeddings(csv: &str, path: &Path) -> Result<()> {
    let labels: Vec<f32> = std::fs::read_to_string(csv)?
        .lines()
        .skip(1)
        .map(|line| line.trim().ends_with('1') as u8 as f32)
        .collect();
    let values = Array2::from_shape_fn((labels.len(), 6), |(i, j)| {
        labels[i] * 3.0 + ((i * 7 + j * 13) % 10) as f32 * 0.1
    });
    EmbeddingMatrix::new(values)
        .with_metadata("model_name", "Synthetic")
        .save(path)?;
    Ok(())
}

#[test]
fn test_search_then_evaluate() -> Result<()> {
    let (csv, _tmp) = TestFile::fusilassin_variants().create_temp()?;
    let dir = tempfile::tempdir()?;
    let embeddings = dir.path().join("Fusilassin_Synthetic.safetensors");
    let params = dir.path().join("best_params.json");
    let cv = dir.path().join("cv.json");
    write_embeddings(&csv, &embeddings)?;

    Command::cargo_bin("lasso")?
        .arg("search")
        .arg("--input")
        .arg(&csv)
        .arg("--embeddings")
        .arg(&embeddings)
        .args(["--family", "svc", "--folds", "4", "--seed", "0"])
        .arg("--output")
        .arg(&params)
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&params)?)?;
    assert_eq!(report["best_parameters"]["svc"]["family"], "svc");
    assert_eq!(
        report["families"][0]["candidates"].as_array().map(Vec::len),
        Some(12)
    );

    Command::cargo_bin("lasso")?
        .arg("evaluate")
        .arg("--input")
        .arg(&csv)
        .arg("--embeddings")
        .arg(&embeddings)
        .arg("--params")
        .arg(&params)
        .args(["--folds", "4", "--repeats", "2"])
        .arg("--output")
        .arg(&cv)
        .assert()
        .success();

    let result: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&cv)?)?;
    let means = result["repeat_means"]["svc"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(means.len(), 2);
    assert_eq!(result["folds"].as_array().map(Vec::len), Some(8));
    Ok(())
}

#[test]
fn test_embedding_rows_must_match_table() -> Result<()> {
    let (csv, _tmp) = TestFile::fusilassin_variants().create_temp()?;
    let dir = tempfile::tempdir()?;
    let embeddings = dir.path().join("short.safetensors");
    EmbeddingMatrix::new(Array2::zeros((5, 4))).save(&embeddings)?;

    Command::cargo_bin("lasso")?
        .arg("search")
        .arg("--input")
        .arg(&csv)
        .arg("--embeddings")
        .arg(&embeddings)
        .args(["--family", "rf"])
        .arg("--output")
        .arg(dir.path().join("params.json"))
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_embed_unknown_model() -> Result<()> {
    let (csv, _tmp) = TestFile::fusilassin_variants().create_temp()?;
    let dir = tempfile::tempdir()?;

    Command::cargo_bin("lasso")?
        .arg("embed")
        .arg("--input")
        .arg(&csv)
        .args(["--target", "Fusilassin", "--model", "NotAModel", "--cpu"])
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .failure();
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}
