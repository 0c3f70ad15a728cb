use super::{load_dataset, write_json};
use anyhow::{bail, Context};
use clap::Args;
use lasso_learn::{evaluate, BestParameters, EvaluationConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// CSV file with sequences and 0/1 labels
    #[arg(short, long)]
    input: PathBuf,

    /// Embedding matrix written by `lasso embed`
    #[arg(short, long)]
    embeddings: PathBuf,

    /// Parameters written by `lasso search`
    #[arg(short, long)]
    params: PathBuf,

    #[arg(long, default_value_t = 0)]
    sequence_column: usize,

    #[arg(long, default_value_t = 1)]
    label_column: usize,

    #[arg(long, default_value_t = 10)]
    folds: usize,

    #[arg(long, default_value_t = 5)]
    repeats: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ParamsFile {
    best_parameters: BestParameters,
}

fn read_params(path: &Path) -> anyhow::Result<BestParameters> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ParamsFile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    for (family, params) in &file.best_parameters {
        if params.family() != *family {
            bail!(
                "{}: parameters listed under {family} are for {}",
                path.display(),
                params.family()
            );
        }
    }
    if file.best_parameters.is_empty() {
        bail!("{}: no parameters to evaluate", path.display());
    }
    Ok(file.best_parameters)
}

pub fn execute(args: EvaluateArgs) -> anyhow::Result<()> {
    let params = read_params(&args.params)?;
    let dataset = load_dataset(
        &args.input,
        &args.embeddings,
        args.sequence_column,
        args.label_column,
    )?;
    let config = EvaluationConfig::builder()
        .n_splits(args.folds)
        .n_repeats(args.repeats)
        .seed(args.seed)
        .build();

    let result = evaluate(&dataset, &params, &config)?;
    for summary in result.summary() {
        let means: Vec<String> = result.repeat_means[&summary.family]
            .iter()
            .map(|m| format!("{m:.4}"))
            .collect();
        println!(
            "{:<10} {:.4} ± {:.4}  [{}]",
            summary.family, summary.mean, summary.std, means.join(", ")
        );
    }
    if let Some(output) = &args.output {
        write_json(output, &result)?;
    }
    Ok(())
}
