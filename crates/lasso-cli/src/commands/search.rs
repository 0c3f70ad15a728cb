use super::{load_dataset, write_json};
use clap::Args;
use lasso_learn::{
    best_parameters, search_all, BestParameters, CandidateScore, ClassifierFamily, SearchConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// CSV file with sequences and 0/1 labels
    #[arg(short, long)]
    input: PathBuf,

    /// Embedding matrix written by `lasso embed`
    #[arg(short, long)]
    embeddings: PathBuf,

    #[arg(long, default_value_t = 0)]
    sequence_column: usize,

    #[arg(long, default_value_t = 1)]
    label_column: usize,

    /// Families to search (repeatable): rf, adaboost, svc, mlp. Defaults to all
    #[arg(short, long = "family")]
    families: Vec<ClassifierFamily>,

    #[arg(long, default_value_t = 10)]
    folds: usize,

    /// Seed every classifier fit. Unseeded fits draw fresh entropy
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the selected parameters and every candidate's scores
    #[arg(short, long, default_value = "best_params.json")]
    output: PathBuf,
}

/// Output of `search`, read back by `evaluate`.
#[derive(Serialize)]
pub struct SearchReport {
    pub best_parameters: BestParameters,
    pub families: Vec<FamilyReport>,
}

#[derive(Serialize)]
pub struct FamilyReport {
    pub family: ClassifierFamily,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

pub fn execute(args: SearchArgs) -> anyhow::Result<()> {
    let dataset = load_dataset(
        &args.input,
        &args.embeddings,
        args.sequence_column,
        args.label_column,
    )?;
    let families = if args.families.is_empty() {
        ClassifierFamily::iter().collect()
    } else {
        args.families
    };
    let config = SearchConfig::builder()
        .n_splits(args.folds)
        .maybe_seed(args.seed)
        .build();

    let results = search_all(&dataset, &families, &config)?;
    for result in &results {
        println!(
            "{:<10} {:.4}  {}",
            result.family, result.best_score, result.best_params
        );
    }

    let report = SearchReport {
        best_parameters: best_parameters(&results),
        families: results
            .into_iter()
            .map(|r| FamilyReport {
                family: r.family,
                best_score: r.best_score,
                candidates: r.candidates,
            })
            .collect(),
    };
    write_json(&args.output, &report)
}
