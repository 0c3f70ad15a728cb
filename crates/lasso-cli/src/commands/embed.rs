use anyhow::Context;
use clap::Args;
use lasso_io::{read_labeled_sequences, CsvColumns};
use lasso_plms::{device, EmbeddingExtractor, HubSource, ModelConfiguration};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// CSV file with a header row
    #[arg(short, long)]
    input: PathBuf,

    /// Prefix of the default output files, `<target>_<Model>.safetensors`
    #[arg(short, long)]
    target: String,

    /// Only run these models (repeatable). Defaults to every configured model
    #[arg(short, long = "model")]
    models: Vec<String>,

    /// JSON list of `{name, model_path, output_file}` replacing the default models
    #[arg(long)]
    models_config: Option<PathBuf>,

    /// Zero-based index of the sequence column
    #[arg(long, default_value_t = 0)]
    sequence_column: usize,

    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Hub revision of every checkpoint
    #[arg(long)]
    revision: Option<String>,

    /// Run on the CPU even when a GPU is available
    #[arg(long)]
    cpu: bool,
}

pub fn execute(args: EmbedArgs) -> anyhow::Result<()> {
    let config = match &args.models_config {
        Some(path) => ModelConfiguration::from_json_file(path)?,
        None => ModelConfiguration::lasso_defaults(&args.target),
    };
    let config = if args.models.is_empty() {
        config
    } else {
        config.select(&args.models)?
    };

    let columns = CsvColumns::sequences_only(args.sequence_column);
    let table = read_labeled_sequences(&args.input, &columns)?;
    tracing::info!("{} sequences from {}", table.len(), args.input.display());

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let source = HubSource {
        revision: args.revision,
    };
    let extractor =
        EmbeddingExtractor::with_source(config, source, device(args.cpu)?, args.out_dir);
    for path in extractor.embed_all(&table.sequences)? {
        println!("{}", path.display());
    }
    Ok(())
}
