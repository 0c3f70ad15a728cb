use super::commands;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mean-pooled ESM-2 embeddings for every sequence of a CSV file
    Embed(commands::embed::EmbedArgs),
    /// Grid search each classifier family with 10-fold balanced accuracy
    Search(commands::search::SearchArgs),
    /// Repeated stratified cross-validation of selected hyperparameters
    Evaluate(commands::evaluate::EvaluateArgs),
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Embed(args) => commands::embed::execute(args),
            Commands::Search(args) => commands::search::execute(args),
            Commands::Evaluate(args) => commands::evaluate::execute(args),
        }
    }
}
