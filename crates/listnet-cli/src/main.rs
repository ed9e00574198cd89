mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use listnet::training::loss::{LossStrategy, DEFAULT_LISTWISE_TOP_K};
use listnet::training::metrics::DEFAULT_NDCG_K;
use listnet::training::trainer::OptimizerKind;

use config::TrainCliOverrides;
use pipeline::{EvaluateArgs, PredictArgs, SummaryArgs, TrainArgs};

/// listnet: listwise learning-to-rank with a Jensen-Shannon objective and NDCG evaluation.
#[derive(Parser)]
#[command(name = "listnet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, evaluation, scoring and data inspection.
#[derive(Subcommand)]
enum Command {
    /// Train a ranker on a JSONL file of ranking items.
    Train {
        /// Path to the training JSONL file (`{"features": [...], "relevance": r}` per line).
        #[arg(long)]
        data: PathBuf,
        /// Separate validation JSONL file. Without it the data is split by `tv_ratio`.
        #[arg(long)]
        validation: Option<PathBuf>,
        /// Path to a listnet config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for saving checkpoints.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the minibatch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Optimizer: adam, adamw or sgd.
        #[arg(long)]
        optimizer: Option<OptimizerKind>,
        /// Loss strategy: jsd or topk.
        #[arg(long)]
        loss: Option<LossStrategy>,
        /// Prefix length for the top-k loss.
        #[arg(long)]
        top_k: Option<usize>,
        /// NDCG cutoff for per-epoch reporting.
        #[arg(long)]
        ndcg_k: Option<usize>,
        /// RNG seed for splitting and shuffling.
        #[arg(long)]
        seed: Option<u64>,
        /// Resume training from a checkpoint directory.
        #[arg(long)]
        resume_from: Option<PathBuf>,
        /// Path to write the JSON training report.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Compute loss and NDCG of a checkpoint over a labelled JSONL file.
    Evaluate {
        /// Checkpoint directory (e.g. checkpoints/listnet/final).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Labelled JSONL file.
        #[arg(long)]
        data: PathBuf,
        /// NDCG cutoff.
        #[arg(long, default_value_t = DEFAULT_NDCG_K)]
        k: usize,
        /// Items per scored list when computing the loss.
        #[arg(long, default_value_t = 20)]
        batch_size: usize,
        /// Loss strategy: jsd or topk.
        #[arg(long, default_value = "jsd")]
        loss: LossStrategy,
        /// Prefix length for the top-k loss.
        #[arg(long, default_value_t = DEFAULT_LISTWISE_TOP_K)]
        top_k: usize,
        /// Path to write the JSON evaluation report.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score the items of a JSONL file and write score and rank per line.
    Predict {
        /// Checkpoint directory (e.g. checkpoints/listnet/final).
        #[arg(long)]
        checkpoint: PathBuf,
        /// JSONL file with a `features` array per line.
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print statistics of a ranking JSONL file.
    Summary {
        /// Path to the JSONL file.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            data,
            validation,
            config,
            output_dir,
            epochs,
            batch_size,
            lr,
            optimizer,
            loss,
            top_k,
            ndcg_k,
            seed,
            resume_from,
            report,
        } => pipeline::run_train(TrainArgs {
            data,
            validation,
            config,
            overrides: TrainCliOverrides {
                n_epoch: epochs,
                batch_size,
                lr,
                optimizer,
                loss,
                listwise_top_k: top_k,
                ndcg_k,
                seed,
                checkpoint_dir: output_dir.map(|p| p.display().to_string()),
            },
            resume_from,
            report,
        }),
        Command::Evaluate {
            checkpoint,
            data,
            k,
            batch_size,
            loss,
            top_k,
            output,
        } => pipeline::run_evaluate(EvaluateArgs {
            checkpoint,
            data,
            k,
            batch_size,
            loss,
            top_k,
            output,
        }),
        Command::Predict {
            checkpoint,
            input,
            output,
        } => pipeline::run_predict(PredictArgs {
            checkpoint,
            input,
            output,
        }),
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
    }
}
