//! Training, evaluation, prediction and summary pipelines.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use listnet::inference::ListNetScorer;
use listnet::training::data::RankingDataset;
use listnet::training::loss::LossStrategy;
use listnet::training::metrics::descending_order;
use listnet::training::trainer::{read_checkpoint_meta, train};

use crate::config::{build_ranker_config, build_training_config, load_config_toml, ListNetToml, TrainCliOverrides};
use crate::results::{relative_change, TrainingReport};

type InferenceBackend = NdArray<f32>;
type TrainBackend = Autodiff<NdArray<f32>>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// JSONL file of ranking items.
    pub data: PathBuf,
    /// Optional separate validation file. Without it `data` is split by `tv_ratio`.
    pub validation: Option<PathBuf>,
    /// Optional TOML config file.
    pub config: Option<PathBuf>,
    /// CLI overrides for training hyperparameters.
    pub overrides: TrainCliOverrides,
    /// Resume training from a checkpoint directory.
    pub resume_from: Option<PathBuf>,
    /// Path to write the JSON training report.
    pub report: Option<PathBuf>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    pub checkpoint: PathBuf,
    pub data: PathBuf,
    pub k: usize,
    pub batch_size: usize,
    pub loss: LossStrategy,
    pub top_k: usize,
    /// Path to write the JSON evaluation report.
    pub output: Option<PathBuf>,
}

/// Arguments for the `predict` subcommand.
#[derive(Debug)]
pub struct PredictArgs {
    pub checkpoint: PathBuf,
    /// JSONL file with a `features` array per line.
    pub input: PathBuf,
    /// Output JSONL path. Writes to stdout when absent.
    pub output: Option<PathBuf>,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub input: PathBuf,
    pub json: bool,
}

/// One line of `predict` input. Any other fields are ignored.
#[derive(Debug, Deserialize)]
struct FeatureRow {
    features: Vec<f32>,
}

/// One line of `predict` output.
#[derive(Debug, Serialize)]
struct PredictionRecord {
    /// Line index of the item in the input file.
    index: usize,
    score: f64,
    /// 1-based position when ordered by descending score.
    rank: usize,
}

/// Train a ListNet ranker and write checkpoints (and optionally a report).
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = match &args.config {
        Some(path) => load_config_toml(path)?,
        None => ListNetToml::default(),
    };
    let config = build_training_config(&toml.training, &args.overrides);

    // 2. Load data and split
    let dataset = RankingDataset::from_jsonl(&args.data)?;
    let (train_set, validation_set) = match &args.validation {
        Some(path) => (dataset, RankingDataset::from_jsonl(path)?),
        None => {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            dataset.split(config.tv_ratio, &mut rng)?
        }
    };
    tracing::info!(
        train = train_set.len(),
        validation = validation_set.len(),
        width = train_set.width(),
        "Loaded ranking data"
    );

    // 3. Build model
    let device = NdArrayDevice::default();
    let ranker_config = build_ranker_config(train_set.width(), &toml.model);
    let model = ranker_config.init::<TrainBackend>(&device);

    // 4. Train with progress bar
    let completed = match &args.resume_from {
        Some(dir) => read_checkpoint_meta(dir)?.epoch,
        None => 0,
    };
    let pb = ProgressBar::new(config.n_epoch as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs {msg}")
            .expect("valid progress bar template")
            .progress_chars("=> "),
    );
    pb.set_position(completed.min(config.n_epoch) as u64);

    let outcome = train(
        &config,
        model,
        &train_set,
        &validation_set,
        &device,
        args.resume_from.as_deref(),
        &mut |record| {
            pb.set_message(format!(
                "loss {:.4}/{:.4}",
                record.train_loss, record.validation_loss
            ));
            pb.inc(1);
        },
    )?;
    pb.finish_with_message("done");

    // 5. Summary and report
    let history = outcome.history;
    let final_checkpoint = PathBuf::from(&config.checkpoint_dir).join("final");
    let elapsed = start.elapsed();

    println!("\n--- Training Summary ---");
    println!("Epochs: {}", history.len());
    if let Some(last) = history.last() {
        println!("Final train loss: {:.6}", last.train_loss);
        println!("Final validation loss: {:.6}", last.validation_loss);
        println!("Final validation NDCG@{}: {}", config.ndcg_k, format_optional(last.validation_ndcg));
    }
    if let Some(change) = relative_change(&history.validation_loss()) {
        println!("Validation loss change: {:+.1}%", change * 100.0);
    }
    if let Some(best) = history.best_validation_epoch() {
        println!(
            "Best validation NDCG@{}: {} (epoch {})",
            config.ndcg_k,
            format_optional(best.validation_ndcg),
            best.epoch
        );
    }
    println!("Checkpoint: {}", final_checkpoint.display());
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    if let Some(path) = &args.report {
        let report = TrainingReport {
            data: args.data.display().to_string(),
            validation_data: args.validation.as_ref().map(|p| p.display().to_string()),
            train_items: train_set.len(),
            validation_items: validation_set.len(),
            model: ranker_config,
            final_checkpoint: final_checkpoint.display().to_string(),
            final_epoch: history.last().cloned(),
            best_validation_epoch: history.best_validation_epoch().cloned(),
            training: config,
            history,
            elapsed_secs: elapsed.as_secs_f64(),
        };
        report.write_json(path)?;
    }

    Ok(())
}

/// Compute loss and NDCG@k of a checkpoint over a labelled dataset.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let scorer = ListNetScorer::<InferenceBackend>::load(&args.checkpoint, NdArrayDevice::default())?;
    let dataset = RankingDataset::from_jsonl(&args.data)?;

    let report = scorer.evaluate(&dataset, args.k, args.batch_size, args.loss, args.top_k)?;

    println!("--- Evaluation ---");
    println!("Checkpoint: {}", args.checkpoint.display());
    println!("Items: {}", report.items);
    println!("Loss ({}): {:.6}", report.loss_strategy, report.loss);
    println!("NDCG@{}: {}", report.k, format_optional(report.ndcg));

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "Wrote evaluation report");
    }
    Ok(())
}

/// Score every item of a JSONL file and write one prediction per line.
pub fn run_predict(args: PredictArgs) -> anyhow::Result<()> {
    let scorer = ListNetScorer::<InferenceBackend>::load(&args.checkpoint, NdArrayDevice::default())?;
    let rows = read_feature_rows(&args.input)?;

    let scores = scorer.score(&rows)?;
    let mut ranks = vec![0usize; scores.len()];
    for (position, &index) in descending_order(&scores).iter().enumerate() {
        ranks[index] = position + 1;
    }

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    for (index, (&score, &rank)) in scores.iter().zip(&ranks).enumerate() {
        serde_json::to_writer(&mut writer, &PredictionRecord { index, score, rank })?;
        writeln!(writer)?;
    }
    writer.flush()?;

    tracing::info!(items = scores.len(), "Wrote predictions");
    Ok(())
}

/// Print statistics of a ranking JSONL file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = RankingDataset::from_jsonl(&args.input)?.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Dataset Summary ---");
    println!("File: {}", args.input.display());
    println!("Items: {}", summary.items);
    println!("Feature width: {}", summary.width);
    println!(
        "Relevance: min {:.3} max {:.3} mean {:.3}",
        summary.relevance_min, summary.relevance_max, summary.relevance_mean
    );
    println!("Zero relevance: {}", summary.zero_relevance);
    for (grade, count) in &summary.grade_counts {
        println!("  grade {grade}: {count}");
    }
    Ok(())
}

fn read_feature_rows(path: &Path) -> anyhow::Result<Vec<Vec<f32>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
    let mut rows = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: FeatureRow = serde_json::from_str(&line).map_err(|e| {
            anyhow::anyhow!("{}:{}: invalid feature row: {e}", path.display(), line_num + 1)
        })?;
        rows.push(row.features);
    }
    Ok(rows)
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string())
}
