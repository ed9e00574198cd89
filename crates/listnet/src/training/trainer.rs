//! ListNet training loop.
//!
//! Ties together the dataset minibatching, the ranking network, the listwise
//! loss and the NDCG metric into an epoch loop over a burn optimizer, with
//! checkpointing and resume.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::model::bridge::{select_rows_to_tensor, tensor_to_f64, values_to_tensor};
use crate::model::ranker::{Ranker, RankerConfig};
use crate::training::data::{minibatch_ranges, permutation, RankingDataset};
use crate::training::loss::{ranking_loss, LossStrategy};
use crate::training::metrics::{ndcg_at_k, EpochRecord, MetricsHistory};
use crate::types::RankingError;

/// File name of the model config inside a checkpoint directory.
pub const RANKER_CONFIG_FILE: &str = "ranker.json";
/// File name of the checkpoint metadata inside a checkpoint directory.
pub const META_FILE: &str = "meta.json";

/// Optimizer used for parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    AdamW,
    Sgd,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::AdamW => write!(f, "adamw"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            other => Err(format!("unknown optimizer '{other}' (expected adam, adamw or sgd)")),
        }
    }
}

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(Serialize, Deserialize, Debug)]
pub struct CheckpointMeta {
    /// Last completed epoch.
    pub epoch: usize,
    /// History up to and including `epoch`.
    pub history: MetricsHistory,
}

/// Configuration for ListNet training.
#[derive(Config, Debug)]
pub struct ListNetTrainingConfig {
    /// Number of passes over the training split.
    #[config(default = 20)]
    pub n_epoch: usize,
    /// Items per minibatch. Each minibatch is scored as one list.
    #[config(default = 20)]
    pub batch_size: usize,
    /// Learning rate.
    #[config(default = 1e-3)]
    pub lr: f64,
    /// Optimizer algorithm.
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    /// Weight decay, only used by AdamW.
    #[config(default = 0.01)]
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping. `None` disables clipping.
    pub max_grad_norm: Option<f64>,
    /// Listwise objective.
    #[config(default = "LossStrategy::JensenShannon")]
    pub loss: LossStrategy,
    /// Prefix length for the top-k listwise objective.
    #[config(default = 5)]
    pub listwise_top_k: usize,
    /// NDCG cutoff used for per-epoch reporting.
    #[config(default = 20)]
    pub ndcg_k: usize,
    /// Fraction of the data used for training when splitting a single file.
    #[config(default = 0.95)]
    pub tv_ratio: f64,
    /// RNG seed for shuffling. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Epochs between checkpoint saves. 0 saves only the final checkpoint.
    #[config(default = 5)]
    pub checkpoint_interval: usize,
    /// Directory for saving checkpoints.
    #[config(default = "String::from(\"checkpoints/listnet\")")]
    pub checkpoint_dir: String,
}

/// Trained model plus the per-epoch history.
pub struct TrainingOutcome<B: Backend> {
    pub model: Ranker<B>,
    pub history: MetricsHistory,
}

/// Mean loss over `order`, scored in minibatches of `batch_size` and
/// weighted by minibatch length. No parameters are updated.
///
/// # Errors
/// `ZeroBatchSize` if `batch_size` is 0, `Empty` if `order` is empty.
pub fn evaluate_loss<B: Backend>(
    model: &Ranker<B>,
    dataset: &RankingDataset,
    order: &[usize],
    batch_size: usize,
    strategy: LossStrategy,
    top_k: usize,
    device: &B::Device,
) -> Result<f64, RankingError> {
    if batch_size == 0 {
        return Err(RankingError::ZeroBatchSize);
    }
    if order.is_empty() {
        return Err(RankingError::Empty("no items to evaluate"));
    }
    let mut sum_loss = 0.0;
    for range in minibatch_ranges(order.len(), batch_size) {
        let batch = &order[range];
        let input = select_rows_to_tensor::<B>(dataset.features(), batch, device);
        let target = values_to_tensor::<B>(&dataset.relevance_at(batch), device);
        let loss = ranking_loss(strategy, target, model.forward_scores(input), top_k)?;
        sum_loss += tensor_to_f64(loss) * batch.len() as f64;
    }
    Ok(sum_loss / order.len() as f64)
}

/// NDCG@k of the model's scores over a whole dataset.
///
/// Returns `Ok(None)` when the dataset has no relevant items in its top k,
/// which leaves NDCG undefined. Other metric errors propagate.
pub fn dataset_ndcg<B: Backend>(
    model: &Ranker<B>,
    dataset: &RankingDataset,
    k: usize,
    device: &B::Device,
) -> Result<Option<f64>, RankingError> {
    let scores = model.predict(dataset.features(), device);
    match ndcg_at_k(&dataset.relevance_f64(), &scores, k) {
        Ok(ndcg) => Ok(Some(ndcg)),
        Err(RankingError::DegenerateInput { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check the datasets and config against the model before any epoch runs.
fn validate_inputs<B: Backend>(
    config: &ListNetTrainingConfig,
    model: &Ranker<B>,
    train_set: &RankingDataset,
    validation_set: &RankingDataset,
) -> anyhow::Result<()> {
    if config.batch_size == 0 {
        return Err(RankingError::ZeroBatchSize.into());
    }
    if config.loss == LossStrategy::TopKListwise && config.listwise_top_k == 0 {
        anyhow::bail!("listwise_top_k must be > 0 for the top-k loss");
    }
    for (name, dataset) in [("train", train_set), ("validation", validation_set)] {
        if dataset.width() != model.d_input() {
            anyhow::bail!(
                "{name} features have width {}, model expects {}",
                dataset.width(),
                model.d_input()
            );
        }
        if dataset.len() < config.ndcg_k {
            return Err(anyhow::Error::new(RankingError::Bounds {
                len: dataset.len(),
                k: config.ndcg_k,
            })
            .context(format!("{name} split is too small for NDCG@{}", config.ndcg_k)));
        }
    }
    Ok(())
}

/// Run the ListNet training loop.
///
/// Each epoch shuffles the training split, takes one optimizer step per
/// minibatch, then computes the validation loss and train/validation NDCG on
/// the inference-mode model. `on_epoch` is called with every new record.
///
/// # Arguments
/// - `config`: training hyperparameters
/// - `model`: initialized Ranker (consumed and returned updated)
/// - `train_set` / `validation_set`: the two splits
/// - `device`: burn device for tensor operations
/// - `resume_from`: checkpoint directory to restore model, optimizer and
///   history from; training continues at the epoch after the saved one
/// - `on_epoch`: progress callback
pub fn train<B: AutodiffBackend>(
    config: &ListNetTrainingConfig,
    model: Ranker<B>,
    train_set: &RankingDataset,
    validation_set: &RankingDataset,
    device: &B::Device,
    resume_from: Option<&Path>,
    on_epoch: &mut dyn FnMut(&EpochRecord),
) -> anyhow::Result<TrainingOutcome<B>> {
    validate_inputs(config, &model, train_set, validation_set)?;
    std::fs::create_dir_all(&config.checkpoint_dir)?;

    tracing::info!(
        optimizer = %config.optimizer,
        loss = %config.loss,
        lr = config.lr,
        batch_size = config.batch_size,
        n_epoch = config.n_epoch,
        train = train_set.len(),
        validation = validation_set.len(),
        "Starting ListNet training"
    );

    let clipping = config
        .max_grad_norm
        .map(|norm| GradientClippingConfig::Norm(norm as f32));

    match config.optimizer {
        OptimizerKind::Adam => {
            let optimizer = AdamConfig::new()
                .with_grad_clipping(clipping)
                .init::<B, Ranker<B>>();
            run_epochs(config, model, optimizer, train_set, validation_set, device, resume_from, on_epoch)
        }
        OptimizerKind::AdamW => {
            let optimizer = AdamWConfig::new()
                .with_weight_decay(config.weight_decay as f32)
                .with_grad_clipping(clipping)
                .init::<B, Ranker<B>>();
            run_epochs(config, model, optimizer, train_set, validation_set, device, resume_from, on_epoch)
        }
        OptimizerKind::Sgd => {
            let optimizer = SgdConfig::new()
                .with_gradient_clipping(clipping)
                .init::<B, Ranker<B>>();
            run_epochs(config, model, optimizer, train_set, validation_set, device, resume_from, on_epoch)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_epochs<B, O>(
    config: &ListNetTrainingConfig,
    mut model: Ranker<B>,
    mut optimizer: O,
    train_set: &RankingDataset,
    validation_set: &RankingDataset,
    device: &B::Device,
    resume_from: Option<&Path>,
    on_epoch: &mut dyn FnMut(&EpochRecord),
) -> anyhow::Result<TrainingOutcome<B>>
where
    B: AutodiffBackend,
    O: Optimizer<Ranker<B>, B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut history = MetricsHistory::new();
    let mut completed_epochs = 0;

    // Resume from checkpoint if requested
    if let Some(dir) = resume_from {
        model = model
            .load_file(dir.join("model"), &recorder, device)
            .map_err(|e| anyhow::anyhow!("Failed to load model from {}: {e}", dir.display()))?;

        let optim_record = Recorder::<B>::load(&recorder, dir.join("optimizer"), device)
            .map_err(|e| anyhow::anyhow!("Failed to load optimizer from {}: {e}", dir.display()))?;
        optimizer = optimizer.load_record(optim_record);

        let meta = read_checkpoint_meta(dir)?;
        completed_epochs = meta.epoch;
        history = meta.history;
        tracing::info!(
            checkpoint = %dir.display(),
            completed_epochs,
            "Resumed training from checkpoint"
        );
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    // Replay the shuffles of completed epochs so a seeded resume continues
    // the same permutation sequence as an uninterrupted run.
    for _ in 0..completed_epochs {
        let _ = permutation(train_set.len(), &mut rng);
        let _ = permutation(validation_set.len(), &mut rng);
    }
    let checkpoint_dir = PathBuf::from(&config.checkpoint_dir);
    let train_start = Instant::now();

    for epoch in (completed_epochs + 1)..=config.n_epoch {
        // Training pass
        let order = permutation(train_set.len(), &mut rng);
        let mut sum_loss = 0.0;
        for range in minibatch_ranges(order.len(), config.batch_size) {
            let batch = &order[range];
            let input = select_rows_to_tensor::<B>(train_set.features(), batch, device);
            let target = values_to_tensor::<B>(&train_set.relevance_at(batch), device);

            let scores = model.forward_scores(input);
            let loss = ranking_loss(config.loss, target, scores, config.listwise_top_k)?;
            let loss_val = tensor_to_f64(loss.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.lr, model, grads);

            sum_loss += loss_val * batch.len() as f64;
        }
        let train_loss = sum_loss / train_set.len() as f64;

        // Validation pass and NDCG, no parameter updates
        let eval_model = model.valid();
        let validation_order = permutation(validation_set.len(), &mut rng);
        let validation_loss = evaluate_loss(
            &eval_model,
            validation_set,
            &validation_order,
            config.batch_size,
            config.loss,
            config.listwise_top_k,
            device,
        )?;
        let train_ndcg = dataset_ndcg(&eval_model, train_set, config.ndcg_k, device)?;
        let validation_ndcg = dataset_ndcg(&eval_model, validation_set, config.ndcg_k, device)?;

        let record = EpochRecord {
            epoch,
            train_loss,
            validation_loss,
            train_ndcg,
            validation_ndcg,
        };

        let warnings = record.health_check();
        if !warnings.is_empty() {
            tracing::warn!(epoch, "Health check warnings: {:?}", warnings);
        }
        tracing::info!(
            epoch,
            train_loss = format!("{train_loss:.6}"),
            validation_loss = format!("{validation_loss:.6}"),
            "NDCG@{} | train: {} validation: {}",
            config.ndcg_k,
            format_ndcg(train_ndcg),
            format_ndcg(validation_ndcg),
        );

        on_epoch(&record);
        history.push(record);

        if config.checkpoint_interval > 0
            && epoch % config.checkpoint_interval == 0
            && epoch < config.n_epoch
        {
            let dir = checkpoint_dir.join(format!("epoch_{epoch}"));
            save_checkpoint(&dir, &model, &optimizer, epoch, &history)?;
            tracing::info!(epoch, dir = %dir.display(), "Checkpoint saved (model + optimizer + meta)");
        }
    }

    tracing::info!(
        epochs = history.len(),
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    let final_dir = checkpoint_dir.join("final");
    let last_epoch = history.last().map(|r| r.epoch).unwrap_or(completed_epochs);
    save_checkpoint(&final_dir, &model, &optimizer, last_epoch, &history)?;
    tracing::info!(dir = %final_dir.display(), "Training complete. Final checkpoint saved.");

    Ok(TrainingOutcome { model, history })
}

fn format_ndcg(ndcg: Option<f64>) -> String {
    ndcg.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string())
}

/// Write model weights, optimizer state, model config and metadata to `dir`.
fn save_checkpoint<B, O>(
    dir: &Path,
    model: &Ranker<B>,
    optimizer: &O,
    epoch: usize,
    history: &MetricsHistory,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Ranker<B>, B>,
{
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    model
        .clone()
        .save_file(dir.join("model"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model at epoch {epoch}: {e}"))?;

    Recorder::<B>::record(&recorder, optimizer.to_record(), dir.join("optimizer"))
        .map_err(|e| anyhow::anyhow!("Failed to save optimizer at epoch {epoch}: {e}"))?;

    model
        .config()
        .save(dir.join(RANKER_CONFIG_FILE))
        .map_err(|e| anyhow::anyhow!("Failed to save model config at epoch {epoch}: {e}"))?;

    serde_json::to_writer_pretty(
        std::fs::File::create(dir.join(META_FILE))?,
        &CheckpointMeta {
            epoch,
            history: history.clone(),
        },
    )?;
    Ok(())
}

/// Read the metadata of a checkpoint directory.
pub fn read_checkpoint_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join(META_FILE);
    let meta = serde_json::from_reader(
        std::fs::File::open(&meta_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?,
    )
    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))?;
    Ok(meta)
}

/// Load a Ranker from a checkpoint directory.
///
/// Rebuilds the network from the saved `ranker.json`, then loads the saved
/// weights on top.
pub fn load_ranker<B: Backend>(dir: &Path, device: &B::Device) -> anyhow::Result<Ranker<B>> {
    let config_path = dir.join(RANKER_CONFIG_FILE);
    let config = RankerConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", config_path.display()))?;
    let model = config
        .init::<B>(device)
        .load_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::loss::jensen_shannon_loss;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_dataset(n: usize, width: usize) -> RankingDataset {
        let features = (0..n)
            .map(|i| (0..width).map(|j| ((i + j) % 5) as f32 * 0.25).collect())
            .collect();
        let relevance = (0..n).map(|i| (i % 3) as f32).collect();
        RankingDataset::new(features, relevance).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ListNetTrainingConfig::new();
        assert_eq!(config.n_epoch, 20);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.ndcg_k, 20);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.loss, LossStrategy::JensenShannon);
        assert!(config.max_grad_norm.is_none());
        assert!(config.seed.is_none());
        assert!((config.tv_ratio - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_optimizer_kind_parse() {
        assert_eq!("AdamW".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdamW);
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
        assert_eq!(OptimizerKind::AdamW.to_string(), "adamw");
    }

    #[test]
    fn test_validate_rejects_small_split() {
        let device = Default::default();
        let model = RankerConfig::new(3).init::<TestBackend>(&device);
        let config = ListNetTrainingConfig::new();

        let err = validate_inputs(&config, &model, &tiny_dataset(30, 3), &tiny_dataset(5, 3))
            .unwrap_err();
        let bounds = err.downcast_ref::<RankingError>();
        assert_eq!(bounds, Some(&RankingError::Bounds { len: 5, k: 20 }));
    }

    #[test]
    fn test_validate_rejects_width_mismatch() {
        let device = Default::default();
        let model = RankerConfig::new(4).init::<TestBackend>(&device);
        let config = ListNetTrainingConfig::new().with_ndcg_k(2);

        let err = validate_inputs(&config, &model, &tiny_dataset(10, 3), &tiny_dataset(10, 3))
            .unwrap_err();
        assert!(err.to_string().contains("width 3"), "got {err}");
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let device = Default::default();
        let model = RankerConfig::new(3).init::<TestBackend>(&device);
        let config = ListNetTrainingConfig::new().with_ndcg_k(2).with_batch_size(0);
        let err = validate_inputs(&config, &model, &tiny_dataset(10, 3), &tiny_dataset(10, 3))
            .unwrap_err();
        assert_eq!(err.downcast_ref::<RankingError>(), Some(&RankingError::ZeroBatchSize));
    }

    #[test]
    fn test_evaluate_loss_weighted_mean() {
        let device = Default::default();
        let model = RankerConfig::new(3)
            .with_d_hidden1(8)
            .with_d_hidden2(4)
            .init::<TestBackend>(&device);
        let dataset = tiny_dataset(10, 3);
        let order: Vec<usize> = (0..10).collect();

        // Loss of the rows in `range`, scored as a single list
        let list_loss = |range: std::ops::Range<usize>| -> f64 {
            let rows = &order[range];
            let input = select_rows_to_tensor::<TestBackend>(dataset.features(), rows, &device);
            let target = values_to_tensor::<TestBackend>(&dataset.relevance_at(rows), &device);
            tensor_to_f64(jensen_shannon_loss(target, model.forward_scores(input)).unwrap())
        };

        // One batch covering everything equals the single-list loss
        let whole = evaluate_loss(&model, &dataset, &order, 10, LossStrategy::JensenShannon, 5, &device)
            .unwrap();
        let single = list_loss(0..10);
        assert!((whole - single).abs() < 1e-9, "whole={whole} single={single}");

        // Batches of 4, 4, 2 are weighted by their length
        let batched = evaluate_loss(&model, &dataset, &order, 4, LossStrategy::JensenShannon, 5, &device)
            .unwrap();
        let expected = (4.0 * list_loss(0..4) + 4.0 * list_loss(4..8) + 2.0 * list_loss(8..10)) / 10.0;
        assert!((batched - expected).abs() < 1e-9, "batched={batched} expected={expected}");

        assert!(matches!(
            evaluate_loss(&model, &dataset, &[], 4, LossStrategy::JensenShannon, 5, &device),
            Err(RankingError::Empty(_))
        ));
        assert_eq!(
            evaluate_loss(&model, &dataset, &order, 0, LossStrategy::JensenShannon, 5, &device),
            Err(RankingError::ZeroBatchSize)
        );
    }

    #[test]
    fn test_dataset_ndcg_degenerate_is_none() {
        let device = Default::default();
        let model = RankerConfig::new(2)
            .with_d_hidden1(4)
            .with_d_hidden2(2)
            .init::<TestBackend>(&device);
        let zeros = RankingDataset::new(vec![vec![1.0, 0.0]; 4], vec![0.0; 4]).unwrap();

        assert_eq!(dataset_ndcg(&model, &zeros, 2, &device).unwrap(), None);
        assert!(matches!(
            dataset_ndcg(&model, &zeros, 10, &device),
            Err(RankingError::Bounds { len: 4, k: 10 })
        ));
    }
}
