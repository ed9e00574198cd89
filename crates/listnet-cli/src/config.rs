//! TOML config loading for the listnet CLI.
//!
//! Deserializes `configs/listnet.toml` which has `[model]` and `[training]`
//! sections, then merges with CLI overrides.

use std::path::Path;

use listnet::model::ranker::RankerConfig;
use listnet::training::loss::LossStrategy;
use listnet::training::trainer::{ListNetTrainingConfig, OptimizerKind};
use serde::Deserialize;

/// Top-level structure matching `configs/listnet.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ListNetToml {
    /// Network shape overrides. The input width always comes from the data.
    #[serde(default)]
    pub model: ModelOverrides,
    /// Training hyperparameter overrides.
    #[serde(default)]
    pub training: TrainingOverrides,
}

/// Optional overrides for `RankerConfig` fields.
#[derive(Debug, Default, Deserialize)]
pub struct ModelOverrides {
    pub d_hidden1: Option<usize>,
    pub d_hidden2: Option<usize>,
}

/// Optional overrides for `ListNetTrainingConfig` fields.
///
/// All fields are `Option` so a TOML file only needs to name the values it
/// changes; everything else keeps the library default.
#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub n_epoch: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub optimizer: Option<OptimizerKind>,
    pub weight_decay: Option<f64>,
    pub max_grad_norm: Option<f64>,
    pub loss: Option<LossStrategy>,
    pub listwise_top_k: Option<usize>,
    pub ndcg_k: Option<usize>,
    pub tv_ratio: Option<f64>,
    pub seed: Option<u64>,
    pub checkpoint_interval: Option<usize>,
    pub checkpoint_dir: Option<String>,
}

/// Training values given on the command line. These win over the TOML file.
#[derive(Debug, Default, Clone)]
pub struct TrainCliOverrides {
    pub n_epoch: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub optimizer: Option<OptimizerKind>,
    pub loss: Option<LossStrategy>,
    pub listwise_top_k: Option<usize>,
    pub ndcg_k: Option<usize>,
    pub seed: Option<u64>,
    pub checkpoint_dir: Option<String>,
}

/// Load and deserialize a `ListNetToml` from a TOML file.
pub fn load_config_toml(path: &Path) -> anyhow::Result<ListNetToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: ListNetToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded listnet config");
    Ok(config)
}

/// Build a `RankerConfig` for features of width `d_input`.
pub fn build_ranker_config(d_input: usize, overrides: &ModelOverrides) -> RankerConfig {
    let mut config = RankerConfig::new(d_input);
    if let Some(d) = overrides.d_hidden1 {
        config.d_hidden1 = d;
    }
    if let Some(d) = overrides.d_hidden2 {
        config.d_hidden2 = d;
    }
    config
}

/// Build a `ListNetTrainingConfig` from defaults, TOML overrides, and CLI flags.
///
/// Priority chain: `ListNetTrainingConfig::new()` defaults < TOML values < CLI flags.
pub fn build_training_config(
    overrides: &TrainingOverrides,
    cli: &TrainCliOverrides,
) -> ListNetTrainingConfig {
    let mut config = ListNetTrainingConfig::new();

    // Apply TOML overrides
    if let Some(n) = overrides.n_epoch {
        config.n_epoch = n;
    }
    if let Some(n) = overrides.batch_size {
        config.batch_size = n;
    }
    if let Some(lr) = overrides.lr {
        config.lr = lr;
    }
    if let Some(kind) = overrides.optimizer {
        config.optimizer = kind;
    }
    if let Some(wd) = overrides.weight_decay {
        config.weight_decay = wd;
    }
    if overrides.max_grad_norm.is_some() {
        config.max_grad_norm = overrides.max_grad_norm;
    }
    if let Some(loss) = overrides.loss {
        config.loss = loss;
    }
    if let Some(k) = overrides.listwise_top_k {
        config.listwise_top_k = k;
    }
    if let Some(k) = overrides.ndcg_k {
        config.ndcg_k = k;
    }
    if let Some(ratio) = overrides.tv_ratio {
        config.tv_ratio = ratio;
    }
    if overrides.seed.is_some() {
        config.seed = overrides.seed;
    }
    if let Some(n) = overrides.checkpoint_interval {
        config.checkpoint_interval = n;
    }
    if let Some(dir) = &overrides.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }

    // CLI overrides take highest priority
    if let Some(n) = cli.n_epoch {
        config.n_epoch = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(lr) = cli.lr {
        config.lr = lr;
    }
    if let Some(kind) = cli.optimizer {
        config.optimizer = kind;
    }
    if let Some(loss) = cli.loss {
        config.loss = loss;
    }
    if let Some(k) = cli.listwise_top_k {
        config.listwise_top_k = k;
    }
    if let Some(k) = cli.ndcg_k {
        config.ndcg_k = k;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(dir) = &cli.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }

    config
}
