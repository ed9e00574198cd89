//! Result types written by the `train` and `evaluate` subcommands.

use std::path::Path;

use listnet::model::ranker::RankerConfig;
use listnet::training::metrics::{EpochRecord, MetricsHistory};
use listnet::training::trainer::ListNetTrainingConfig;
use serde::{Deserialize, Serialize};

/// Outcome of a training run, written as JSON by `train --report`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Training data file.
    pub data: String,
    /// Separate validation file, if one was given instead of a split.
    pub validation_data: Option<String>,
    /// Items in the training split.
    pub train_items: usize,
    /// Items in the validation split.
    pub validation_items: usize,
    /// Network shape.
    pub model: RankerConfig,
    /// Effective training config after TOML and CLI overrides.
    pub training: ListNetTrainingConfig,
    /// Directory holding the final checkpoint.
    pub final_checkpoint: String,
    /// Last epoch of the run.
    pub final_epoch: Option<EpochRecord>,
    /// Epoch with the highest validation NDCG.
    pub best_validation_epoch: Option<EpochRecord>,
    /// Per-epoch losses and NDCG.
    pub history: MetricsHistory,
    /// Wall-clock training time in seconds.
    pub elapsed_secs: f64,
}

impl TrainingReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Wrote training report");
        Ok(())
    }
}

/// Relative change from the first to the last value of `series`.
///
/// Returns `None` for fewer than two values or a zero first value.
pub fn relative_change(series: &[f64]) -> Option<f64> {
    match (series.first(), series.last()) {
        (Some(&first), Some(&last)) if series.len() > 1 && first != 0.0 => {
            Some((last - first) / first.abs())
        }
        _ => None,
    }
}
