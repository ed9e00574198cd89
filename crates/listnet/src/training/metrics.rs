//! NDCG ranking metric and per-epoch training records.

use serde::{Deserialize, Serialize};

use crate::types::{ensure_same_len, RankingError};

/// Default NDCG cutoff used for reporting.
pub const DEFAULT_NDCG_K: usize = 20;

/// Indices of `values` ordered by descending value.
///
/// The sort is stable, so equal values keep their input order, and uses
/// `f64::total_cmp` so the order is total even with NaNs present.
pub fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}

/// Gain of a relevance grade: `2^rel − 1`.
fn gain(relevance: f64) -> f64 {
    relevance.exp2() - 1.0
}

/// Positional discount: `1 / log2(position + 2)` for 0-indexed positions.
fn discount(position: usize) -> f64 {
    1.0 / ((position + 2) as f64).log2()
}

/// DCG of the first `k` relevance grades, taken in the given order.
fn dcg(ordered_relevance: impl Iterator<Item = f64>, k: usize) -> f64 {
    ordered_relevance
        .take(k)
        .enumerate()
        .map(|(i, rel)| gain(rel) * discount(i))
        .sum()
}

/// Normalized discounted cumulative gain at cutoff `k`.
///
/// Ideal DCG uses the ground-truth grades sorted descending; actual DCG takes
/// grades in the order implied by `y_score` (highest score first).
///
/// # Errors
/// - `ShapeMismatch` if the vectors differ in length.
/// - `Bounds` if the list has fewer than `k` items.
/// - `DegenerateInput` if the ideal DCG is zero (all top-k grades are 0, or `k == 0`).
pub fn ndcg_at_k(y_true: &[f64], y_score: &[f64], k: usize) -> Result<f64, RankingError> {
    ensure_same_len(y_true.len(), y_score.len())?;
    if y_true.len() < k {
        return Err(RankingError::Bounds { len: y_true.len(), k });
    }

    let ideal = dcg(descending_order(y_true).into_iter().map(|i| y_true[i]), k);
    if ideal == 0.0 {
        return Err(RankingError::DegenerateInput { k });
    }

    let actual = dcg(descending_order(y_score).into_iter().map(|i| y_true[i]), k);
    Ok(actual / ideal)
}

/// Metrics for one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean training loss, weighted by minibatch size.
    pub train_loss: f64,
    /// Mean validation loss, weighted by minibatch size.
    pub validation_loss: f64,
    /// NDCG@k over the training split. `None` when the split has no relevant items.
    pub train_ndcg: Option<f64>,
    /// NDCG@k over the validation split. `None` when the split has no relevant items.
    pub validation_ndcg: Option<f64>,
}

impl EpochRecord {
    /// Return warnings for suspicious values in this record.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.train_loss.is_finite() {
            warnings.push(format!("train loss is not finite ({})", self.train_loss));
        }
        if !self.validation_loss.is_finite() {
            warnings.push(format!("validation loss is not finite ({})", self.validation_loss));
        }
        // The divergence is only bounded below for non-negative scores; a
        // negative mean loss means predictions went below zero.
        if self.train_loss < 0.0 {
            warnings.push(format!(
                "train loss {:.4} is negative, predicted scores are outside the non-negative domain",
                self.train_loss
            ));
        }
        if self.validation_loss < 0.0 {
            warnings.push(format!(
                "validation loss {:.4} is negative, predicted scores are outside the non-negative domain",
                self.validation_loss
            ));
        }
        if self.train_ndcg.is_none() {
            warnings.push("train NDCG undefined (no relevant items)".to_string());
        }
        if self.validation_ndcg.is_none() {
            warnings.push("validation NDCG undefined (no relevant items)".to_string());
        }
        if self.train_loss.is_finite()
            && self.validation_loss.is_finite()
            && self.train_loss > 0.0
            && self.validation_loss > 3.0 * self.train_loss
        {
            warnings.push(format!(
                "validation loss {:.4} is over 3x train loss {:.4}, possible overfitting",
                self.validation_loss, self.train_loss
            ));
        }
        warnings
    }
}

/// Per-epoch history: train/validation loss and NDCG series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub epochs: Vec<EpochRecord>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn train_loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.train_loss).collect()
    }

    pub fn validation_loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.validation_loss).collect()
    }

    pub fn train_ndcg(&self) -> Vec<Option<f64>> {
        self.epochs.iter().map(|r| r.train_ndcg).collect()
    }

    pub fn validation_ndcg(&self) -> Vec<Option<f64>> {
        self.epochs.iter().map(|r| r.validation_ndcg).collect()
    }

    /// Epoch with the highest validation NDCG, if any epoch has one.
    pub fn best_validation_epoch(&self) -> Option<&EpochRecord> {
        self.epochs
            .iter()
            .filter(|r| r.validation_ndcg.is_some())
            .max_by(|a, b| {
                let a = a.validation_ndcg.unwrap_or(f64::NEG_INFINITY);
                let b = b.validation_ndcg.unwrap_or(f64::NEG_INFINITY);
                a.total_cmp(&b)
            })
    }
}
