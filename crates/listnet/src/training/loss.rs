//! Listwise ranking losses for ListNet training.
//!
//! All loss functions are generic over `B: Backend`, take the whole list as a
//! 1D tensor, and return a scalar tensor of shape `(1,)` that can be
//! backpropagated through `predicted`.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use crate::model::bridge::tensor_to_vec;
use crate::training::metrics::descending_order;
use crate::types::{ensure_same_len, RankingError};

/// Default list prefix length for the top-k listwise loss.
pub const DEFAULT_LISTWISE_TOP_K: usize = 5;

/// Which listwise objective drives training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossStrategy {
    /// Jensen–Shannon divergence between target and predicted relevance.
    #[default]
    #[serde(rename = "jsd")]
    JensenShannon,
    /// Cross-entropy of Plackett–Luce top-k permutation probabilities.
    #[serde(rename = "topk")]
    TopKListwise,
}

impl fmt::Display for LossStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossStrategy::JensenShannon => write!(f, "jsd"),
            LossStrategy::TopKListwise => write!(f, "topk"),
        }
    }
}

impl FromStr for LossStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsd" | "jensen-shannon" => Ok(LossStrategy::JensenShannon),
            "topk" | "top-k" | "listwise" => Ok(LossStrategy::TopKListwise),
            other => Err(format!("unknown loss strategy '{other}' (expected 'jsd' or 'topk')")),
        }
    }
}

/// Compute the configured listwise loss between `target` and `predicted`.
///
/// `top_k` is only read by [`LossStrategy::TopKListwise`].
pub fn ranking_loss<B: Backend>(
    strategy: LossStrategy,
    target: Tensor<B, 1>,
    predicted: Tensor<B, 1>,
    top_k: usize,
) -> Result<Tensor<B, 1>, RankingError> {
    match strategy {
        LossStrategy::JensenShannon => jensen_shannon_loss(target, predicted),
        LossStrategy::TopKListwise => {
            // The loss is only defined on the first min(k, len) positions of
            // a short final minibatch.
            let [n] = predicted.dims();
            listwise_top_k_loss(target, predicted, top_k.min(n))
        }
    }
}

/// Guarded KL divergence: `Σ a_i · ln(a_i / b_i)` over positions with `a_i · b_i > 0`.
///
/// Every other position contributes exactly 0 and receives no gradient.
///
/// # Errors
/// `ShapeMismatch` if the lengths differ, `Empty` for zero-length input.
pub fn kl_divergence_sum<B: Backend>(
    a: Tensor<B, 1>,
    b: Tensor<B, 1>,
) -> Result<Tensor<B, 1>, RankingError> {
    let [n] = a.dims();
    let [m] = b.dims();
    ensure_same_len(n, m)?;
    if n == 0 {
        return Err(RankingError::Empty("divergence needs at least one item"));
    }

    // Substitute 1/1 outside the guard so log and division stay finite there
    let excluded = a.clone().mul(b.clone()).lower_equal_elem(0.0);
    let a_safe = a.mask_fill(excluded.clone(), 1.0);
    let b_safe = b.mask_fill(excluded, 1.0);

    Ok((a_safe.clone() * (a_safe / b_safe).log()).sum())
}

/// Jensen–Shannon divergence between two relevance vectors.
///
/// `jsd(t, p) = ½·KL(t ‖ m) + ½·KL(p ‖ m)` with `m = ½(t + p)`.
/// Symmetric, non-negative, and zero when both vectors agree on their
/// positive entries.
///
/// # Arguments
/// - `target`: shape `(n,)`, ground-truth relevance
/// - `predicted`: shape `(n,)`, model scores
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn jensen_shannon_loss<B: Backend>(
    target: Tensor<B, 1>,
    predicted: Tensor<B, 1>,
) -> Result<Tensor<B, 1>, RankingError> {
    let [n] = target.dims();
    let [m] = predicted.dims();
    ensure_same_len(n, m)?;

    let mean = (target.clone() + predicted.clone()) * 0.5;
    let left = kl_divergence_sum(target, mean.clone())?;
    let right = kl_divergence_sum(predicted, mean)?;
    Ok((left + right) * 0.5)
}

/// Log of the Plackett–Luce probability of the top-k prefix of `scores`
/// sorted in descending order:
///
/// `Σ_{i<k} [ s_i − ln Σ_{j≥i} exp(s_j) ]`
///
/// # Errors
/// `Bounds` if `k == 0` or `k > len`.
pub fn top_k_log_probability<B: Backend>(
    scores: Tensor<B, 1>,
    k: usize,
) -> Result<Tensor<B, 1>, RankingError> {
    let [n] = scores.dims();
    if k == 0 || k > n {
        return Err(RankingError::Bounds { len: n, k });
    }
    let device = scores.device();

    let order: Vec<i64> = descending_order(&tensor_to_vec(scores.clone().detach()))
        .into_iter()
        .map(|i| i as i64)
        .collect();
    let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(order, [n]), &device);
    let sorted = scores.select(0, indices);

    let mut log_prob = Tensor::<B, 1>::zeros([1], &device);
    for i in 0..k {
        let head = sorted.clone().slice([i..i + 1]);
        let tail = sorted.clone().slice([i..n]);
        log_prob = log_prob + head - log_sum_exp(tail);
    }
    Ok(log_prob)
}

/// Plackett–Luce top-k probability, `exp` of [`top_k_log_probability`].
pub fn top_k_probability<B: Backend>(
    scores: Tensor<B, 1>,
    k: usize,
) -> Result<Tensor<B, 1>, RankingError> {
    Ok(top_k_log_probability(scores, k)?.exp())
}

/// Top-k listwise cross-entropy: `−P_k(target) · ln P_k(predicted)`.
pub fn listwise_top_k_loss<B: Backend>(
    target: Tensor<B, 1>,
    predicted: Tensor<B, 1>,
    k: usize,
) -> Result<Tensor<B, 1>, RankingError> {
    let [n] = target.dims();
    let [m] = predicted.dims();
    ensure_same_len(n, m)?;

    let target_prob = top_k_probability(target, k)?;
    let predicted_log_prob = top_k_log_probability(predicted, k)?;
    Ok((target_prob * predicted_log_prob).neg())
}

/// Numerically stable `ln Σ exp(x)`, shape `(1,)`.
fn log_sum_exp<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let max = x.clone().max().detach();
    (x - max.clone()).exp().sum().log() + max
}
