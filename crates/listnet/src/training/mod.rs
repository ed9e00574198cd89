//! ListNet training pipeline: ranking dataset and minibatching, listwise
//! losses, the NDCG metric with per-epoch history, and the epoch loop.

pub mod data;
pub mod loss;
pub mod metrics;
pub mod trainer;
