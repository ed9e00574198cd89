//! ListNet: listwise learning-to-rank.
//!
//! A three-layer feed-forward ranker scores every item of a list. Training
//! compares the predicted and true relevance distributions with a
//! Jensen–Shannon divergence (or a Plackett–Luce top-k cross-entropy);
//! ranking quality is reported as NDCG@k.

pub mod inference;
pub mod model;
pub mod training;
pub mod types;

pub use types::RankingError;
