//! Ranking network components: the ListNet feed-forward scorer and the
//! tensor bridge between plain `Vec` data and burn tensors.

pub mod bridge;
pub mod ranker;
