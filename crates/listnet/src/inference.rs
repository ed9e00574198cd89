//! Scoring and evaluation with a trained ranker.
//!
//! `ListNetScorer<B>` wraps a loaded `Ranker` and exposes the prediction
//! side: raw scores, a ranking of items, and dataset-level loss/NDCG.

use std::path::Path;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::ranker::Ranker;
use crate::training::data::RankingDataset;
use crate::training::loss::LossStrategy;
use crate::training::metrics::descending_order;
use crate::training::trainer::{dataset_ndcg, evaluate_loss, load_ranker};
use crate::types::RankingError;

/// Loss and NDCG of a model over a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Number of items evaluated.
    pub items: usize,
    /// NDCG cutoff.
    pub k: usize,
    /// Loss strategy the loss was computed with.
    pub loss_strategy: LossStrategy,
    /// Mean minibatch loss, items in file order.
    pub loss: f64,
    /// NDCG@k over the whole dataset. `None` when no item is relevant.
    pub ndcg: Option<f64>,
}

/// Scorer parameterized by burn backend.
pub struct ListNetScorer<B: Backend> {
    model: Ranker<B>,
    device: B::Device,
}

impl<B: Backend> ListNetScorer<B> {
    pub fn new(model: Ranker<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Load a scorer from a checkpoint directory.
    pub fn load(dir: &Path, device: B::Device) -> anyhow::Result<Self> {
        let model = load_ranker::<B>(dir, &device)?;
        tracing::info!(checkpoint = %dir.display(), d_input = model.d_input(), "Loaded ranker");
        Ok(Self { model, device })
    }

    pub fn model(&self) -> &Ranker<B> {
        &self.model
    }

    /// Feature width the model expects.
    pub fn d_input(&self) -> usize {
        self.model.d_input()
    }

    /// Raw score per row. Higher = more relevant.
    pub fn score(&self, rows: &[Vec<f32>]) -> Result<Vec<f64>, RankingError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        self.check_width(rows)?;
        Ok(self.model.predict(rows, &self.device))
    }

    /// Row indices ordered from highest to lowest score.
    pub fn rank(&self, rows: &[Vec<f32>]) -> Result<Vec<usize>, RankingError> {
        Ok(descending_order(&self.score(rows)?))
    }

    /// Loss and NDCG@k over `dataset`, scored in minibatches of `batch_size`.
    ///
    /// A `batch_size` of 0 is rejected with `ZeroBatchSize`.
    pub fn evaluate(
        &self,
        dataset: &RankingDataset,
        k: usize,
        batch_size: usize,
        strategy: LossStrategy,
        top_k: usize,
    ) -> Result<EvaluationReport, RankingError> {
        self.check_width(dataset.features())?;
        let order: Vec<usize> = (0..dataset.len()).collect();
        let loss = evaluate_loss(
            &self.model,
            dataset,
            &order,
            batch_size,
            strategy,
            top_k,
            &self.device,
        )?;
        let ndcg = dataset_ndcg(&self.model, dataset, k, &self.device)?;
        Ok(EvaluationReport {
            items: dataset.len(),
            k,
            loss_strategy: strategy,
            loss,
            ndcg,
        })
    }

    fn check_width(&self, rows: &[Vec<f32>]) -> Result<(), RankingError> {
        let expected = self.model.d_input();
        match rows.iter().position(|r| r.len() != expected) {
            Some(row) => Err(RankingError::RaggedFeatures {
                row,
                expected,
                actual: rows[row].len(),
            }),
            None => Ok(()),
        }
    }
}
