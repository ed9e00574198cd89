use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::model::bridge::{rows_to_tensor, tensor_to_vec};

/// Rows scored per forward pass in [`Ranker::predict`].
pub const PREDICT_CHUNK: usize = 1024;

/// Configuration for the ListNet scoring network.
///
/// ```text
/// (batch, d_input)
///   → Linear(d_input→d_hidden1) → ReLU
///   → Linear(d_hidden1→d_hidden2) → ReLU
///   → Linear(d_hidden2→1)
///   → score: (batch, 1)
/// ```
#[derive(Config, Debug)]
pub struct RankerConfig {
    /// Feature width of each item.
    pub d_input: usize,
    /// First hidden layer dimension.
    #[config(default = 512)]
    pub d_hidden1: usize,
    /// Second hidden layer dimension.
    #[config(default = 128)]
    pub d_hidden2: usize,
}

/// Three-layer feed-forward network producing one relevance score per item.
///
/// The output layer is linear: scores are not rectified, on either the
/// training or the prediction path.
#[derive(Module, Debug)]
pub struct Ranker<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
    linear3: Linear<B>,
}

impl RankerConfig {
    /// Initialize a Ranker with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Ranker<B> {
        Ranker {
            linear1: LinearConfig::new(self.d_input, self.d_hidden1).init(device),
            linear2: LinearConfig::new(self.d_hidden1, self.d_hidden2).init(device),
            linear3: LinearConfig::new(self.d_hidden2, 1).init(device),
        }
    }
}

impl<B: Backend> Ranker<B> {
    /// Forward pass: maps item features to raw scores.
    ///
    /// Input shape: `(batch, d_input)`
    /// Output shape: `(batch, 1)`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = burn::tensor::activation::relu(self.linear1.forward(x));
        let x = burn::tensor::activation::relu(self.linear2.forward(x));
        self.linear3.forward(x)
    }

    /// Forward pass flattened to one score per item: `(batch,)`.
    pub fn forward_scores(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        self.forward(x).squeeze::<1>(1)
    }

    /// Feature width expected by the first layer.
    pub fn d_input(&self) -> usize {
        self.linear1.weight.dims()[0]
    }

    /// Reconstruct the configuration from the layer shapes.
    pub fn config(&self) -> RankerConfig {
        let [d_input, d_hidden1] = self.linear1.weight.dims();
        let [_, d_hidden2] = self.linear2.weight.dims();
        RankerConfig::new(d_input)
            .with_d_hidden1(d_hidden1)
            .with_d_hidden2(d_hidden2)
    }

    /// Score every row, in chunks of [`PREDICT_CHUNK`].
    ///
    /// Call this on an inference-mode module (`model.valid()`) when the
    /// backend is an autodiff backend; otherwise the graph is recorded.
    pub fn predict(&self, rows: &[Vec<f32>], device: &B::Device) -> Vec<f64> {
        let mut scores = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(PREDICT_CHUNK) {
            let input = rows_to_tensor::<B>(chunk, device);
            scores.extend(tensor_to_vec::<B>(self.forward_scores(input)));
        }
        scores
    }
}
