//! Tensor bridge: utilities to convert between plain `Vec` data (feature
//! rows, relevance grades, predicted scores) and burn tensors.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert a batch of feature rows to a burn 2D tensor of shape `(batch, width)`.
///
/// # Panics
/// Panics if `rows` is empty or if rows have inconsistent widths. Datasets
/// validate both at construction, so this only fires on programmer error.
pub fn rows_to_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    assert!(!rows.is_empty(), "rows must not be empty");
    let width = rows[0].len();
    assert!(width > 0, "feature width must be > 0");
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(
            row.len(),
            width,
            "row {i} has width {}, expected {width}",
            row.len()
        );
    }

    let batch = rows.len();
    let flat: Vec<f32> = rows.iter().flat_map(|v| v.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [batch, width]), device)
}

/// Gather the rows at `indices` into a `(indices.len(), width)` tensor.
pub fn select_rows_to_tensor<B: Backend>(
    rows: &[Vec<f32>],
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 2> {
    let selected: Vec<Vec<f32>> = indices.iter().map(|&i| rows[i].clone()).collect();
    rows_to_tensor::<B>(&selected, device)
}

/// Convert a slice of values to a burn 1D tensor.
pub fn values_to_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device)
}

/// Extract f64 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor
        .into_data()
        .iter::<f32>()
        .map(|v| v as f64)
        .collect()
}

/// Extract a single f64 scalar from a burn 1D tensor.
///
/// # Panics
/// Panics if the tensor does not contain exactly one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_rows_shape_and_values() {
        let device = Default::default();
        let rows = vec![vec![1.0_f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]];

        let tensor = rows_to_tensor::<TestBackend>(&rows, &device);
        assert_eq!(tensor.dims(), [2, 3]);

        let row1: Vec<f32> = tensor
            .slice([1..2, 0..3])
            .reshape([3])
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(row1, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "row 1 has width 2")]
    fn test_rows_ragged_panics() {
        let device = Default::default();
        let rows = vec![vec![1.0_f32, 2.0, 3.0], vec![4.0, 5.0]];
        let _ = rows_to_tensor::<TestBackend>(&rows, &device);
    }

    #[test]
    fn test_select_rows() {
        let device = Default::default();
        let rows: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32; 2]).collect();

        let tensor = select_rows_to_tensor::<TestBackend>(&rows, &[3, 0], &device);
        assert_eq!(tensor.dims(), [2, 2]);
        let flat: Vec<f32> = tensor.reshape([4]).into_data().to_vec().unwrap();
        assert_eq!(flat, vec![3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_values_and_extraction() {
        let device = Default::default();
        let tensor = values_to_tensor::<TestBackend>(&[1.0, 2.5, -3.0], &device);

        let values = tensor_to_vec::<TestBackend>(tensor);
        assert_eq!(values.len(), 3);
        assert!((values[1] - 2.5).abs() < 1e-6);
        assert!((values[2] + 3.0).abs() < 1e-6);

        let scalar = tensor_to_f64::<TestBackend>(values_to_tensor::<TestBackend>(&[42.0], &device));
        assert!((scalar - 42.0).abs() < 1e-6);
    }
}
