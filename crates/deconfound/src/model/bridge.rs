//! Tensor bridge: host-side sample rows ↔ burn tensors.
//!
//! Samples live on the host as `Vec<f32>` rows (see `cohort::Sample`); the
//! model needs `Tensor<B, 2>` batches, and the diagnostics need the encoded
//! features back as an `ndarray::Array2<f64>`.

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::Array2;

/// Stack equally sized rows into a `(rows, dim)` tensor.
///
/// # Panics
/// Panics if `rows` is empty or rows have inconsistent lengths.
pub fn rows_to_tensor<B: Backend>(rows: &[&[f32]], device: &B::Device) -> Tensor<B, 2> {
    assert!(!rows.is_empty(), "rows must not be empty");
    let dim = rows[0].len();
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), dim, "row {i} has length {}, expected {dim}", row.len());
    }

    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [rows.len(), dim]), device)
}

/// Wrap a slice of values as a 1D tensor.
pub fn values_to_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device)
}

/// Extract f64 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .map(f64::from)
        .collect()
}

/// Extract a single f64 scalar from a tensor with one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}

/// Copy a `(rows, cols)` tensor into an `ndarray` matrix.
pub fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Array2<f64> {
    let [rows, cols] = tensor.dims();
    let flat: Vec<f64> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .map(f64::from)
        .collect();
    Array2::from_shape_vec((rows, cols), flat).unwrap_or_else(|_| Array2::zeros((rows, cols)))
}
