//! Regression, classification and correlation losses.
//!
//! All functions are generic over `B: Backend`, operate on burn tensors, and
//! return a scalar tensor of shape `(1,)`.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;

/// Stability floor added to correlation denominators.
pub const CORRELATION_EPS: f64 = 1e-5;

/// Mean squared error between confounder predictions and stacked targets.
///
/// Both tensors have shape `(batch, n_confounders)`. Used unchanged by the
/// regressor phase and the (gradient-reversed) distiller phase.
pub fn confounder_mse_loss<B: Backend>(
    predictions: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(predictions, targets, Reduction::Mean)
}

/// Binary cross-entropy on raw logits, averaged over the batch.
///
/// Uses the stable form `max(x, 0) - x*y + ln(1 + exp(-|x|))`.
pub fn bce_with_logits_loss<B: Backend>(logits: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let positive_part = logits.clone().clamp_min(0.0);
    let log_term = logits.clone().abs().neg().exp().log1p();
    (positive_part - logits * targets + log_term).mean()
}

/// Pearson correlation with a sample-std denominator.
///
/// `cov = mean((x - x̄)(y - ȳ))`, `corr = cov / (std(x)·std(y) + eps)` with
/// unbiased standard deviations.
fn correlation<B: Backend>(x: Tensor<B, 1>, y: Tensor<B, 1>) -> Tensor<B, 1> {
    let xc = x.clone() - x.clone().mean();
    let yc = y.clone() - y.clone().mean();
    let covariance = (xc * yc).mean();
    let std_x = x.var(0).sqrt();
    let std_y = y.var(0).sqrt();
    covariance / (std_x * std_y + CORRELATION_EPS)
}

/// Squared correlation coefficient between `y_true` and `y_pred`, in `[0, 1]`.
pub fn correlation_coefficient_loss<B: Backend>(
    y_true: Tensor<B, 1>,
    y_pred: Tensor<B, 1>,
) -> Tensor<B, 1> {
    correlation(y_true, y_pred).powf_scalar(2.0)
}

/// `1 - corr²`: minimized when the inputs are perfectly (anti-)correlated.
pub fn inv_correlation_coefficient_loss<B: Backend>(
    y_true: Tensor<B, 1>,
    y_pred: Tensor<B, 1>,
) -> Tensor<B, 1> {
    correlation_coefficient_loss(y_true, y_pred).neg().add_scalar(1.0)
}

/// Squared Pearson correlation computed from centred sums.
///
/// Inputs of any shape are flattened first.
pub fn pearson_correlation_loss<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    y: Tensor<B, D>,
) -> Tensor<B, 1> {
    let x: Tensor<B, 1> = x.flatten(0, D - 1);
    let y: Tensor<B, 1> = y.flatten(0, D - 1);
    let xm = x.clone() - x.mean();
    let ym = y.clone() - y.mean();
    let cov = (xm.clone() * ym.clone()).sum();
    let x_norm = xm.powf_scalar(2.0).sum().sqrt();
    let y_norm = ym.powf_scalar(2.0).sum().sqrt();
    (cov / (x_norm * y_norm + CORRELATION_EPS)).powf_scalar(2.0)
}
