//! Held-out evaluation of the encoder + classifier path.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::bridge::{tensor_to_f64, tensor_to_vec};
use crate::model::network::ConfounderFreeModel;
use crate::training::data::LabeledBatch;
use crate::training::loss::bce_with_logits_loss;
use crate::training::metrics::ClassificationMetrics;

/// Metrics for one evaluation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub balanced_accuracy: f64,
    pub loss: f64,
    pub auc: Option<f64>,
    pub f1: f64,
}

impl EvalReport {
    pub fn metrics(&self) -> ClassificationMetrics {
        ClassificationMetrics {
            balanced_accuracy: self.balanced_accuracy,
            auc: self.auc,
            f1: self.f1,
        }
    }
}

pub(crate) fn format_auc(auc: Option<f64>) -> String {
    match auc {
        Some(v) => format!("{v:.4}"),
        None => "n/a".to_string(),
    }
}

/// Score a frozen model on a whole partition in one batch.
///
/// Pass the inference-mode model (`model.valid()`) so batch normalization
/// uses running statistics. Logs one line prefixed by `tag`.
pub fn evaluate<B: Backend>(model: &ConfounderFreeModel<B>, batch: &LabeledBatch<B>, tag: &str) -> EvalReport {
    let logits = model.forward(batch.features.clone());
    let host_logits = tensor_to_vec(logits.clone());
    let loss = tensor_to_f64(bce_with_logits_loss(logits, batch.labels.clone()));
    let metrics = ClassificationMetrics::from_logits(&host_logits, &batch.host_labels);

    let report = EvalReport {
        balanced_accuracy: metrics.balanced_accuracy,
        loss,
        auc: metrics.auc,
        f1: metrics.f1,
    };
    tracing::info!(
        "{tag} result --> Accuracy: {:.4}, Loss: {:.4}, AUC: {}, F1: {:.4}",
        report.balanced_accuracy,
        report.loss,
        format_auc(report.auc),
        report.f1,
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::{rows_to_tensor, values_to_tensor};
    use crate::model::network::ConfounderFreeConfig;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn batch(labels: Vec<f32>) -> LabeledBatch<TestBackend> {
        let device = Default::default();
        let rows: Vec<Vec<f32>> = (0..labels.len())
            .map(|i| (0..5).map(|j| (i + j) as f32 * 0.1).collect())
            .collect();
        let refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        LabeledBatch {
            features: rows_to_tensor(&refs, &device),
            labels: values_to_tensor(&labels, &device),
            host_labels: labels,
        }
    }

    #[test]
    fn test_evaluate_reports_all_metrics() {
        let device = Default::default();
        let model = ConfounderFreeConfig::new(5, 1)
            .with_latent_dim(4)
            .init::<TestBackend>(&device);
        let report = evaluate(&model, &batch(vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0]), "eval");

        assert!(report.loss.is_finite() && report.loss > 0.0);
        assert!((0.0..=1.0).contains(&report.balanced_accuracy));
        assert!((0.0..=1.0).contains(&report.f1));
        assert!(report.auc.is_some());
    }

    #[test]
    fn test_single_class_partition_has_no_auc() {
        let device = Default::default();
        let model = ConfounderFreeConfig::new(5, 1)
            .with_latent_dim(4)
            .init::<TestBackend>(&device);
        let report = evaluate(&model, &batch(vec![1.0; 4]), "train");
        assert_eq!(report.auc, None);
        assert_eq!(report.metrics().auc, None);
    }

    #[test]
    fn test_format_auc() {
        assert_eq!(format_auc(Some(0.5)), "0.5000");
        assert_eq!(format_auc(None), "n/a");
    }
}
