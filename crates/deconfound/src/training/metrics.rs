//! Binary classification metrics and the per-fold metric history.

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DependenceScore, Group};

/// Probability threshold applied to `sigmoid(logit)`; only values strictly
/// above it are predicted positive.
pub const DECISION_THRESHOLD: f64 = 0.5;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Mean recall over the classes present in `y_true`.
///
/// Returns 0 for empty input.
pub fn balanced_accuracy(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let mut recalls = Vec::with_capacity(2);
    for class in [false, true] {
        let support = y_true.iter().filter(|&&t| t == class).count();
        if support == 0 {
            continue;
        }
        let hits = y_true
            .iter()
            .zip(y_pred)
            .filter(|(&t, &p)| t == class && p == class)
            .count();
        recalls.push(hits as f64 / support as f64);
    }
    if recalls.is_empty() {
        0.0
    } else {
        recalls.iter().sum::<f64>() / recalls.len() as f64
    }
}

/// F1 of the positive class: `2TP / (2TP + FP + FN)`, 0 when undefined.
pub fn f1_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        0.0
    } else {
        (2 * tp) as f64 / denom as f64
    }
}

/// Area under the ROC curve via the Mann–Whitney U statistic.
///
/// Tied scores receive their average rank. Returns `None` with a warning when
/// `y_true` holds a single class.
pub fn roc_auc(y_true: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&t| t).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        tracing::warn!(
            positives = n_pos,
            negatives = n_neg,
            "Only one class present in y_true; ROC AUC is undefined"
        );
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; ties share the mean of start+1..=end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        start = end;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(y_true)
        .filter(|(_, &t)| t)
        .map(|(r, _)| r)
        .sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Balanced accuracy, AUC and F1 for one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub balanced_accuracy: f64,
    pub auc: Option<f64>,
    pub f1: f64,
}

impl ClassificationMetrics {
    /// Score raw logits against 0/1 labels.
    pub fn from_logits(logits: &[f64], labels: &[f32]) -> Self {
        let probs: Vec<f64> = logits.iter().map(|&l| sigmoid(l)).collect();
        let y_true: Vec<bool> = labels.iter().map(|&l| l >= 0.5).collect();
        let y_pred: Vec<bool> = probs.iter().map(|&p| p > DECISION_THRESHOLD).collect();
        Self {
            balanced_accuracy: balanced_accuracy(&y_true, &y_pred),
            auc: roc_auc(&y_true, &probs),
            f1: f1_score(&y_true, &y_pred),
        }
    }
}

/// Everything recorded for one epoch.
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    pub regressor_loss: f64,
    pub distiller_loss: f64,
    pub classifier_loss: f64,
    pub train: ClassificationMetrics,
    pub validation_loss: f64,
    pub validation: ClassificationMetrics,
    pub dependence: Vec<DependenceScore>,
}

/// One dependence curve: a group/confounder pair across epochs.
///
/// Undefined estimates (too few samples) are stored as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependenceTrace {
    pub group: Group,
    pub confounder: String,
    pub distance_correlation: Vec<Option<f64>>,
    pub mutual_information: Vec<Option<f64>>,
}

/// Per-epoch metric sequences for one fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldHistory {
    pub fold: usize,
    pub regressor_loss: Vec<f64>,
    pub distiller_loss: Vec<f64>,
    pub classifier_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub train_auc: Vec<Option<f64>>,
    pub train_f1: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub val_auc: Vec<Option<f64>>,
    pub val_f1: Vec<f64>,
    pub dependence: Vec<DependenceTrace>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl FoldHistory {
    pub fn new(fold: usize) -> Self {
        Self {
            fold,
            ..Default::default()
        }
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.classifier_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifier_loss.is_empty()
    }

    pub fn push(&mut self, epoch: &EpochMetrics) {
        self.regressor_loss.push(epoch.regressor_loss);
        self.distiller_loss.push(epoch.distiller_loss);
        self.classifier_loss.push(epoch.classifier_loss);
        self.train_accuracy.push(epoch.train.balanced_accuracy);
        self.train_auc.push(epoch.train.auc);
        self.train_f1.push(epoch.train.f1);
        self.val_loss.push(epoch.validation_loss);
        self.val_accuracy.push(epoch.validation.balanced_accuracy);
        self.val_auc.push(epoch.validation.auc);
        self.val_f1.push(epoch.validation.f1);

        for score in &epoch.dependence {
            let idx = match self
                .dependence
                .iter()
                .position(|t| t.group == score.group && t.confounder == score.confounder)
            {
                Some(idx) => idx,
                None => {
                    self.dependence.push(DependenceTrace {
                        group: score.group,
                        confounder: score.confounder.clone(),
                        distance_correlation: Vec::new(),
                        mutual_information: Vec::new(),
                    });
                    self.dependence.len() - 1
                }
            };
            let trace = &mut self.dependence[idx];
            trace.distance_correlation.push(finite(score.distance_correlation));
            trace.mutual_information.push(finite(score.mutual_information));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_balanced_accuracy() {
        let y_true = [true, true, true, true, false, false];
        let y_pred = [true, true, true, false, false, true];
        // recall(pos) = 3/4, recall(neg) = 1/2
        assert!((balanced_accuracy(&y_true, &y_pred) - 0.625).abs() < 1e-12);

        // Single class present: plain recall of that class
        assert_eq!(balanced_accuracy(&[false, false], &[false, true]), 0.5);
        assert_eq!(balanced_accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_f1() {
        let y_true = [true, true, false, false];
        let y_pred = [true, false, true, false];
        // TP=1, FP=1, FN=1
        assert!((f1_score(&y_true, &y_pred) - 0.5).abs() < 1e-12);
        assert_eq!(f1_score(&[false, false], &[false, false]), 0.0);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y_true = [false, false, true, true];
        assert_eq!(roc_auc(&y_true, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y_true, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_auc_with_ties() {
        let y_true = [false, true, false, true];
        // All scores tied: AUC = 0.5
        assert_eq!(roc_auc(&y_true, &[0.5; 4]), Some(0.5));

        // One positive above both negatives, one tied with a negative
        let auc = roc_auc(&y_true, &[0.2, 0.9, 0.5, 0.5]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12, "got {auc}");
    }

    /// Log sink shared between a scoped subscriber and the test body.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_auc_single_class_is_none() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(roc_auc(&[true, true, true], &[0.1, 0.5, 0.9]), None);
        });
        let text = logs.text();
        assert!(text.contains("WARN"), "no warning emitted: {text}");
        assert!(text.contains("ROC AUC is undefined"), "unexpected log: {text}");
        assert!(text.contains("negatives=0"));

        assert_eq!(roc_auc(&[false], &[0.3]), None);
    }

    #[test]
    fn test_zero_logit_is_negative() {
        let metrics = ClassificationMetrics::from_logits(&[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(metrics.balanced_accuracy, 1.0);
        assert_eq!(metrics.f1, 0.0);

        // Against positives the same logits are all misses
        let metrics = ClassificationMetrics::from_logits(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(metrics.balanced_accuracy, 0.0);
    }

    #[test]
    fn test_from_logits_thresholds_at_half() {
        let metrics = ClassificationMetrics::from_logits(&[-2.0, -0.1, 0.1, 3.0], &[0.0, 1.0, 0.0, 1.0]);
        // predictions: F, F, T, T
        assert!((metrics.balanced_accuracy - 0.5).abs() < 1e-12);
        assert!((metrics.f1 - 0.5).abs() < 1e-12);
        assert_eq!(metrics.auc, Some(0.75));

        let single = ClassificationMetrics::from_logits(&[1.0, 2.0], &[1.0, 1.0]);
        assert_eq!(single.auc, None);
        assert_eq!(single.balanced_accuracy, 1.0);
    }

    #[test]
    fn test_history_groups_dependence_by_pair() {
        let epoch = |dcor: f64| EpochMetrics {
            regressor_loss: 1.0,
            distiller_loss: 1.0,
            classifier_loss: 0.7,
            train: ClassificationMetrics { balanced_accuracy: 0.6, auc: None, f1: 0.5 },
            validation_loss: 0.8,
            validation: ClassificationMetrics { balanced_accuracy: 0.55, auc: Some(0.6), f1: 0.4 },
            dependence: vec![
                DependenceScore {
                    group: Group::Control,
                    confounder: "AGE".into(),
                    distance_correlation: dcor,
                    mutual_information: 0.1,
                },
                DependenceScore {
                    group: Group::Disease,
                    confounder: "AGE".into(),
                    distance_correlation: f64::NAN,
                    mutual_information: 0.2,
                },
            ],
        };

        let mut history = FoldHistory::new(2);
        history.push(&epoch(0.3));
        history.push(&epoch(0.2));

        assert_eq!(history.len(), 2);
        assert_eq!(history.dependence.len(), 2);
        assert_eq!(history.dependence[0].distance_correlation, vec![Some(0.3), Some(0.2)]);
        assert_eq!(history.dependence[1].distance_correlation, vec![None, None]);
        assert_eq!(history.train_auc, vec![None, None]);

        let json = serde_json::to_string(&history).unwrap();
        let back: FoldHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
