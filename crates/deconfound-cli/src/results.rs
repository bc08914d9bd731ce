//! Human-readable rendering of cross-validation results.

use deconfound::EvaluationResults;

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.4}"),
        None => "n/a".to_string(),
    }
}

/// Median of the defined values, `None` when there are none.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// One row per fold plus mean and median rows.
pub fn format_summary(results: &EvaluationResults) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<8} {:>10} {:>10} {:>10}\n", "fold", "accuracy", "auc", "f1"));
    for (k, acc) in results.accuracies.iter().enumerate() {
        let auc = results.aucs.get(k).copied().flatten();
        let f1 = results.f1s.get(k).copied();
        out.push_str(&format!("{:<8} {:>10.4} {:>10} {:>10}\n", k, acc, cell(auc), cell(f1)));
    }

    let mean_f1 = (!results.f1s.is_empty())
        .then(|| results.f1s.iter().sum::<f64>() / results.f1s.len() as f64);
    out.push_str(&format!(
        "{:<8} {:>10.4} {:>10} {:>10}\n",
        "mean",
        results.mean_accuracy,
        cell(results.mean_auc),
        cell(mean_f1)
    ));
    out.push_str(&format!(
        "{:<8} {:>10} {:>10} {:>10}\n",
        "median",
        cell(median(results.accuracies.iter().copied())),
        cell(median(results.aucs.iter().flatten().copied())),
        cell(median(results.f1s.iter().copied()))
    ));
    out
}
