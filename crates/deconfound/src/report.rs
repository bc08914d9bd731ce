//! Persisted artifacts: per-fold histories, aggregate results and curves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::evaluation::EvalReport;
use crate::training::metrics::FoldHistory;

pub const RESULTS_FILE: &str = "evaluation_results.json";

/// Final validation metrics of every fold plus their means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResults {
    pub accuracies: Vec<f64>,
    /// `None` where a fold's validation partition held a single class.
    pub aucs: Vec<Option<f64>>,
    pub f1s: Vec<f64>,
    pub mean_accuracy: f64,
    /// Mean over the folds that have an AUC.
    pub mean_auc: Option<f64>,
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl EvaluationResults {
    pub fn from_reports(reports: &[EvalReport]) -> Self {
        let accuracies: Vec<f64> = reports.iter().map(|r| r.balanced_accuracy).collect();
        let aucs: Vec<Option<f64>> = reports.iter().map(|r| r.auc).collect();
        Self {
            mean_accuracy: mean(accuracies.iter().copied()).unwrap_or(0.0),
            mean_auc: mean(aucs.iter().flatten().copied()),
            f1s: reports.iter().map(|r| r.f1).collect(),
            accuracies,
            aucs,
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }
}

/// Write `history_fold{k}.json` under `dir`.
pub fn save_history(history: &FoldHistory, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("history_fold{}.json", history.fold));
    let file = std::fs::File::create(&path)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
    serde_json::to_writer(file, history)?;
    Ok(path)
}

pub fn load_history(path: &Path) -> anyhow::Result<FoldHistory> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
}

/// One chart: a metric name and the named curves drawn on it.
#[derive(Debug, Clone)]
pub struct Panel {
    pub metric: &'static str,
    pub series: Vec<(String, Vec<Option<f64>>)>,
}

fn some(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|&v| v.is_finite().then_some(v)).collect()
}

/// Group a fold's history into the charts that get plotted.
pub fn panels(history: &FoldHistory) -> Vec<Panel> {
    vec![
        Panel {
            metric: "loss",
            series: vec![
                ("regressor".into(), some(&history.regressor_loss)),
                ("distiller".into(), some(&history.distiller_loss)),
                ("classifier".into(), some(&history.classifier_loss)),
                ("validation".into(), some(&history.val_loss)),
            ],
        },
        Panel {
            metric: "accuracy",
            series: vec![
                ("train".into(), some(&history.train_accuracy)),
                ("validation".into(), some(&history.val_accuracy)),
            ],
        },
        Panel {
            metric: "auc",
            series: vec![
                ("train".into(), history.train_auc.clone()),
                ("validation".into(), history.val_auc.clone()),
            ],
        },
        Panel {
            metric: "f1",
            series: vec![
                ("train".into(), some(&history.train_f1)),
                ("validation".into(), some(&history.val_f1)),
            ],
        },
        Panel {
            metric: "dcor",
            series: history
                .dependence
                .iter()
                .map(|t| (format!("{} {}", t.group, t.confounder), t.distance_correlation.clone()))
                .collect(),
        },
        Panel {
            metric: "mi",
            series: history
                .dependence
                .iter()
                .map(|t| (format!("{} {}", t.group, t.confounder), t.mutual_information.clone()))
                .collect(),
        },
    ]
}

pub fn plot_path(dir: &Path, metric: &str, fold: usize) -> PathBuf {
    dir.join(format!("confounder_free_{metric}_fold{fold}.png"))
}

/// Vertical range over every defined point, padded when flat.
fn value_range(panel: &Panel) -> Option<(f64, f64)> {
    let mut values = panel.series.iter().flat_map(|(_, v)| v.iter().flatten().copied());
    let first = values.next()?;
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if (hi - lo).abs() < 1e-12 {
        Some((lo - 0.5, hi + 0.5))
    } else {
        let pad = (hi - lo) * 0.05;
        Some((lo - pad, hi + pad))
    }
}

/// Draw every panel of `history` as a PNG under `dir`. Panels with no
/// defined points are skipped. Returns the written paths.
#[cfg(feature = "plots")]
pub fn save_plots(history: &FoldHistory, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    use plotters::prelude::*;

    let epochs = history.len().max(1);
    let mut written = Vec::new();
    for panel in panels(history) {
        let Some((y_min, y_max)) = value_range(&panel) else {
            continue;
        };
        let path = plot_path(dir, panel.metric, history.fold);
        let root = BitMapBackend::new(&path, (800, 500)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| anyhow::anyhow!("{e}"))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption(format!("{} (fold {})", panel.metric, history.fold), ("sans-serif", 22))
            .x_label_area_size(40)
            .y_label_area_size(55)
            .build_cartesian_2d(0..epochs, y_min..y_max)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        chart
            .configure_mesh()
            .x_desc("epoch")
            .y_desc(panel.metric)
            .draw()
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        for (idx, (label, values)) in panel.series.iter().enumerate() {
            let color = Palette99::pick(idx).mix(0.9);
            let points: Vec<(usize, f64)> = values
                .iter()
                .enumerate()
                .filter_map(|(e, v)| v.map(|v| (e, v)))
                .collect();
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))
                .map_err(|e| anyhow::anyhow!("{e}"))?
                .label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        root.present().map_err(|e| anyhow::anyhow!("{e}"))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(not(feature = "plots"))]
pub fn save_plots(history: &FoldHistory, _dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    tracing::debug!(fold = history.fold, "plots feature is not enabled, skipping curves");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Group;
    use crate::training::metrics::DependenceTrace;

    fn report(acc: f64, auc: Option<f64>) -> EvalReport {
        EvalReport {
            balanced_accuracy: acc,
            loss: 0.5,
            auc,
            f1: acc,
        }
    }

    #[test]
    fn test_means_skip_missing_auc() {
        let results = EvaluationResults::from_reports(&[
            report(0.6, Some(0.7)),
            report(0.8, None),
            report(0.7, Some(0.9)),
        ]);
        assert!((results.mean_accuracy - 0.7).abs() < 1e-12);
        assert!((results.mean_auc.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(results.aucs, vec![Some(0.7), None, Some(0.9)]);
        assert_eq!(results.f1s.len(), 3);

        let none = EvaluationResults::from_reports(&[report(0.5, None)]);
        assert_eq!(none.mean_auc, None);
    }

    #[test]
    fn test_results_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULTS_FILE);
        let results = EvaluationResults::from_reports(&[report(0.6, Some(0.7)), report(0.8, None)]);
        results.save(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["aucs"][1].is_null());
        assert_eq!(raw["accuracies"].as_array().unwrap().len(), 2);

        assert_eq!(EvaluationResults::load(&path).unwrap(), results);
        assert!(EvaluationResults::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_history_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let history = FoldHistory::new(3);
        let path = save_history(&history, dir.path()).unwrap();
        assert!(path.ends_with("history_fold3.json"));
        assert_eq!(load_history(&path).unwrap(), history);
    }

    #[test]
    fn test_panels_and_ranges() {
        let mut history = FoldHistory::new(0);
        history.regressor_loss = vec![1.0, 0.5];
        history.distiller_loss = vec![1.0, f64::NAN];
        history.classifier_loss = vec![0.7, 0.6];
        history.val_loss = vec![0.7, 0.65];
        history.dependence.push(DependenceTrace {
            group: Group::Control,
            confounder: "AGE".into(),
            distance_correlation: vec![None, None],
            mutual_information: vec![Some(0.2), Some(0.2)],
        });

        let panels = panels(&history);
        let names: Vec<&str> = panels.iter().map(|p| p.metric).collect();
        assert_eq!(names, vec!["loss", "accuracy", "auc", "f1", "dcor", "mi"]);

        let loss = &panels[0];
        assert_eq!(loss.series[1].1, vec![Some(1.0), None]);
        let (lo, hi) = value_range(loss).unwrap();
        assert!(lo < 0.5 && hi > 1.0);

        // No defined dcor points: nothing to draw
        assert!(value_range(&panels[4]).is_none());
        // Flat series gets padded
        assert_eq!(value_range(&panels[5]), Some((0.2 - 0.5, 0.2 + 0.5)));
        assert_eq!(panels[5].series[0].0, "control AGE");

        assert!(plot_path(Path::new("plots"), "dcor", 2).ends_with("confounder_free_dcor_fold2.png"));
    }
}
