//! Data types for aligned cohort samples and feature transforms.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transform applied to each raw abundance row at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Leave values untouched.
    None,
    /// `ln(x + 1)` per entry.
    #[default]
    Log1p,
    /// Centred log-ratio with a pseudo-count of 1: `ln(x + 1) - mean_row(ln(x + 1))`.
    Clr,
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Log1p => write!(f, "log1p"),
            Self::Clr => write!(f, "clr"),
        }
    }
}

impl std::str::FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "log1p" | "log" => Ok(Self::Log1p),
            "clr" => Ok(Self::Clr),
            other => Err(format!("unknown transform `{other}` (expected none, log1p or clr)")),
        }
    }
}

impl Transform {
    /// Apply the transform to one sample's abundance row in place.
    pub fn apply(&self, row: &mut [f32]) {
        match self {
            Self::None => {}
            Self::Log1p => row.iter_mut().for_each(|x| *x = x.ln_1p()),
            Self::Clr => {
                if row.is_empty() {
                    return;
                }
                row.iter_mut().for_each(|x| *x = x.ln_1p());
                let mean = row.iter().map(|&x| x as f64).sum::<f64>() / row.len() as f64;
                row.iter_mut().for_each(|x| *x -= mean as f32);
            }
        }
    }
}

/// One aligned sample: transformed features, disease flag and confounders.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sample identifier shared by both tables.
    pub id: String,
    /// Transformed abundance profile.
    pub features: Vec<f32>,
    /// `true` for the disease (case) group, `false` for controls.
    pub disease: bool,
    /// Confounder values in [`Cohort::confounder_names`] order. `None` = missing.
    pub confounders: Vec<Option<f32>>,
}

impl Sample {
    /// Whether this sample belongs to the control group.
    pub fn is_control(&self) -> bool {
        !self.disease
    }

    /// Disease label as a float target (0.0 / 1.0).
    pub fn label(&self) -> f32 {
        if self.disease {
            1.0
        } else {
            0.0
        }
    }

    /// Whether every confounder value is present.
    pub fn confounder_complete(&self) -> bool {
        self.confounders.iter().all(Option::is_some)
    }

    /// All confounder values, or `None` if any is missing.
    pub fn complete_confounders(&self) -> Option<Vec<f32>> {
        self.confounders.iter().copied().collect()
    }
}

/// Abundance and metadata tables aligned by sample identifier.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    /// Taxon column names, in feature order.
    pub feature_names: Vec<String>,
    /// Confounder column names, in confounder order.
    pub confounder_names: Vec<String>,
    /// Samples in metadata order.
    pub samples: Vec<Sample>,
}

impl Cohort {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the cohort has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Feature vector width.
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of tracked confounders.
    pub fn n_confounders(&self) -> usize {
        self.confounder_names.len()
    }

    /// Disease labels in sample order.
    pub fn labels(&self) -> Vec<bool> {
        self.samples.iter().map(|s| s.disease).collect()
    }

    /// Quick statistics for logging and the `summary` command.
    pub fn summary(&self) -> CohortSummary {
        let cases = self.samples.iter().filter(|s| s.disease).count();
        let missing_confounders = (0..self.n_confounders())
            .map(|j| {
                self.samples
                    .iter()
                    .filter(|s| s.confounders.get(j).copied().flatten().is_none())
                    .count()
            })
            .collect();
        CohortSummary {
            samples: self.len(),
            features: self.n_features(),
            controls: self.len() - cases,
            cases,
            complete_controls: self
                .samples
                .iter()
                .filter(|s| s.is_control() && s.confounder_complete())
                .count(),
            missing_confounders,
        }
    }
}

/// Counts describing a loaded cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortSummary {
    pub samples: usize,
    pub features: usize,
    pub controls: usize,
    pub cases: usize,
    /// Controls with every confounder present (the adversarial pool).
    pub complete_controls: usize,
    /// Missing-value count per confounder column.
    pub missing_confounders: Vec<usize>,
}

impl fmt::Display for CohortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples x {} features ({} controls, {} cases, {} confounder-complete controls)",
            self.samples, self.features, self.controls, self.cases, self.complete_controls
        )
    }
}
