//! Fold assignment, sample pools and batch construction.
//!
//! All randomness comes from the caller's `Rng`, which the fold driver
//! threads through every call so that a single seed reproduces a run.

use burn::prelude::*;
use cohort::{Cohort, Sample};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::diagnostics::Group;
use crate::model::bridge::{rows_to_tensor, values_to_tensor};

/// One train/validation partition of the cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Stratified k-fold assignment.
///
/// Each class is shuffled independently and dealt round-robin into folds,
/// continuing the deal across classes so fold sizes differ by at most one.
/// Every index appears in exactly one validation set. Both index lists are
/// returned sorted.
pub fn stratified_folds(labels: &[bool], k: usize, rng: &mut impl Rng) -> anyhow::Result<Vec<FoldSplit>> {
    anyhow::ensure!(k >= 2, "need at least 2 folds, got {k}");
    anyhow::ensure!(
        labels.len() >= k,
        "cannot split {} samples into {k} folds",
        labels.len()
    );

    let mut assignment = vec![0usize; labels.len()];
    let mut position = 0usize;
    for class in [false, true] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        members.shuffle(rng);
        for idx in members {
            assignment[idx] = position % k;
            position += 1;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| assignment[i] == fold);
            FoldSplit {
                fold,
                train,
                validation,
            }
        })
        .collect())
}

/// Draw `size` entries from `pool`.
///
/// Without replacement, a request at least as large as the pool returns the
/// entire pool in shuffled order. An empty pool yields an empty batch.
pub fn sample_indices(pool: &[usize], size: usize, replacement: bool, rng: &mut impl Rng) -> Vec<usize> {
    if pool.is_empty() {
        return Vec::new();
    }
    if replacement {
        (0..size).map(|_| pool[rng.gen_range(0..pool.len())]).collect()
    } else {
        let mut drawn = pool.to_vec();
        drawn.shuffle(rng);
        drawn.truncate(size);
        drawn
    }
}

/// Sample pools for one fold's training partition.
#[derive(Debug, Clone)]
pub struct TrainingPools {
    /// Controls with every confounder present, for the regressor and distiller.
    pub control: Vec<usize>,
    /// Every training sample, for the classifier.
    pub full: Vec<usize>,
}

impl TrainingPools {
    pub fn new(cohort: &Cohort, train: &[usize]) -> Self {
        let control = train
            .iter()
            .copied()
            .filter(|&i| {
                let s = &cohort.samples[i];
                s.is_control() && s.confounder_complete()
            })
            .collect();
        Self {
            control,
            full: train.to_vec(),
        }
    }
}

/// Features plus stacked confounder targets, `(batch, n_features)` and
/// `(batch, n_confounders)`.
#[derive(Debug, Clone)]
pub struct ControlBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub confounders: Tensor<B, 2>,
}

/// Features plus 0/1 disease labels.
#[derive(Debug, Clone)]
pub struct LabeledBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub labels: Tensor<B, 1>,
    /// Host copy of `labels` for metric computation.
    pub host_labels: Vec<f32>,
}

/// Build a control batch. Rows with a missing confounder are skipped; returns
/// `None` if nothing remains.
pub fn control_batch<B: Backend>(cohort: &Cohort, indices: &[usize], device: &B::Device) -> Option<ControlBatch<B>> {
    let mut rows: Vec<&[f32]> = Vec::with_capacity(indices.len());
    let mut targets: Vec<Vec<f32>> = Vec::with_capacity(indices.len());
    for &i in indices {
        let sample = &cohort.samples[i];
        if let Some(values) = sample.complete_confounders() {
            rows.push(&sample.features);
            targets.push(values);
        }
    }
    if rows.is_empty() || cohort.n_confounders() == 0 {
        return None;
    }

    let target_rows: Vec<&[f32]> = targets.iter().map(Vec::as_slice).collect();
    Some(ControlBatch {
        features: rows_to_tensor(&rows, device),
        confounders: rows_to_tensor(&target_rows, device),
    })
}

/// Build a labeled batch over `indices`, or `None` if `indices` is empty.
pub fn labeled_batch<B: Backend>(cohort: &Cohort, indices: &[usize], device: &B::Device) -> Option<LabeledBatch<B>> {
    if indices.is_empty() {
        return None;
    }
    let samples: Vec<&Sample> = indices.iter().map(|&i| &cohort.samples[i]).collect();
    let rows: Vec<&[f32]> = samples.iter().map(|s| s.features.as_slice()).collect();
    let host_labels: Vec<f32> = samples.iter().map(|s| s.label()).collect();
    Some(LabeledBatch {
        features: rows_to_tensor(&rows, device),
        labels: values_to_tensor(&host_labels, device),
        host_labels,
    })
}

/// Confounder-complete training samples of one group, fixed for a fold.
#[derive(Debug, Clone)]
pub struct DependenceSubset {
    pub group: Group,
    pub indices: Vec<usize>,
    /// `(samples, n_confounders)` confounder values.
    pub targets: Array2<f64>,
}

impl DependenceSubset {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Feature rows of the subset, for encoding.
    pub fn rows<'a>(&self, cohort: &'a Cohort) -> Vec<&'a [f32]> {
        self.indices
            .iter()
            .map(|&i| cohort.samples[i].features.as_slice())
            .collect()
    }
}

/// Split the training partition into control and disease dependence subsets.
pub fn dependence_subsets(cohort: &Cohort, train: &[usize]) -> Vec<DependenceSubset> {
    [Group::Control, Group::Disease]
        .into_iter()
        .map(|group| {
            let mut indices = Vec::new();
            let mut values = Vec::new();
            for &i in train {
                let sample = &cohort.samples[i];
                if sample.disease != (group == Group::Disease) {
                    continue;
                }
                if let Some(conf) = sample.complete_confounders() {
                    indices.push(i);
                    values.extend(conf.into_iter().map(f64::from));
                }
            }
            let targets = Array2::from_shape_vec((indices.len(), cohort.n_confounders()), values)
                .unwrap_or_else(|_| Array2::zeros((0, cohort.n_confounders())));
            DependenceSubset {
                group,
                indices,
                targets,
            }
        })
        .collect()
}
