//! Adversarial training loop and k-fold cross-validation driver.
//!
//! Each epoch runs the three [`Phase`]s in order on freshly drawn batches,
//! then measures confounder dependence of the learned features, evaluates on
//! the held-out fold and consults early stopping. Every fold starts from a
//! fresh model with its own optimizers and schedulers.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use cohort::Cohort;
use ndarray::Array2;
use rand::Rng;

use crate::diagnostics::{dependence_scores, DependenceScore};
use crate::evaluation::{evaluate, format_auc, EvalReport};
use crate::model::block::Block;
use crate::model::bridge::{rows_to_tensor, tensor_to_array2};
use crate::model::network::{ConfounderFreeConfig, ConfounderFreeModel};
use crate::report::{save_history, save_plots, EvaluationResults, RESULTS_FILE};
use crate::training::data::{
    control_batch, dependence_subsets, labeled_batch, sample_indices, stratified_folds,
    DependenceSubset, FoldSplit, TrainingPools,
};
use crate::training::metrics::{ClassificationMetrics, EpochMetrics, FoldHistory};
use crate::training::phase::{run_phase, EpochBatches, Phase, PhaseOptimizers};
use crate::training::scheduler::{PlateauConfig, PlateauMode, PlateauScheduler};
use crate::training::stopping::EarlyStopping;

/// Configuration for cross-validated adversarial training.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Maximum epochs per fold.
    #[config(default = 100)]
    pub epochs: usize,
    /// Classifier batch size, drawn from the full training pool.
    #[config(default = 64)]
    pub batch_size: usize,
    /// Regressor/distiller batch size, drawn from the control pool.
    /// Falls back to `batch_size`.
    pub control_batch_size: Option<usize>,
    #[config(default = 1e-3)]
    pub lr_regressor: f64,
    #[config(default = 1e-3)]
    pub lr_distiller: f64,
    #[config(default = 5e-3)]
    pub lr_classifier: f64,
    /// Number of cross-validation folds.
    #[config(default = 5)]
    pub folds: usize,
    /// Epochs without a training-accuracy improvement before a fold stops.
    #[config(default = 20)]
    pub patience: usize,
    #[config(default = 0.5)]
    pub scheduler_factor: f64,
    #[config(default = 5)]
    pub scheduler_patience: usize,
    #[config(default = 1e-4)]
    pub scheduler_threshold: f64,
    /// Draw batches with replacement.
    #[config(default = false)]
    pub replacement: bool,
    /// Neighbour count for the mutual-information estimate.
    #[config(default = 3)]
    pub mi_neighbors: usize,
    /// Directory receiving weights, histories, plots and results.
    #[config(default = "String::from(\"output\")")]
    pub output_dir: String,
}

impl TrainingConfig {
    pub fn effective_control_batch_size(&self) -> usize {
        self.control_batch_size.unwrap_or(self.batch_size)
    }

    fn plateau(&self) -> PlateauConfig {
        PlateauConfig {
            factor: self.scheduler_factor,
            patience: self.scheduler_patience,
            threshold: self.scheduler_threshold,
            ..Default::default()
        }
    }
}

/// Outcome of a full cross-validation run.
#[derive(Debug, Clone)]
pub struct CrossValidationReport {
    pub results: EvaluationResults,
    pub histories: Vec<FoldHistory>,
}

/// Outcome of one fold.
pub struct FoldOutcome<B: AutodiffBackend> {
    pub model: ConfounderFreeModel<B>,
    pub history: FoldHistory,
    pub validation: EvalReport,
    /// Epoch index at which early stopping fired, if it did.
    pub stopped_at: Option<usize>,
}

/// One plateau scheduler per phase.
struct PhaseSchedulers {
    regressor: PlateauScheduler,
    distiller: PlateauScheduler,
    classifier: PlateauScheduler,
}

impl PhaseSchedulers {
    fn new(config: &TrainingConfig) -> Self {
        let plateau = config.plateau();
        Self {
            regressor: PlateauScheduler::new(config.lr_regressor, PlateauMode::Min, plateau),
            distiller: PlateauScheduler::new(config.lr_distiller, PlateauMode::Min, plateau),
            classifier: PlateauScheduler::new(config.lr_classifier, PlateauMode::Max, plateau),
        }
    }

    fn get_mut(&mut self, phase: Phase) -> &mut PlateauScheduler {
        match phase {
            Phase::Regressor => &mut self.regressor,
            Phase::Distiller => &mut self.distiller,
            Phase::Classifier => &mut self.classifier,
        }
    }
}

pub fn encoder_path(dir: &Path, fold: usize) -> PathBuf {
    dir.join(format!("encoder_fold{fold}"))
}

pub fn classifier_path(dir: &Path, fold: usize) -> PathBuf {
    dir.join(format!("disease_classifier_fold{fold}"))
}

/// Encode a dependence subset without gradient tracking and score it.
fn subset_dependence<B: Backend>(
    model: &ConfounderFreeModel<B>,
    cohort: &Cohort,
    subset: &DependenceSubset,
    neighbors: usize,
    device: &B::Device,
) -> Vec<DependenceScore> {
    let encoded = if subset.is_empty() {
        Array2::zeros((0, model.encoder.d_output()))
    } else {
        let x = rows_to_tensor::<B>(&subset.rows(cohort), device);
        tensor_to_array2(model.encode(x))
    };
    dependence_scores(
        subset.group,
        encoded.view(),
        subset.targets.view(),
        &cohort.confounder_names,
        neighbors,
    )
}

/// Train one fold from a freshly initialized model.
///
/// The training pools must be non-empty; [`train_cross_validated`] checks this
/// for every fold before any training starts.
pub fn train_fold<B: AutodiffBackend>(
    config: &TrainingConfig,
    model_config: &ConfounderFreeConfig,
    cohort: &Cohort,
    split: &FoldSplit,
    rng: &mut impl Rng,
    device: &B::Device,
) -> anyhow::Result<FoldOutcome<B>> {
    let fold = split.fold;
    let pools = TrainingPools::new(cohort, &split.train);
    anyhow::ensure!(
        !pools.control.is_empty(),
        "fold {fold}: no control samples with complete confounders in the training partition"
    );
    let subsets = dependence_subsets(cohort, &split.train);
    let validation = labeled_batch::<B::InnerBackend>(cohort, &split.validation, device)
        .ok_or_else(|| anyhow::anyhow!("fold {fold}: empty validation partition"))?;

    tracing::info!(
        fold,
        train = split.train.len(),
        validation = split.validation.len(),
        control_pool = pools.control.len(),
        "Starting fold"
    );

    // Weight init draws from the backend generator
    B::seed(rng.gen());
    let mut model = model_config.init::<B>(device);
    let mut optimizers = PhaseOptimizers {
        regressor: AdamConfig::new().init::<B, Block<B>>(),
        distiller: AdamConfig::new().init::<B, Block<B>>(),
        classifier: AdamConfig::new().init::<B, ConfounderFreeModel<B>>(),
    };
    let mut schedulers = PhaseSchedulers::new(config);
    let mut stopper = EarlyStopping::new(config.patience);
    let mut history = FoldHistory::new(fold);
    let mut last_validation = None;
    let mut stopped_at = None;
    let control_size = config.effective_control_batch_size();

    for epoch in 0..config.epochs {
        let control_idx = sample_indices(&pools.control, control_size, config.replacement, rng);
        let full_idx = sample_indices(&pools.full, config.batch_size, config.replacement, rng);
        let batches = EpochBatches {
            control: control_batch::<B>(cohort, &control_idx, device)
                .ok_or_else(|| anyhow::anyhow!("fold {fold}: empty control batch"))?,
            full: labeled_batch::<B>(cohort, &full_idx, device)
                .ok_or_else(|| anyhow::anyhow!("fold {fold}: empty training batch"))?,
        };

        let mut losses = [0.0; 3];
        let mut train = ClassificationMetrics {
            balanced_accuracy: 0.0,
            auc: None,
            f1: 0.0,
        };
        for (slot, phase) in Phase::ORDER.into_iter().enumerate() {
            let lr = schedulers.get_mut(phase).lr();
            let (updated, outcome) = run_phase(phase, model, &batches, &mut optimizers, lr);
            model = updated;
            losses[slot] = outcome.loss;

            let monitored = match outcome.logits {
                Some(logits) => {
                    train = ClassificationMetrics::from_logits(&logits, &batches.full.host_labels);
                    train.balanced_accuracy
                }
                None => outcome.loss,
            };
            if let Some(new_lr) = schedulers.get_mut(phase).step(monitored) {
                tracing::info!(fold, epoch, %phase, lr = new_lr, "Learning rate reduced");
            }
        }
        let [regressor_loss, distiller_loss, classifier_loss] = losses;

        tracing::info!(
            fold,
            epoch,
            regressor_loss = format!("{regressor_loss:.4}"),
            distiller_loss = format!("{distiller_loss:.4}"),
            classifier_loss = format!("{classifier_loss:.4}"),
            train_accuracy = format!("{:.4}", train.balanced_accuracy),
            "Epoch complete"
        );

        let frozen = model.valid();
        let dependence = subsets
            .iter()
            .flat_map(|subset| subset_dependence(&frozen, cohort, subset, config.mi_neighbors, device))
            .collect();
        let report = evaluate(&frozen, &validation, "eval");

        history.push(&EpochMetrics {
            regressor_loss,
            distiller_loss,
            classifier_loss,
            train,
            validation_loss: report.loss,
            validation: report.metrics(),
            dependence,
        });
        last_validation = Some(report);

        if stopper.update(train.balanced_accuracy) {
            tracing::warn!(
                fold,
                epoch,
                best_accuracy = stopper.best(),
                patience = config.patience,
                "Early stopping: training accuracy has not improved"
            );
            stopped_at = Some(epoch);
            break;
        }
    }

    let validation = match last_validation {
        Some(report) => report,
        None => evaluate(&model.valid(), &validation, "eval"),
    };
    Ok(FoldOutcome {
        model,
        history,
        validation,
        stopped_at,
    })
}

/// Save the encoder and classifier weights of a trained fold.
pub fn save_fold_weights<B: Backend>(model: &ConfounderFreeModel<B>, dir: &Path, fold: usize) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .encoder
        .clone()
        .save_file(encoder_path(dir, fold), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save encoder for fold {fold}: {e}"))?;
    model
        .classifier
        .clone()
        .save_file(classifier_path(dir, fold), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save classifier for fold {fold}: {e}"))?;
    Ok(())
}

/// Rebuild a fold's encoder + classifier from saved weights.
///
/// The regressor is freshly initialized; it is not persisted.
pub fn load_fold_model<B: Backend>(
    model_config: &ConfounderFreeConfig,
    dir: &Path,
    fold: usize,
    device: &B::Device,
) -> anyhow::Result<ConfounderFreeModel<B>> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut model = model_config.init::<B>(device);
    model.encoder = model
        .encoder
        .load_file(encoder_path(dir, fold), &recorder, device)
        .map_err(|e| anyhow::anyhow!("Failed to load encoder for fold {fold} from {}: {e}", dir.display()))?;
    model.classifier = model
        .classifier
        .load_file(classifier_path(dir, fold), &recorder, device)
        .map_err(|e| anyhow::anyhow!("Failed to load classifier for fold {fold} from {}: {e}", dir.display()))?;
    Ok(model)
}

/// Run stratified k-fold training end to end and persist every artifact
/// under `config.output_dir`.
pub fn train_cross_validated<B: AutodiffBackend>(
    config: &TrainingConfig,
    model_config: &ConfounderFreeConfig,
    cohort: &Cohort,
    rng: &mut impl Rng,
    device: &B::Device,
) -> anyhow::Result<CrossValidationReport> {
    anyhow::ensure!(cohort.n_confounders() > 0, "at least one confounder is required");
    anyhow::ensure!(
        model_config.input_dim == cohort.n_features(),
        "model expects {} input features but the cohort has {}",
        model_config.input_dim,
        cohort.n_features()
    );
    anyhow::ensure!(
        model_config.n_confounders == cohort.n_confounders(),
        "model predicts {} confounders but the cohort has {}",
        model_config.n_confounders,
        cohort.n_confounders()
    );
    anyhow::ensure!(config.batch_size > 0, "batch size must be positive");
    anyhow::ensure!(config.effective_control_batch_size() > 0, "control batch size must be positive");

    let splits = stratified_folds(&cohort.labels(), config.folds, rng)?;
    for split in &splits {
        let pools = TrainingPools::new(cohort, &split.train);
        anyhow::ensure!(
            !pools.control.is_empty(),
            "fold {}: no control samples with complete confounders in the training partition",
            split.fold
        );
    }

    let output = PathBuf::from(&config.output_dir);
    let models_dir = output.join("models");
    let plots_dir = output.join("plots");
    std::fs::create_dir_all(&models_dir)?;
    std::fs::create_dir_all(&plots_dir)?;
    model_config
        .save(output.join("model_config.json"))
        .map_err(|e| anyhow::anyhow!("Failed to save model config: {e}"))?;

    tracing::info!(
        samples = cohort.len(),
        features = cohort.n_features(),
        confounders = ?cohort.confounder_names,
        folds = config.folds,
        epochs = config.epochs,
        "Starting cross-validated training"
    );

    let mut reports = Vec::with_capacity(splits.len());
    let mut histories = Vec::with_capacity(splits.len());
    for split in &splits {
        let outcome = train_fold::<B>(config, model_config, cohort, split, rng, device)?;

        save_fold_weights(&outcome.model, &models_dir, split.fold)?;
        save_history(&outcome.history, &output)?;
        match save_plots(&outcome.history, &plots_dir) {
            Ok(paths) if !paths.is_empty() => {
                tracing::debug!(fold = split.fold, plots = paths.len(), "Saved plots")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(fold = split.fold, "Failed to draw plots: {e}"),
        }

        tracing::info!(
            fold = split.fold,
            epochs = outcome.history.len(),
            early_stopped = outcome.stopped_at.is_some(),
            accuracy = format!("{:.4}", outcome.validation.balanced_accuracy),
            auc = %format_auc(outcome.validation.auc),
            f1 = format!("{:.4}", outcome.validation.f1),
            "Fold complete"
        );
        reports.push(outcome.validation);
        histories.push(outcome.history);
    }

    let results = EvaluationResults::from_reports(&reports);
    results.save(&output.join(RESULTS_FILE))?;
    tracing::info!(
        mean_accuracy = format!("{:.4}", results.mean_accuracy),
        mean_auc = %format_auc(results.mean_auc),
        "Cross-validation complete"
    );

    Ok(CrossValidationReport { results, histories })
}
