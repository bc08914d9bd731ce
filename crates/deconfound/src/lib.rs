//! Confounder-free representation learning for microbiome cohorts.
//!
//! A shared encoder feeds a disease classifier and a confounder regressor.
//! Training alternates three phases per epoch: the regressor learns to
//! predict confounders from frozen features, the encoder is pushed through a
//! gradient-reversal layer to defeat it, and encoder plus classifier learn the
//! disease label. Distance correlation and mutual information track how much
//! confounder signal the learned features still carry.

pub mod diagnostics;
pub mod evaluation;
pub mod model;
pub mod report;
pub mod training;

pub use diagnostics::{mutual_information, u_distance_correlation_sqr, DependenceScore, Group};
pub use evaluation::{evaluate, EvalReport};
pub use model::{Activation, ConfounderFreeConfig, ConfounderFreeModel};
pub use report::EvaluationResults;
pub use training::trainer::{
    load_fold_model, train_cross_validated, train_fold, CrossValidationReport, TrainingConfig,
};
