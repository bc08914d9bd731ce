//! The three optimization phases of an epoch.
//!
//! [`Phase`] is the capability guard for the shared encoder. A single
//! exhaustive match in [`run_phase`] decides, per phase, where the gradient
//! path is cut and which parameter group's gradients reach an optimizer:
//!
//! | phase      | graph                              | updated               |
//! |------------|------------------------------------|-----------------------|
//! | Regressor  | encoder → detach → regressor       | regressor             |
//! | Distiller  | encoder → GRL → regressor          | encoder               |
//! | Classifier | encoder → classifier               | encoder + classifier  |

use std::fmt;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::model::block::Block;
use crate::model::bridge::{tensor_to_f64, tensor_to_vec};
use crate::model::network::ConfounderFreeModel;
use crate::training::data::{ControlBatch, LabeledBatch};
use crate::training::loss::{bce_with_logits_loss, confounder_mse_loss};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Regressor,
    Distiller,
    Classifier,
}

impl Phase {
    /// Execution order within an epoch.
    pub const ORDER: [Phase; 3] = [Phase::Regressor, Phase::Distiller, Phase::Classifier];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regressor => write!(f, "regressor"),
            Self::Distiller => write!(f, "distiller"),
            Self::Classifier => write!(f, "classifier"),
        }
    }
}

/// One optimizer per phase, each owning the state of its parameter group.
pub struct PhaseOptimizers<OR, OD, OC> {
    pub regressor: OR,
    pub distiller: OD,
    pub classifier: OC,
}

/// Batches consumed by one epoch's three phases.
pub struct EpochBatches<B: Backend> {
    pub control: ControlBatch<B>,
    pub full: LabeledBatch<B>,
}

/// Result of one phase step.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub loss: f64,
    /// Classifier logits for the full batch; classifier phase only.
    pub logits: Option<Vec<f64>>,
}

/// Run one forward/backward/step for `phase` and return the updated model.
pub fn run_phase<B, OR, OD, OC>(
    phase: Phase,
    mut model: ConfounderFreeModel<B>,
    batches: &EpochBatches<B>,
    optimizers: &mut PhaseOptimizers<OR, OD, OC>,
    lr: f64,
) -> (ConfounderFreeModel<B>, PhaseOutcome)
where
    B: AutodiffBackend,
    OR: Optimizer<Block<B>, B>,
    OD: Optimizer<Block<B>, B>,
    OC: Optimizer<ConfounderFreeModel<B>, B>,
{
    match phase {
        Phase::Regressor => {
            let latent = model.encode(batches.control.features.clone()).detach();
            let predictions = model.predict_confounders(latent);
            let loss = confounder_mse_loss(predictions, batches.control.confounders.clone());
            let value = tensor_to_f64(loss.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &model.regressor);
            model.regressor = optimizers.regressor.step(lr, model.regressor, grads);
            (model, PhaseOutcome { loss: value, logits: None })
        }
        Phase::Distiller => {
            let latent = model.encode(batches.control.features.clone());
            let predictions = model.distill(latent);
            let loss = confounder_mse_loss(predictions, batches.control.confounders.clone());
            let value = tensor_to_f64(loss.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &model.encoder);
            model.encoder = optimizers.distiller.step(lr, model.encoder, grads);
            (model, PhaseOutcome { loss: value, logits: None })
        }
        Phase::Classifier => {
            let logits = model.forward(batches.full.features.clone());
            let host_logits = tensor_to_vec(logits.clone().detach());
            let loss = bce_with_logits_loss(logits, batches.full.labels.clone());
            let value = tensor_to_f64(loss.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            let model = optimizers.classifier.step(lr, model, grads);
            (
                model,
                PhaseOutcome {
                    loss: value,
                    logits: Some(host_logits),
                },
            )
        }
    }
}
