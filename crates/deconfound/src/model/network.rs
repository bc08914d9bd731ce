use burn::prelude::*;

use crate::model::block::{encoder_specs, head_specs, Activation, Block, BlockConfig};
use crate::model::grl::reverse_gradient;

/// Architecture hyperparameters for the confounder-free model.
///
/// ```text
/// x ─ encoder ─ z ─┬─ classifier ─────────────→ disease logit (batch, 1)
///                  ├─ regressor ──────────────→ confounders (batch, n_confounders)
///                  └─ GRL ─ regressor ────────→ confounders, reversed gradient into encoder
/// ```
#[derive(Config, Debug)]
pub struct ConfounderFreeConfig {
    /// Number of input features (taxa).
    pub input_dim: usize,
    /// Number of confounders predicted by the regressor.
    pub n_confounders: usize,
    /// Width of the shared latent bottleneck.
    #[config(default = 64)]
    pub latent_dim: usize,
    /// Number of width-halving hidden layers in each sub-network.
    #[config(default = 1)]
    pub num_layers: usize,
    /// Activation after every batch norm.
    #[config(default = "Activation::Silu")]
    pub activation: Activation,
    #[config(default = 1e-5)]
    pub bn_epsilon: f64,
    #[config(default = 0.1)]
    pub bn_momentum: f64,
}

/// Shared encoder plus confounder regressor and disease classifier.
#[derive(Module, Debug)]
pub struct ConfounderFreeModel<B: Backend> {
    pub encoder: Block<B>,
    pub regressor: Block<B>,
    pub classifier: Block<B>,
}

impl ConfounderFreeConfig {
    fn block(&self, specs: Vec<crate::model::block::LayerSpec>) -> BlockConfig {
        BlockConfig::new(specs, self.activation).with_batch_norm(self.bn_epsilon, self.bn_momentum)
    }

    pub fn encoder_config(&self) -> BlockConfig {
        self.block(encoder_specs(self.input_dim, self.latent_dim, self.num_layers))
    }

    pub fn regressor_config(&self) -> BlockConfig {
        self.block(head_specs(self.latent_dim, self.num_layers, self.n_confounders))
    }

    pub fn classifier_config(&self) -> BlockConfig {
        self.block(head_specs(self.latent_dim, self.num_layers, 1))
    }

    /// Build a freshly initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConfounderFreeModel<B> {
        ConfounderFreeModel {
            encoder: self.encoder_config().init(device),
            regressor: self.regressor_config().init(device),
            classifier: self.classifier_config().init(device),
        }
    }
}

impl<B: Backend> ConfounderFreeModel<B> {
    /// Latent encoding, shape `(batch, latent_dim)`.
    pub fn encode(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.encoder.forward(x)
    }

    /// Confounder predictions from a latent batch, shape `(batch, n_confounders)`.
    pub fn predict_confounders(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        self.regressor.forward(z)
    }

    /// Confounder predictions with the gradient into `z` reversed.
    pub fn distill(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        self.regressor.forward(reverse_gradient(z))
    }

    /// One disease logit per sample, shape `(batch,)`.
    pub fn disease_logits(&self, z: Tensor<B, 2>) -> Tensor<B, 1> {
        self.classifier.forward(z).squeeze::<1>(1)
    }

    /// Encoder followed by the classifier.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        self.disease_logits(self.encode(x))
    }
}
