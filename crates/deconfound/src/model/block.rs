//! Feed-forward blocks built from explicit layer descriptors.
//!
//! Each builder returns a `Vec<LayerSpec>`: one descriptor per affine layer,
//! recording whether it is followed by batch normalization and the
//! activation. [`BlockConfig::init`] walks that list to create and initialize
//! every layer, so there is no runtime introspection of module types.
//!
//! ```text
//! encoder:    in → p2(in) → p2/2 → … (num_layers halvings) → latent   [all: affine, BN, act]
//! regressor:  latent → latent/2 → … (num_layers halvings)             [affine, BN, act]
//!             → n_confounders                                          [affine only]
//! classifier: latent → … → 1 logit                                     [same as regressor]
//! ```

use std::fmt;

use burn::module::Ignored;
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::affine::{Affine, AffineConfig};

/// Nonlinearity applied after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Silu,
    Relu,
    Gelu,
    Tanh,
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silu => write!(f, "silu"),
            Self::Relu => write!(f, "relu"),
            Self::Gelu => write!(f, "gelu"),
            Self::Tanh => write!(f, "tanh"),
        }
    }
}

impl std::str::FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silu" | "swish" => Ok(Self::Silu),
            "relu" => Ok(Self::Relu),
            "gelu" => Ok(Self::Gelu),
            "tanh" => Ok(Self::Tanh),
            other => Err(format!("unknown activation `{other}`")),
        }
    }
}

impl Activation {
    pub fn apply<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        use burn::tensor::activation;
        match self {
            Self::Silu => activation::silu(x),
            Self::Relu => activation::relu(x),
            Self::Gelu => activation::gelu(x),
            Self::Tanh => activation::tanh(x),
        }
    }
}

/// Descriptor for one affine layer and what follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub d_input: usize,
    pub d_output: usize,
    /// Batch normalization after the affine map.
    pub normalize: bool,
    /// Activation after normalization.
    pub activate: bool,
}

impl LayerSpec {
    /// Affine → BatchNorm → activation.
    pub fn hidden(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            normalize: true,
            activate: true,
        }
    }

    /// Bare affine projection.
    pub fn projection(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            normalize: false,
            activate: false,
        }
    }
}

/// Greatest power of two less than or equal to `n` (1 for `n <= 1`).
pub fn previous_power_of_two(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Encoder schedule: `input → p2(input)`, `num_layers` halvings, then `→ latent`.
pub fn encoder_specs(input_dim: usize, latent_dim: usize, num_layers: usize) -> Vec<LayerSpec> {
    let first = previous_power_of_two(input_dim);
    let mut specs = vec![LayerSpec::hidden(input_dim, first)];
    let mut current = first;
    for _ in 0..num_layers {
        let next = (current / 2).max(1);
        specs.push(LayerSpec::hidden(current, next));
        current = next;
    }
    specs.push(LayerSpec::hidden(current, latent_dim));
    specs
}

/// Head schedule from the latent width: `num_layers` halvings, then a bare
/// projection to `d_output`.
pub fn head_specs(latent_dim: usize, num_layers: usize, d_output: usize) -> Vec<LayerSpec> {
    let mut specs = Vec::with_capacity(num_layers + 1);
    let mut current = latent_dim;
    for _ in 0..num_layers {
        let next = (current / 2).max(1);
        specs.push(LayerSpec::hidden(current, next));
        current = next;
    }
    specs.push(LayerSpec::projection(current, d_output));
    specs
}

/// Configuration for a [`Block`].
#[derive(Debug, Clone)]
pub struct BlockConfig {
    pub specs: Vec<LayerSpec>,
    pub activation: Activation,
    pub bn_epsilon: f64,
    pub bn_momentum: f64,
}

impl BlockConfig {
    pub fn new(specs: Vec<LayerSpec>, activation: Activation) -> Self {
        Self {
            specs,
            activation,
            bn_epsilon: 1e-5,
            bn_momentum: 0.1,
        }
    }

    pub fn with_batch_norm(mut self, epsilon: f64, momentum: f64) -> Self {
        self.bn_epsilon = epsilon;
        self.bn_momentum = momentum;
        self
    }

    /// Create every layer named by the descriptors.
    ///
    /// Affine layers get Kaiming-normal weights and zero bias; batch norm
    /// starts at scale 1, shift 0.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Block<B> {
        let stages = self
            .specs
            .iter()
            .map(|spec| Stage {
                affine: AffineConfig::new(spec.d_input, spec.d_output).init(device),
                norm: spec.normalize.then(|| {
                    BatchNormConfig::new(spec.d_output)
                        .with_epsilon(self.bn_epsilon)
                        .with_momentum(self.bn_momentum)
                        .init(device)
                }),
                activation: spec.activate.then_some(Ignored(self.activation)),
            })
            .collect();

        Block { stages }
    }
}

/// One affine layer with optional normalization and activation.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    pub(crate) affine: Affine<B>,
    pub(crate) norm: Option<BatchNorm<B, 0>>,
    activation: Option<Ignored<Activation>>,
}

/// A feed-forward stack of [`Stage`]s.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub(crate) stages: Vec<Stage<B>>,
}

impl<B: Backend> Block<B> {
    /// Input shape `(batch, d_input)`, output `(batch, d_output)`.
    ///
    /// Batch normalization uses batch statistics on an autodiff backend and
    /// running statistics otherwise, so call through `valid()` to evaluate.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.stages.iter().fold(input, |x, stage| {
            let x = stage.affine.forward(x);
            let x = match &stage.norm {
                Some(norm) => norm.forward(x),
                None => x,
            };
            match &stage.activation {
                Some(activation) => activation.apply(x),
                None => x,
            }
        })
    }

    /// Output width of the last stage.
    pub fn d_output(&self) -> usize {
        self.stages.last().map(|s| s.affine.dims()[0]).unwrap_or(0)
    }

    /// Per-stage `(d_input, d_output)` pairs.
    pub fn widths(&self) -> Vec<(usize, usize)> {
        self.stages
            .iter()
            .map(|s| {
                let [d_out, d_in] = s.affine.dims();
                (d_in, d_out)
            })
            .collect()
    }
}
