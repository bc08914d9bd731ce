//! Gradient reversal: identity on the forward pass, `-grad` on the backward pass.
//!
//! Built from burn primitives so it works on any autodiff backend:
//!
//! ```text
//! y = x̂ - (x - x̂)        where x̂ = x.detach()
//! ```
//!
//! `x - x̂` is exactly zero, so `y` carries the same bits as `x`. Only the
//! `-x` term is on the graph, so `dy/dx = -1`.

use burn::prelude::*;

/// Apply gradient reversal to a tensor of any rank.
pub fn reverse_gradient<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let detached = x.clone().detach();
    detached.clone() - (x - detached)
}
