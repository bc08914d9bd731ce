//! Model components: Kaiming-initialized affine layers, descriptor-driven
//! feed-forward blocks, gradient reversal, the three-headed confounder-free
//! network, and the host ↔ tensor bridge.

pub mod affine;
pub mod block;
pub mod bridge;
pub mod grl;
pub mod network;

pub use block::Activation;
pub use network::{ConfounderFreeConfig, ConfounderFreeModel};
