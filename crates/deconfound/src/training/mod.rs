//! Adversarial training: batching, losses, the three optimization phases,
//! plateau scheduling, early stopping and the cross-validation driver.

pub mod data;
pub mod loss;
pub mod metrics;
pub mod phase;
pub mod scheduler;
pub mod stopping;
pub mod trainer;
