//! Reduce-on-plateau learning-rate scheduling.
//!
//! One scheduler per optimizer. The trainer reads [`PlateauScheduler::lr`]
//! before each optimizer step and feeds the monitored metric back through
//! [`PlateauScheduler::step`] afterwards.

use serde::{Deserialize, Serialize};

/// Changes in learning rate smaller than this are ignored.
const MIN_LR_CHANGE: f64 = 1e-8;

/// Direction in which the monitored metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateauMode {
    Min,
    Max,
}

/// Scheduler hyperparameters shared by all three optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    /// Relative improvement threshold.
    pub threshold: f64,
    pub min_lr: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 5,
            threshold: 1e-4,
            min_lr: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    mode: PlateauMode,
    config: PlateauConfig,
    lr: f64,
    best: f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(initial_lr: f64, mode: PlateauMode, config: PlateauConfig) -> Self {
        let best = match mode {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        };
        Self {
            mode,
            config,
            lr: initial_lr,
            best,
            bad_epochs: 0,
        }
    }

    /// Current learning rate.
    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    fn is_better(&self, metric: f64) -> bool {
        match self.mode {
            PlateauMode::Min => metric < self.best * (1.0 - self.config.threshold),
            PlateauMode::Max => metric > self.best * (1.0 + self.config.threshold),
        }
    }

    /// Record one epoch's metric. Returns the new learning rate if it was reduced.
    ///
    /// Non-finite metrics never compare as better and so count as bad epochs.
    pub fn step(&mut self, metric: f64) -> Option<f64> {
        if metric.is_finite() && self.is_better(metric) {
            self.best = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs <= self.config.patience {
            return None;
        }
        self.bad_epochs = 0;

        let reduced = (self.lr * self.config.factor).max(self.config.min_lr);
        if self.lr - reduced > MIN_LR_CHANGE {
            tracing::debug!(from = self.lr, to = reduced, "Reducing learning rate on plateau");
            self.lr = reduced;
            Some(reduced)
        } else {
            None
        }
    }
}
