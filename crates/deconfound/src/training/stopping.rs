/// Patience-based early stopping on training balanced accuracy.
///
/// The best value starts at 0. A strictly better value resets the counter;
/// anything else increments it. [`EarlyStopping::update`] reports `true` once
/// the counter reaches `patience`.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    best: f64,
    counter: usize,
    patience: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            best: 0.0,
            counter: 0,
            patience,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Record one epoch's metric. Returns `true` when training should stop.
    pub fn update(&mut self, metric: f64) -> bool {
        if metric > self.best {
            self.best = metric;
            self.counter = 0;
        } else {
            self.counter += 1;
        }
        self.counter >= self.patience
    }
}
