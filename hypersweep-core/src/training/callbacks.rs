//! Training callbacks: early stopping and divergence detection.

use crate::training::metrics::{FitHistory, Split};
use serde::{Deserialize, Serialize};

/// Action a callback can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Trait for per-epoch training callbacks.
pub trait TrainingCallback: Send {
    /// Called after epoch `epoch` has been recorded in `history`.
    fn on_epoch_end(&mut self, epoch: usize, history: &FitHistory) -> CallbackAction;
}

/// Early-stopping settings, carried as a training hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopper {
    pub patience: usize,
    #[serde(default)]
    pub min_delta: f64,
}

impl EarlyStopper {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
        }
    }

    /// Fresh stopping state watching `monitor` on `split`.
    pub fn tracker(&self, split: Split, monitor: impl Into<String>) -> EarlyStopping {
        EarlyStopping {
            patience: self.patience,
            min_delta: self.min_delta,
            split,
            monitor: monitor.into(),
            counter: 0,
            best_loss: None,
        }
    }
}

/// Stateful early stopping for a single fit.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    split: Split,
    monitor: String,
    counter: usize,
    best_loss: Option<f64>,
}

impl EarlyStopping {
    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        match self.best_loss {
            None => {
                self.best_loss = Some(loss);
                CallbackAction::Continue
            }
            Some(best) => {
                if loss < best - self.min_delta {
                    self.best_loss = Some(loss);
                    self.counter = 0;
                    CallbackAction::Continue
                } else {
                    self.counter += 1;
                    if self.counter >= self.patience {
                        CallbackAction::Stop
                    } else {
                        CallbackAction::Continue
                    }
                }
            }
        }
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_loss
    }
}

impl TrainingCallback for EarlyStopping {
    fn on_epoch_end(&mut self, _epoch: usize, history: &FitHistory) -> CallbackAction {
        let loss = history
            .series(self.split, &self.monitor)
            .and_then(|s| s.last().copied())
            .unwrap_or(f64::MAX);
        self.observe(loss)
    }
}

/// Stops a fit whose monitored loss becomes NaN or infinite.
#[derive(Debug, Clone)]
pub struct DivergenceGuard {
    split: Split,
    monitor: String,
}

impl DivergenceGuard {
    pub fn new(split: Split, monitor: impl Into<String>) -> Self {
        Self {
            split,
            monitor: monitor.into(),
        }
    }
}

impl TrainingCallback for DivergenceGuard {
    fn on_epoch_end(&mut self, _epoch: usize, history: &FitHistory) -> CallbackAction {
        match history.series(self.split, &self.monitor).and_then(|s| s.last()) {
            Some(loss) if !loss.is_finite() => CallbackAction::Stop,
            _ => CallbackAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping() {
        let mut cb = EarlyStopper::new(3, 0.01).tracker(Split::Val, "loss");
        assert_eq!(cb.observe(0.5), CallbackAction::Continue); // first: sets best=0.5
        assert_eq!(cb.observe(0.4), CallbackAction::Continue); // improves: best=0.4, counter=0
        assert_eq!(cb.observe(0.4), CallbackAction::Continue); // counter=1
        assert_eq!(cb.observe(0.4), CallbackAction::Continue); // counter=2
        assert_eq!(cb.observe(0.4), CallbackAction::Stop); // counter=3 >= patience
        assert_eq!(cb.best_loss(), Some(0.4));
    }

    #[test]
    fn test_early_stopping_reads_history() {
        let mut cb = EarlyStopper::new(1, 0.0).tracker(Split::Val, "loss");
        let mut history = FitHistory::new();
        history.record(Split::Val, "loss", 1.0);
        assert_eq!(cb.on_epoch_end(0, &history), CallbackAction::Continue);
        history.record(Split::Val, "loss", 1.5);
        assert_eq!(cb.on_epoch_end(1, &history), CallbackAction::Stop);
    }

    #[test]
    fn test_divergence_guard_nan() {
        let mut guard = DivergenceGuard::new(Split::Train, "loss");
        let mut history = FitHistory::new();
        history.record(Split::Train, "loss", 0.3);
        assert_eq!(guard.on_epoch_end(0, &history), CallbackAction::Continue);
        history.record(Split::Train, "loss", f64::NAN);
        assert_eq!(guard.on_epoch_end(1, &history), CallbackAction::Stop);
    }
}
