//! Combination enumeration: exhaustive grids and de-duplicated random draws.

pub mod grid;
pub mod random;

use crate::hyperparams::Hyperparameters;
use std::fmt;

pub use grid::grid_combinations;
pub use random::{RandomSearch, Sampler, SearchSpace};

/// One training/model hyperparameter pair to train and record.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub index: usize,
    pub training: Hyperparameters,
    pub model: Hyperparameters,
}

impl Combination {
    /// Training merged with model hyperparameters; model keys win.
    pub fn total(&self) -> Hyperparameters {
        self.training.merge(&self.model)
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} training={} model={}",
            self.index, self.training, self.model
        )
    }
}
