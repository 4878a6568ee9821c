//! # hypersweep-core: hyperparameter search over training runs
//!
//! Enumerates model/training hyperparameter combinations (an exhaustive grid
//! or de-duplicated random draws), trains one model per combination and seed
//! through injected collaborators, and records timing, loss and metric values
//! in a result table persisted as CSV or JSON.
//!
//! ## Collaborators
//!
//! The harness never trains anything itself. It calls out to:
//! 1. **Models**: a [`training::ModelFactory`] builds a [`training::Model`] that fits
//! 2. **Loaders**: a [`training::DataLoaderBuilder`] turns datasets into batches
//! 3. **Wrappers**: a [`wrappers::Criterion`] and a deferred [`wrappers::OptimizerWrapper`]
//! 4. **Trackers**: an optional [`tracking::ExperimentTracker`] receives each run

// Foundation
pub mod config;
pub mod error;
pub mod float_repr;
pub mod hyperparams;

// Framework objects and training seams
pub mod training;
pub mod wrappers;

// Search and result collection
pub mod results;
pub mod runner;
pub mod search;
pub mod tracking;

// Declarative sweeps
pub mod plan;

// Re-exports
pub use config::{SweepConfig, load_config};
pub use error::SweepError;
pub use hyperparams::{Device, HyperValue, Hyperparameters};
pub use plan::{Registry, Strategy, SweepPlan};
pub use results::{Cell, ResultTable};
pub use runner::SweepRunner;
pub use search::{Combination, RandomSearch, Sampler, SearchSpace};
pub use tracking::{ExperimentTracker, build_tracker};
