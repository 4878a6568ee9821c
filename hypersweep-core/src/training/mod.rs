//! Training seams (models, loaders, metrics, callbacks) and a reference model.

pub mod callbacks;
pub mod data;
pub mod metrics;
pub mod model;
pub mod reference;

pub use callbacks::{CallbackAction, DivergenceGuard, EarlyStopper, EarlyStopping, TrainingCallback};
pub use data::{Batch, BatchLoaderBuilder, DataLoader, DataLoaderBuilder, Dataset};
pub use metrics::{
    BinaryAccuracy, FitHistory, HistoryIndex, MeanAbsoluteError, Metric, RootMeanSquaredError,
    Split,
};
pub use model::{FitOptions, Model, ModelFactory};
pub use reference::{LinearRegressor, LinearRegressorFactory, SyntheticRegression};
