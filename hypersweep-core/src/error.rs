//! Error types for the hypersweep-core crate.

use thiserror::Error;

/// Top-level error type for search and result-collection operations.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Missing hyperparameter: {0}")]
    MissingHyperparameter(String),

    #[error("Hyperparameter '{key}' has the wrong type: expected {expected}")]
    HyperparameterType { key: String, expected: &'static str },

    #[error("Loss error: {0}")]
    Loss(String),

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Data loader error: {0}")]
    DataLoader(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Metric '{metric}' has no {split} history")]
    MissingHistory { metric: String, split: String },

    #[error("Search space exhausted: requested {requested} distinct combinations, found {found}")]
    SearchSpaceExhausted { requested: usize, found: usize },

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SweepError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingHyperparameter(key.into())
    }

    pub fn loss(msg: impl Into<String>) -> Self {
        Self::Loss(msg.into())
    }

    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::Optimizer(msg.into())
    }

    pub fn data_loader(msg: impl Into<String>) -> Self {
        Self::DataLoader(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn tracker(msg: impl Into<String>) -> Self {
        Self::Tracker(msg.into())
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
