//! Wrappers around the framework objects a training configuration names.

pub mod criterion;
pub mod optimizer;

pub use criterion::{
    BinaryCrossEntropyLoss, Criterion, FnLoss, L1Loss, LossFunction, MseLoss, MultiHeadCriterion,
    Reduction,
};
pub use optimizer::{AdamConstructor, Optimizer, OptimizerConstructor, OptimizerWrapper, SgdConstructor};
