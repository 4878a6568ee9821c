//! Deferred optimizer construction.
//!
//! A training configuration names its optimizer before any model exists, so
//! [`OptimizerWrapper`] holds the constructor and its partial parameters and
//! only builds the optimizer once the model's parameters are known.

use crate::error::SweepError;
use crate::hyperparams::Hyperparameters;
use std::fmt;
use std::sync::Arc;

/// A parameter-update algorithm bound to a fixed parameter count.
pub trait Optimizer: Send {
    /// Update `params` in place from `grads`.
    fn step(&mut self, params: &mut [f64], grads: &[f64]) -> Result<(), SweepError>;

    fn learning_rate(&self) -> f64;
}

/// Builds an [`Optimizer`] from partial parameters.
pub trait OptimizerConstructor: Send + Sync {
    /// Name the wrapper derives its display name from (e.g. `"Adam"`).
    fn type_name(&self) -> &str;

    /// Parameter names this constructor understands.
    fn accepted_params(&self) -> &[&'static str];

    fn construct(
        &self,
        num_params: usize,
        params: &Hyperparameters,
    ) -> Result<Box<dyn Optimizer>, SweepError>;
}

/// A named, partially-applied optimizer constructor.
#[derive(Clone)]
pub struct OptimizerWrapper {
    name: String,
    constructor: Arc<dyn OptimizerConstructor>,
    partial_params: Hyperparameters,
}

impl OptimizerWrapper {
    /// The name is the constructor's type name, followed by `identifier` when
    /// it is non-empty. Unknown partial parameters are rejected here rather
    /// than at the first fit.
    pub fn new(
        constructor: impl OptimizerConstructor + 'static,
        identifier: &str,
        partial_params: Option<Hyperparameters>,
    ) -> Result<Self, SweepError> {
        Self::from_arc(Arc::new(constructor), identifier, partial_params)
    }

    pub fn from_arc(
        constructor: Arc<dyn OptimizerConstructor>,
        identifier: &str,
        partial_params: Option<Hyperparameters>,
    ) -> Result<Self, SweepError> {
        let partial_params = partial_params.unwrap_or_default();
        let accepted = constructor.accepted_params();
        if let Some(unknown) = partial_params.keys().find(|k| !accepted.contains(k)) {
            return Err(SweepError::optimizer(format!(
                "{} does not accept parameter '{unknown}'",
                constructor.type_name()
            )));
        }
        let mut name = constructor.type_name().to_string();
        if !identifier.is_empty() {
            name.push(' ');
            name.push_str(identifier);
        }
        Ok(Self {
            name,
            constructor,
            partial_params,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partial_params(&self) -> &Hyperparameters {
        &self.partial_params
    }

    pub fn accepted_params(&self) -> &[&'static str] {
        self.constructor.accepted_params()
    }

    /// A copy whose partial parameters are overridden by every key of
    /// `training` the constructor accepts, e.g. a swept `lr`.
    pub fn with_overrides(&self, training: &Hyperparameters) -> Self {
        let mut bound = self.clone();
        for (key, value) in training.iter() {
            if self.accepted_params().contains(&key) {
                bound.partial_params.insert(key, value.clone());
            }
        }
        bound
    }

    /// Build the optimizer for the given model parameters.
    pub fn get_optimizer(&self, net_params: &[f64]) -> Result<Box<dyn Optimizer>, SweepError> {
        self.constructor
            .construct(net_params.len(), &self.partial_params)
    }
}

impl fmt::Display for OptimizerWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for OptimizerWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerWrapper")
            .field("name", &self.name)
            .field("partial_params", &self.partial_params)
            .finish()
    }
}

fn param_or(params: &Hyperparameters, key: &str, default: f64) -> Result<f64, SweepError> {
    Ok(params.get_f64(key)?.unwrap_or(default))
}

fn check_len(expected: usize, params: &[f64], grads: &[f64]) -> Result<(), SweepError> {
    if params.len() != expected || grads.len() != expected {
        return Err(SweepError::optimizer(format!(
            "optimizer built for {expected} parameters got {} params and {} grads",
            params.len(),
            grads.len()
        )));
    }
    Ok(())
}

/// Stochastic gradient descent with optional momentum and weight decay.
#[derive(Debug, Clone, Copy, Default)]
pub struct SgdConstructor;

impl OptimizerConstructor for SgdConstructor {
    fn type_name(&self) -> &str {
        "SGD"
    }

    fn accepted_params(&self) -> &[&'static str] {
        &["lr", "momentum", "weight_decay"]
    }

    fn construct(
        &self,
        num_params: usize,
        params: &Hyperparameters,
    ) -> Result<Box<dyn Optimizer>, SweepError> {
        let lr = param_or(params, "lr", 0.01)?;
        if lr <= 0.0 {
            return Err(SweepError::optimizer(format!("invalid learning rate {lr}")));
        }
        Ok(Box::new(Sgd {
            lr,
            momentum: param_or(params, "momentum", 0.0)?,
            weight_decay: param_or(params, "weight_decay", 0.0)?,
            velocity: vec![0.0; num_params],
        }))
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    weight_decay: f64,
    velocity: Vec<f64>,
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [f64], grads: &[f64]) -> Result<(), SweepError> {
        check_len(self.velocity.len(), params, grads)?;
        for ((p, g), v) in params.iter_mut().zip(grads).zip(self.velocity.iter_mut()) {
            let g = g + self.weight_decay * *p;
            *v = self.momentum * *v + g;
            *p -= self.lr * *v;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}

/// Adam with bias correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdamConstructor;

impl OptimizerConstructor for AdamConstructor {
    fn type_name(&self) -> &str {
        "Adam"
    }

    fn accepted_params(&self) -> &[&'static str] {
        &["lr", "beta1", "beta2", "eps", "weight_decay"]
    }

    fn construct(
        &self,
        num_params: usize,
        params: &Hyperparameters,
    ) -> Result<Box<dyn Optimizer>, SweepError> {
        let lr = param_or(params, "lr", 0.001)?;
        let beta1 = param_or(params, "beta1", 0.9)?;
        let beta2 = param_or(params, "beta2", 0.999)?;
        if lr <= 0.0 || !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return Err(SweepError::optimizer(format!(
                "invalid Adam settings lr={lr} beta1={beta1} beta2={beta2}"
            )));
        }
        Ok(Box::new(Adam {
            lr,
            beta1,
            beta2,
            eps: param_or(params, "eps", 1e-8)?,
            weight_decay: param_or(params, "weight_decay", 0.0)?,
            m: vec![0.0; num_params],
            v: vec![0.0; num_params],
            t: 0,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [f64], grads: &[f64]) -> Result<(), SweepError> {
        check_len(self.m.len(), params, grads)?;
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
            let g = g + self.weight_decay * *p;
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}
