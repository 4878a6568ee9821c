//! A small linear regressor that exercises the harness end to end.
//!
//! It trains by mini-batch gradient descent entirely through the injected
//! collaborators: the criterion supplies gradients, the optimizer wrapper
//! supplies the update rule and the loaders supply batches.

use crate::error::SweepError;
use crate::hyperparams::{Device, Hyperparameters};
use crate::training::callbacks::{CallbackAction, DivergenceGuard, TrainingCallback};
use crate::training::data::{Batch, DataLoader, Dataset};
use crate::training::metrics::{FitHistory, Split};
use crate::training::model::{FitOptions, Model, ModelFactory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fully-connected linear layer, `y = W x + b`.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    input_dim: usize,
    output_dim: usize,
    /// Row-major weights followed by the biases.
    params: Vec<f64>,
}

impl LinearRegressor {
    pub fn new(input_dim: usize, output_dim: usize, init_scale: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n_weights = input_dim * output_dim;
        let mut params = Vec::with_capacity(n_weights + output_dim);
        for _ in 0..n_weights {
            params.push(if init_scale > 0.0 {
                rng.gen_range(-init_scale..init_scale)
            } else {
                0.0
            });
        }
        params.extend(std::iter::repeat_n(0.0, output_dim));
        Self {
            input_dim,
            output_dim,
            params,
        }
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    fn weight(&self, out: usize, inp: usize) -> f64 {
        self.params[out * self.input_dim + inp]
    }

    fn bias(&self, out: usize) -> f64 {
        self.params[self.input_dim * self.output_dim + out]
    }

    /// Flattened predictions for every row of `batch`.
    pub fn predict(&self, batch: &Batch) -> Result<Vec<f64>, SweepError> {
        let mut out = Vec::with_capacity(batch.len() * self.output_dim);
        for row in &batch.inputs {
            if row.len() != self.input_dim {
                return Err(SweepError::model(format!(
                    "input row has {} features, model expects {}",
                    row.len(),
                    self.input_dim
                )));
            }
            for o in 0..self.output_dim {
                let dot: f64 = row
                    .iter()
                    .enumerate()
                    .map(|(j, x)| self.weight(o, j) * x)
                    .sum();
                out.push(dot + self.bias(o));
            }
        }
        Ok(out)
    }

    fn flat_targets(&self, batch: &Batch) -> Result<Vec<f64>, SweepError> {
        let mut flat = Vec::with_capacity(batch.len() * self.output_dim);
        for row in &batch.targets {
            if row.len() != self.output_dim {
                return Err(SweepError::model(format!(
                    "target row has {} values, model outputs {}",
                    row.len(),
                    self.output_dim
                )));
            }
            flat.extend_from_slice(row);
        }
        Ok(flat)
    }

    fn gradients(&self, batch: &Batch, dpred: &[f64]) -> Vec<f64> {
        let n_weights = self.input_dim * self.output_dim;
        let mut grads = vec![0.0; self.params.len()];
        for (r, row) in batch.inputs.iter().enumerate() {
            for o in 0..self.output_dim {
                let g = dpred[r * self.output_dim + o];
                for (j, x) in row.iter().enumerate() {
                    grads[o * self.input_dim + j] += g * x;
                }
                grads[n_weights + o] += g;
            }
        }
        grads
    }

    fn evaluate(
        &self,
        loader: &dyn DataLoader,
        split: Split,
        options: &FitOptions,
        history: &mut FitHistory,
    ) -> Result<(), SweepError> {
        let batch = loader.full();
        let predicted = self.predict(&batch)?;
        let target = self.flat_targets(&batch)?;
        history.record(
            split,
            options.criterion.name(),
            options.criterion.loss(&predicted, &target)?,
        );
        for metric in &options.metrics {
            history.record(split, metric.name(), metric.compute(&predicted, &target)?);
        }
        Ok(())
    }
}

impl Model for LinearRegressor {
    fn fit(
        &mut self,
        train: &dyn DataLoader,
        val: &dyn DataLoader,
        options: &FitOptions,
    ) -> Result<FitHistory, SweepError> {
        let mut optimizer = options.optimizer.get_optimizer(&self.params)?;
        let monitor = options.criterion.name();
        let mut callbacks: Vec<Box<dyn TrainingCallback>> =
            vec![Box::new(DivergenceGuard::new(Split::Train, monitor))];
        if let Some(stopper) = &options.early_stopper {
            callbacks.push(Box::new(stopper.tracker(Split::Val, monitor)));
        }

        let mut history = FitHistory::new();
        for epoch in 0..options.num_epochs {
            for batch in train.batches(epoch, options.seed) {
                if batch.is_empty() {
                    continue;
                }
                let predicted = self.predict(&batch)?;
                let target = self.flat_targets(&batch)?;
                let dpred = options.criterion.gradient(&predicted, &target)?;
                let grads = self.gradients(&batch, &dpred);
                optimizer.step(&mut self.params, &grads)?;
            }

            self.evaluate(train, Split::Train, options, &mut history)?;
            self.evaluate(val, Split::Val, options, &mut history)?;
            history.end_epoch();

            if options.verbose {
                debug!(epoch, values = ?history.epoch_values(epoch), "Epoch finished");
            }

            let mut stop = false;
            for callback in callbacks.iter_mut() {
                if callback.on_epoch_end(epoch, &history) == CallbackAction::Stop {
                    stop = true;
                }
            }
            if stop {
                history.stopped_early = true;
                break;
            }
        }
        Ok(history)
    }

    fn parameter_count(&self) -> usize {
        self.params.len()
    }
}

/// Factory for [`LinearRegressor`], registered as `"linear"`.
///
/// Reads `input_dim` (required), `output_dim` (default 1) and `init_scale`
/// (default 0.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressorFactory;

impl ModelFactory for LinearRegressorFactory {
    fn name(&self) -> &str {
        "linear"
    }

    fn build(
        &self,
        params: &Hyperparameters,
        device: Device,
        seed: Option<u64>,
    ) -> Result<Box<dyn Model>, SweepError> {
        if device != Device::Cpu {
            return Err(SweepError::model(format!(
                "linear regressor cannot run on {device}"
            )));
        }
        let input_dim = params
            .get_usize("input_dim")?
            .ok_or_else(|| SweepError::missing("input_dim"))?;
        let output_dim = params.get_usize("output_dim")?.unwrap_or(1);
        let init_scale = params.get_f64("init_scale")?.unwrap_or(0.1);
        if input_dim == 0 || output_dim == 0 {
            return Err(SweepError::model("linear regressor needs non-zero dimensions"));
        }
        Ok(Box::new(LinearRegressor::new(
            input_dim, output_dim, init_scale, seed,
        )))
    }
}

/// Settings for a synthetic linear-regression dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRegression {
    #[serde(default = "default_samples")]
    pub n_samples: usize,
    #[serde(default = "default_features")]
    pub n_features: usize,
    #[serde(default = "default_noise")]
    pub noise: f64,
    #[serde(default)]
    pub seed: u64,
    /// Fraction of rows held out for validation.
    #[serde(default = "default_val_fraction")]
    pub val_fraction: f64,
}

impl Default for SyntheticRegression {
    fn default() -> Self {
        Self {
            n_samples: default_samples(),
            n_features: default_features(),
            noise: default_noise(),
            seed: 0,
            val_fraction: default_val_fraction(),
        }
    }
}

fn default_samples() -> usize {
    256
}

fn default_features() -> usize {
    4
}

fn default_noise() -> f64 {
    0.1
}

fn default_val_fraction() -> f64 {
    0.25
}

impl SyntheticRegression {
    /// `y = w . x + b + noise` with weights drawn from the seed.
    pub fn generate(&self) -> Result<Dataset, SweepError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let weights: Vec<f64> = (0..self.n_features)
            .map(|_| rng.gen_range(-2.0..2.0))
            .collect();
        let bias = rng.gen_range(-1.0..1.0);
        let mut inputs = Vec::with_capacity(self.n_samples);
        let mut targets = Vec::with_capacity(self.n_samples);
        for _ in 0..self.n_samples {
            let x: Vec<f64> = (0..self.n_features)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect();
            let noise = if self.noise > 0.0 {
                rng.gen_range(-self.noise..self.noise)
            } else {
                0.0
            };
            let y = x.iter().zip(&weights).map(|(a, b)| a * b).sum::<f64>() + bias + noise;
            inputs.push(x);
            targets.push(vec![y]);
        }
        Dataset::new(inputs, targets)
    }

    /// Generate and split into `(train, val)`.
    pub fn train_val(&self) -> Result<(Dataset, Dataset), SweepError> {
        self.generate()?.split(self.val_fraction)
    }
}
