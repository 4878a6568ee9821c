//! Datasets and the data-loader seam.
//!
//! The search loop never batches data itself: it asks an injected
//! [`DataLoaderBuilder`] for one loader per split and combination, and hands
//! those loaders to the model's `fit`.

use crate::error::SweepError;
use crate::hyperparams::{Device, HyperValue, Hyperparameters, keys};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Input rows paired with target rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn new(inputs: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> Result<Self, SweepError> {
        if inputs.len() != targets.len() {
            return Err(SweepError::data_loader(format!(
                "{} input rows but {} target rows",
                inputs.len(),
                targets.len()
            )));
        }
        check_width("input", &inputs)?;
        check_width("target", &targets)?;
        Ok(Self { inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.inputs.first().map_or(0, Vec::len)
    }

    pub fn target_dim(&self) -> usize {
        self.targets.first().map_or(0, Vec::len)
    }

    pub fn inputs(&self) -> &[Vec<f64>] {
        &self.inputs
    }

    pub fn targets(&self) -> &[Vec<f64>] {
        &self.targets
    }

    /// Split off the last `fraction` of rows, e.g. for a validation set.
    pub fn split(self, fraction: f64) -> Result<(Dataset, Dataset), SweepError> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(SweepError::invalid_input(format!(
                "split fraction {fraction} must be in [0, 1)"
            )));
        }
        let tail = ((self.len() as f64) * fraction).round() as usize;
        let head = self.len() - tail;
        let mut inputs = self.inputs;
        let mut targets = self.targets;
        let tail_inputs = inputs.split_off(head);
        let tail_targets = targets.split_off(head);
        Ok((
            Dataset { inputs, targets },
            Dataset {
                inputs: tail_inputs,
                targets: tail_targets,
            },
        ))
    }
}

fn check_width(what: &str, rows: &[Vec<f64>]) -> Result<(), SweepError> {
    if let Some(first) = rows.first() {
        if let Some(bad) = rows.iter().position(|r| r.len() != first.len()) {
            return Err(SweepError::data_loader(format!(
                "{what} row {bad} has {} columns, expected {}",
                rows[bad].len(),
                first.len()
            )));
        }
    }
    Ok(())
}

/// One mini-batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<Vec<f64>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Yields mini-batches of a dataset for a given epoch.
pub trait DataLoader: Send + Sync {
    /// Batches for `epoch`. Shuffling loaders derive their order from `seed`
    /// and `epoch`, so a seeded fit is reproducible.
    fn batches(&self, epoch: usize, seed: Option<u64>) -> Vec<Batch>;

    fn num_samples(&self) -> usize;

    fn device(&self) -> Device;

    /// The whole split as a single batch, in order.
    fn full(&self) -> Batch;
}

/// Strategy that builds loaders from hyperparameters.
pub trait DataLoaderBuilder: Send + Sync {
    /// Extra parameters [`DataLoaderBuilder::create`] reads, beyond the data,
    /// the shuffle flag and the device.
    fn parameter_names(&self) -> Vec<String>;

    /// Value for a parameter the hyperparameters don't carry.
    fn derive_parameter(
        &self,
        name: &str,
        _hyperparameters: &Hyperparameters,
    ) -> Result<HyperValue, SweepError> {
        Err(SweepError::missing(name))
    }

    fn create(
        &self,
        data: Arc<Dataset>,
        shuffle: bool,
        device: Device,
        params: &Hyperparameters,
    ) -> Result<Arc<dyn DataLoader>, SweepError>;

    /// Resolve every parameter in [`DataLoaderBuilder::parameter_names`] from
    /// `hyperparameters`, falling back to [`DataLoaderBuilder::derive_parameter`].
    fn resolve_parameters(
        &self,
        hyperparameters: &Hyperparameters,
    ) -> Result<Hyperparameters, SweepError> {
        let mut resolved = Hyperparameters::new();
        for name in self.parameter_names() {
            let value = match hyperparameters.get(&name) {
                Some(v) => v.clone(),
                None => self.derive_parameter(&name, hyperparameters)?,
            };
            resolved.insert(name, value);
        }
        Ok(resolved)
    }
}

/// Fixed-size mini-batches with optional per-epoch shuffling.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchLoaderBuilder;

const DROP_LAST: &str = "drop_last";

impl DataLoaderBuilder for BatchLoaderBuilder {
    fn parameter_names(&self) -> Vec<String> {
        vec![keys::BATCH_SIZE.to_string(), DROP_LAST.to_string()]
    }

    fn derive_parameter(
        &self,
        name: &str,
        _hyperparameters: &Hyperparameters,
    ) -> Result<HyperValue, SweepError> {
        match name {
            DROP_LAST => Ok(HyperValue::Bool(false)),
            other => Err(SweepError::missing(other)),
        }
    }

    fn create(
        &self,
        data: Arc<Dataset>,
        shuffle: bool,
        device: Device,
        params: &Hyperparameters,
    ) -> Result<Arc<dyn DataLoader>, SweepError> {
        let batch_size = params.batch_size()?;
        if batch_size == 0 {
            return Err(SweepError::data_loader("batch_size must be positive"));
        }
        Ok(Arc::new(BatchLoader {
            data,
            batch_size,
            shuffle,
            drop_last: params.get_bool(DROP_LAST)?.unwrap_or(false),
            device,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct BatchLoader {
    data: Arc<Dataset>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    device: Device,
}

impl BatchLoader {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn order(&self, epoch: usize, seed: Option<u64>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.data.len()).collect();
        if self.shuffle {
            match seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
                    order.shuffle(&mut rng);
                }
                None => order.shuffle(&mut rand::thread_rng()),
            }
        }
        order
    }
}

impl DataLoader for BatchLoader {
    fn batches(&self, epoch: usize, seed: Option<u64>) -> Vec<Batch> {
        let order = self.order(epoch, seed);
        order
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(|chunk| Batch {
                inputs: chunk.iter().map(|&i| self.data.inputs[i].clone()).collect(),
                targets: chunk.iter().map(|&i| self.data.targets[i].clone()).collect(),
            })
            .collect()
    }

    fn num_samples(&self) -> usize {
        self.data.len()
    }

    fn device(&self) -> Device {
        self.device
    }

    fn full(&self) -> Batch {
        Batch {
            inputs: self.data.inputs.clone(),
            targets: self.data.targets.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Arc<Dataset> {
        let inputs = (0..n).map(|i| vec![i as f64]).collect();
        let targets = (0..n).map(|i| vec![2.0 * i as f64]).collect();
        Arc::new(Dataset::new(inputs, targets).unwrap())
    }

    #[test]
    fn test_dataset_validation() {
        assert!(Dataset::new(vec![vec![1.0]], vec![]).is_err());
        assert!(Dataset::new(vec![vec![1.0], vec![1.0, 2.0]], vec![vec![0.0], vec![0.0]]).is_err());
        let ds = dataset(4);
        assert_eq!(ds.input_dim(), 1);
        assert_eq!(ds.target_dim(), 1);
    }

    #[test]
    fn test_dataset_split() {
        let ds = Arc::try_unwrap(dataset(8)).unwrap();
        let (train, val) = ds.split(0.25).unwrap();
        assert_eq!(train.len(), 6);
        assert_eq!(val.len(), 2);
        assert_eq!(val.inputs()[0], vec![6.0]);
    }

    #[test]
    fn test_resolve_parameters_falls_back_to_derived() {
        let params = Hyperparameters::new().with("batch_size", 3).with("lr", 0.1);
        let resolved = BatchLoaderBuilder.resolve_parameters(&params).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get("drop_last"), Some(&HyperValue::Bool(false)));
        assert!(!resolved.contains("lr"));

        let missing = BatchLoaderBuilder.resolve_parameters(&Hyperparameters::new());
        assert!(matches!(missing, Err(SweepError::MissingHyperparameter(k)) if k == "batch_size"));
    }

    #[test]
    fn test_batches_cover_dataset() {
        let params = Hyperparameters::new().with("batch_size", 3);
        let loader = BatchLoaderBuilder
            .create(dataset(7), false, Device::Cpu, &params)
            .unwrap();
        let batches = loader.batches(0, None);
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(batches[0].inputs[0], vec![0.0]);
        assert_eq!(loader.full().len(), 7);
    }

    #[test]
    fn test_drop_last() {
        let params = Hyperparameters::new().with("batch_size", 3).with("drop_last", true);
        let loader = BatchLoaderBuilder
            .create(dataset(7), false, Device::Cpu, &params)
            .unwrap();
        assert_eq!(loader.batches(0, None).len(), 2);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let params = Hyperparameters::new().with("batch_size", 50);
        let loader = BatchLoaderBuilder
            .create(dataset(50), true, Device::Cpu, &params)
            .unwrap();
        let a = loader.batches(0, Some(7));
        let b = loader.batches(0, Some(7));
        let c = loader.batches(1, Some(7));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let params = Hyperparameters::new().with("batch_size", 0);
        assert!(BatchLoaderBuilder
            .create(dataset(2), false, Device::Cpu, &params)
            .is_err());
    }
}
