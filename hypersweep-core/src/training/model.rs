//! The model seam: factories build models, models fit on loaders.

use crate::error::SweepError;
use crate::hyperparams::{Device, Hyperparameters, keys};
use crate::training::callbacks::EarlyStopper;
use crate::training::data::DataLoader;
use crate::training::metrics::{FitHistory, Metric};
use crate::wrappers::{Criterion, OptimizerWrapper};
use std::sync::Arc;

/// Everything a model's `fit` receives besides the data.
#[derive(Clone)]
pub struct FitOptions {
    pub criterion: Arc<Criterion>,
    pub optimizer: Arc<OptimizerWrapper>,
    pub num_epochs: usize,
    pub metrics: Vec<Arc<dyn Metric>>,
    pub early_stopper: Option<EarlyStopper>,
    pub seed: Option<u64>,
    pub verbose: bool,
    /// Training hyperparameters not consumed above.
    pub extra: Hyperparameters,
}

impl FitOptions {
    /// Build options from training hyperparameters (which must no longer
    /// carry `batch_size`; that belongs to the loaders).
    ///
    /// Training keys the optimizer accepts (`lr`, `momentum`, ...) override
    /// its partial parameters, so sweeping `lr` changes the learning rate.
    pub fn from_hyperparameters(
        training: &Hyperparameters,
        seed: Option<u64>,
    ) -> Result<Self, SweepError> {
        let criterion = training.criterion()?;
        let optimizer = training.optimizer()?.with_overrides(training);
        let mut extra = training.clone();
        for key in optimizer.accepted_params() {
            extra.remove(key);
        }
        for key in [
            keys::CRITERION,
            keys::OPTIMIZER,
            keys::NUM_EPOCHS,
            keys::METRICS,
            keys::EARLY_STOPPER,
        ] {
            extra.remove(key);
        }
        Ok(Self {
            criterion,
            optimizer: Arc::new(optimizer),
            num_epochs: training.num_epochs()?,
            metrics: training.metrics()?,
            early_stopper: training.early_stopper()?,
            seed,
            verbose: false,
            extra,
        })
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl std::fmt::Debug for FitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitOptions")
            .field("criterion", &self.criterion.name())
            .field("optimizer", &self.optimizer.name())
            .field("num_epochs", &self.num_epochs)
            .field(
                "metrics",
                &self.metrics.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("early_stopper", &self.early_stopper)
            .field("seed", &self.seed)
            .field("extra", &self.extra)
            .finish()
    }
}

/// A trainable model instance.
pub trait Model: Send {
    /// Train on `train`, evaluating on `val` each epoch. The history must
    /// contain the criterion (under its name) and every metric for both
    /// splits.
    fn fit(
        &mut self,
        train: &dyn DataLoader,
        val: &dyn DataLoader,
        options: &FitOptions,
    ) -> Result<FitHistory, SweepError>;

    fn parameter_count(&self) -> usize;
}

/// Builds model instances from model hyperparameters (the "model class").
pub trait ModelFactory: Send + Sync {
    fn name(&self) -> &str;

    /// `params` excludes the `model_class` key itself.
    fn build(
        &self,
        params: &Hyperparameters,
        device: Device,
        seed: Option<u64>,
    ) -> Result<Box<dyn Model>, SweepError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::MeanAbsoluteError;
    use crate::wrappers::{MseLoss, SgdConstructor};

    #[test]
    fn test_fit_options_from_hyperparameters() {
        let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(MeanAbsoluteError)];
        let training = Hyperparameters::new()
            .with("criterion", Criterion::new("mse", MseLoss))
            .with("optimizer", OptimizerWrapper::new(SgdConstructor, "", None).unwrap())
            .with("num_epochs", 4)
            .with("metrics", metrics)
            .with("early_stopper", EarlyStopper::new(2, 0.0))
            .with("tracker_interaction", true);
        let options = FitOptions::from_hyperparameters(&training, Some(3)).unwrap();
        assert_eq!(options.criterion.name(), "mse");
        assert_eq!(options.num_epochs, 4);
        assert_eq!(options.metrics.len(), 1);
        assert_eq!(options.early_stopper, Some(EarlyStopper::new(2, 0.0)));
        assert_eq!(options.seed, Some(3));
        assert_eq!(options.extra.keys().collect::<Vec<_>>(), vec!["tracker_interaction"]);
    }

    #[test]
    fn test_swept_lr_reaches_optimizer() {
        let training = Hyperparameters::new()
            .with("criterion", Criterion::new("mse", MseLoss))
            .with("optimizer", OptimizerWrapper::new(SgdConstructor, "", None).unwrap())
            .with("num_epochs", 1)
            .with("lr", 0.3);
        let options = FitOptions::from_hyperparameters(&training, None).unwrap();
        let opt = options.optimizer.get_optimizer(&[0.0]).unwrap();
        assert_eq!(opt.learning_rate(), 0.3);
        assert!(options.extra.is_empty());
    }

    #[test]
    fn test_fit_options_requires_criterion() {
        let training = Hyperparameters::new().with("num_epochs", 4);
        assert!(matches!(
            FitOptions::from_hyperparameters(&training, None),
            Err(SweepError::MissingHyperparameter(k)) if k == "criterion"
        ));
    }
}
