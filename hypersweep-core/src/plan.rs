//! Declarative sweeps loaded from TOML.
//!
//! A plan names its objects (`criterion = "mse"`, `model_class = "linear"`)
//! and a [`Registry`] turns those names into the framework objects the
//! runner needs. For example:
//!
//! ```toml
//! strategy = "random"
//! keys_to_save = ["lr", "batch_size"]
//! n_run = 8
//!
//! [data]
//! n_samples = 512
//!
//! [model_space]
//! model_class = "linear"
//!
//! [training_space]
//! criterion = "mse"
//! optimizer = { kind = "sgd", params = { momentum = 0.9 } }
//! num_epochs = 20
//! metrics = ["mae"]
//! # Bound into the optimizer's parameters.
//! lr = { log_uniform = [1e-4, 1e-1] }
//! batch_size = { choice = [16, 32, 64] }
//! ```

use crate::config::RandomConfig;
use crate::error::SweepError;
use crate::hyperparams::{HyperValue, Hyperparameters, keys};
use crate::search::{Combination, RandomSearch, Sampler, SearchSpace, grid_combinations};
use crate::training::{
    BinaryAccuracy, Dataset, EarlyStopper, LinearRegressorFactory, MeanAbsoluteError, Metric,
    ModelFactory, RootMeanSquaredError, SyntheticRegression,
};
use crate::wrappers::{
    AdamConstructor, BinaryCrossEntropyLoss, Criterion, L1Loss, LossFunction, MseLoss,
    OptimizerConstructor, OptimizerWrapper, Reduction, SgdConstructor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use toml::{Table, Value};

/// Model hyperparameter filled in from the dataset when a plan omits it.
const INPUT_DIM: &str = "input_dim";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Grid,
    Random,
}

/// A sweep described in TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SweepPlan {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub keys_to_save: Vec<String>,
    /// Number of sampled combinations for the random strategy.
    #[serde(default)]
    pub n_run: usize,
    #[serde(default)]
    pub data: SyntheticRegression,
    #[serde(default)]
    pub model: Vec<Table>,
    #[serde(default)]
    pub training: Vec<Table>,
    #[serde(default)]
    pub model_space: Table,
    #[serde(default)]
    pub training_space: Table,
}

impl SweepPlan {
    pub fn from_toml_str(text: &str) -> Result<Self, SweepError> {
        let plan: Self = toml::from_str(text)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        match self.strategy {
            Strategy::Grid => {
                if self.model.is_empty() || self.training.is_empty() {
                    return Err(SweepError::plan(
                        "grid plans need at least one [[model]] and one [[training]] table",
                    ));
                }
            }
            Strategy::Random => {
                if self.n_run == 0 {
                    return Err(SweepError::plan("random plans need n_run > 0"));
                }
                if self.model_space.is_empty() || self.training_space.is_empty() {
                    return Err(SweepError::plan(
                        "random plans need [model_space] and [training_space] tables",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Train/validation split of the plan's synthetic data.
    pub fn datasets(&self) -> Result<(Dataset, Dataset), SweepError> {
        self.data.train_val()
    }

    fn with_input_dim(&self, mut params: Hyperparameters) -> Hyperparameters {
        if !params.contains(INPUT_DIM) {
            params.insert(INPUT_DIM, self.data.n_features);
        }
        params
    }

    pub fn model_grid(&self, registry: &Registry) -> Result<Vec<Hyperparameters>, SweepError> {
        self.model
            .iter()
            .map(|t| registry.resolve_table(t).map(|p| self.with_input_dim(p)))
            .collect()
    }

    pub fn training_grid(&self, registry: &Registry) -> Result<Vec<Hyperparameters>, SweepError> {
        self.training
            .iter()
            .map(|t| registry.resolve_table(t))
            .collect()
    }

    pub fn random_search(
        &self,
        registry: &Registry,
        random: &RandomConfig,
    ) -> Result<RandomSearch, SweepError> {
        let mut model_space = registry.resolve_space(&self.model_space)?;
        if !self.model_space.contains_key(INPUT_DIM) {
            model_space.insert(INPUT_DIM, Sampler::Fixed(self.data.n_features.into()));
        }
        let training_space = registry.resolve_space(&self.training_space)?;
        Ok(RandomSearch::new(model_space, training_space, self.n_run)
            .with_seed(random.sampler_seed)
            .with_max_attempts_per_run(random.max_attempts_per_run))
    }

    /// Every combination the plan would train, without training anything.
    pub fn combinations(
        &self,
        registry: &Registry,
        random: &RandomConfig,
    ) -> Result<Vec<Combination>, SweepError> {
        match self.strategy {
            Strategy::Grid => Ok(grid_combinations(
                &self.training_grid(registry)?,
                &self.model_grid(registry)?,
            )),
            Strategy::Random => self.random_search(registry, random)?.combinations(),
        }
    }
}

/// Names the plan may refer to, mapped to the objects they build.
pub struct Registry {
    models: BTreeMap<String, Arc<dyn ModelFactory>>,
    losses: BTreeMap<String, Arc<dyn LossFunction>>,
    optimizers: BTreeMap<String, Arc<dyn OptimizerConstructor>>,
    metrics: BTreeMap<String, Arc<dyn Metric>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
            losses: BTreeMap::new(),
            optimizers: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_model("linear", Arc::new(LinearRegressorFactory));
        registry.register_loss("mse", Arc::new(MseLoss));
        registry.register_loss("l1", Arc::new(L1Loss));
        registry.register_loss("bce", Arc::new(BinaryCrossEntropyLoss));
        registry.register_optimizer("sgd", Arc::new(SgdConstructor));
        registry.register_optimizer("adam", Arc::new(AdamConstructor));
        registry.register_metric(Arc::new(MeanAbsoluteError));
        registry.register_metric(Arc::new(RootMeanSquaredError));
        registry.register_metric(Arc::new(BinaryAccuracy::default()));
        registry
    }

    pub fn register_model(&mut self, name: impl Into<String>, factory: Arc<dyn ModelFactory>) {
        self.models.insert(name.into(), factory);
    }

    pub fn register_loss(&mut self, name: impl Into<String>, loss: Arc<dyn LossFunction>) {
        self.losses.insert(name.into(), loss);
    }

    pub fn register_optimizer(
        &mut self,
        name: impl Into<String>,
        constructor: Arc<dyn OptimizerConstructor>,
    ) {
        self.optimizers.insert(name.into(), constructor);
    }

    /// Metrics register under their own name.
    pub fn register_metric(&mut self, metric: Arc<dyn Metric>) {
        self.metrics.insert(metric.name().to_string(), metric);
    }

    fn lookup<'a, T: ?Sized>(
        map: &'a BTreeMap<String, Arc<T>>,
        what: &str,
        name: &str,
    ) -> Result<&'a Arc<T>, SweepError> {
        map.get(name).ok_or_else(|| {
            let known: Vec<&str> = map.keys().map(String::as_str).collect();
            SweepError::plan(format!(
                "unknown {what} '{name}' (known: {})",
                known.join(", ")
            ))
        })
    }

    /// Resolve every key of a table.
    pub fn resolve_table(&self, table: &Table) -> Result<Hyperparameters, SweepError> {
        table
            .iter()
            .map(|(k, v)| self.resolve(k, v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// Resolve a space table: single-key sampler tables become samplers,
    /// everything else is a fixed value.
    pub fn resolve_space(&self, table: &Table) -> Result<SearchSpace, SweepError> {
        let mut space = SearchSpace::new();
        for (key, value) in table {
            space.insert(key.clone(), self.sampler(key, value)?);
        }
        Ok(space)
    }

    fn sampler(&self, key: &str, value: &Value) -> Result<Sampler, SweepError> {
        let Some((kind, arg)) = value
            .as_table()
            .filter(|t| t.len() == 1)
            .and_then(|t| t.iter().next())
        else {
            return Ok(Sampler::Fixed(self.resolve(key, value)?));
        };
        match kind.as_str() {
            "choice" => {
                let options = arg.as_array().ok_or_else(|| {
                    SweepError::plan(format!("'{key}': choice expects an array"))
                })?;
                Ok(Sampler::Choice(
                    options
                        .iter()
                        .map(|v| self.resolve(key, v))
                        .collect::<Result<_, _>>()?,
                ))
            }
            "uniform" => {
                let (min, max) = float_bounds(key, arg)?;
                Ok(Sampler::Uniform { min, max })
            }
            "log_uniform" => {
                let (min, max) = float_bounds(key, arg)?;
                Ok(Sampler::LogUniform { min, max })
            }
            "int_range" => {
                let bounds = arg.as_array().filter(|a| a.len() == 2);
                match bounds.map(|a| (a[0].as_integer(), a[1].as_integer())) {
                    Some((Some(min), Some(max))) => Ok(Sampler::IntRange { min, max }),
                    _ => Err(SweepError::plan(format!(
                        "'{key}': int_range expects [min, max] integers"
                    ))),
                }
            }
            _ => Ok(Sampler::Fixed(self.resolve(key, value)?)),
        }
    }

    /// Resolve one value; well-known keys name registered objects.
    pub fn resolve(&self, key: &str, value: &Value) -> Result<HyperValue, SweepError> {
        match key {
            keys::MODEL_CLASS => {
                let name = expect_str(key, value)?;
                Ok(HyperValue::Model(Arc::clone(Self::lookup(
                    &self.models,
                    "model",
                    name,
                )?)))
            }
            keys::CRITERION => self.criterion(value),
            keys::OPTIMIZER => self.optimizer(value),
            keys::METRICS => {
                let names: Vec<&str> = match value {
                    Value::String(s) => vec![s.as_str()],
                    Value::Array(items) => items
                        .iter()
                        .map(|v| expect_str(key, v))
                        .collect::<Result<_, _>>()?,
                    _ => return Err(SweepError::plan("metrics must be a name or a list of names")),
                };
                let metrics = names
                    .into_iter()
                    .map(|n| Self::lookup(&self.metrics, "metric", n).map(Arc::clone))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(HyperValue::Metrics(metrics))
            }
            keys::EARLY_STOPPER => {
                let table = value.as_table().ok_or_else(|| {
                    SweepError::plan("early_stopper must be a table with patience and min_delta")
                })?;
                let patience = table
                    .get("patience")
                    .and_then(Value::as_integer)
                    .and_then(|p| usize::try_from(p).ok())
                    .ok_or_else(|| SweepError::plan("early_stopper.patience must be a non-negative integer"))?;
                let min_delta = match table.get("min_delta") {
                    None => 0.0,
                    Some(v) => as_float(v).ok_or_else(|| {
                        SweepError::plan("early_stopper.min_delta must be a number")
                    })?,
                };
                Ok(HyperValue::EarlyStopper(EarlyStopper::new(patience, min_delta)))
            }
            _ => scalar(key, value),
        }
    }

    fn criterion(&self, value: &Value) -> Result<HyperValue, SweepError> {
        let criterion = match value {
            Value::String(name) => {
                Criterion::from_arc(name.clone(), Arc::clone(Self::lookup(&self.losses, "loss", name)?))
            }
            Value::Table(table) => {
                let loss = table
                    .get("loss")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SweepError::plan("criterion table needs a 'loss' name"))?;
                let name = table.get("name").and_then(Value::as_str).unwrap_or(loss);
                let mut criterion =
                    Criterion::from_arc(name, Arc::clone(Self::lookup(&self.losses, "loss", loss)?));
                if let Some(reduction) = table.get("reduction") {
                    criterion = criterion.with_reduction(match reduction.as_str() {
                        Some("mean") => Reduction::Mean,
                        Some("sum") => Reduction::Sum,
                        Some("max") => Reduction::Max,
                        _ => {
                            return Err(SweepError::plan(
                                "criterion.reduction must be one of mean, sum, max",
                            ));
                        }
                    });
                }
                criterion
            }
            _ => return Err(SweepError::plan("criterion must be a loss name or a table")),
        };
        Ok(HyperValue::Criterion(Arc::new(criterion)))
    }

    fn optimizer(&self, value: &Value) -> Result<HyperValue, SweepError> {
        let (kind, identifier, params) = match value {
            Value::String(kind) => (kind.as_str(), "", None),
            Value::Table(table) => {
                let kind = table
                    .get("kind")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SweepError::plan("optimizer table needs a 'kind'"))?;
                let identifier = table.get("identifier").and_then(Value::as_str).unwrap_or("");
                let params = match table.get("params") {
                    None => None,
                    Some(Value::Table(p)) => Some(
                        p.iter()
                            .map(|(k, v)| scalar(k, v).map(|v| (k.clone(), v)))
                            .collect::<Result<Hyperparameters, _>>()?,
                    ),
                    Some(_) => return Err(SweepError::plan("optimizer.params must be a table")),
                };
                (kind, identifier, params)
            }
            _ => return Err(SweepError::plan("optimizer must be a name or a table")),
        };
        let constructor = Self::lookup(&self.optimizers, "optimizer", kind)?;
        let wrapper = OptimizerWrapper::from_arc(Arc::clone(constructor), identifier, params)?;
        Ok(HyperValue::Optimizer(Arc::new(wrapper)))
    }
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str, SweepError> {
    value
        .as_str()
        .ok_or_else(|| SweepError::plan(format!("'{key}' must be a name")))
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn float_bounds(key: &str, value: &Value) -> Result<(f64, f64), SweepError> {
    let bounds = value.as_array().filter(|a| a.len() == 2);
    match bounds.map(|a| (as_float(&a[0]), as_float(&a[1]))) {
        Some((Some(min), Some(max))) => Ok((min, max)),
        _ => Err(SweepError::plan(format!(
            "'{key}': expected [min, max] numbers"
        ))),
    }
}

fn scalar(key: &str, value: &Value) -> Result<HyperValue, SweepError> {
    Ok(match value {
        Value::String(s) => HyperValue::Text(s.clone()),
        Value::Integer(i) => HyperValue::Int(*i),
        Value::Float(f) => HyperValue::Float(*f),
        Value::Boolean(b) => HyperValue::Bool(*b),
        Value::Datetime(d) => HyperValue::Text(d.to_string()),
        Value::Array(items) => HyperValue::List(
            items
                .iter()
                .map(|v| scalar(key, v))
                .collect::<Result<_, _>>()?,
        ),
        Value::Table(_) => {
            return Err(SweepError::plan(format!(
                "'{key}': tables are only allowed for criterion, optimizer, early_stopper and samplers"
            )));
        }
    })
}
