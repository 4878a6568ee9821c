//! Hyperparameter values, hyperparameter maps and the training device.
//!
//! A [`Hyperparameters`] map holds both plain scalars (learning rates, layer
//! sizes) and the framework objects a training configuration carries: the
//! criterion, the optimizer wrapper, metrics, the early stopper and the model
//! factory. Keeping them in one map lets grid and random search treat every
//! key the same way.

use crate::error::SweepError;
use crate::results::Cell;
use crate::training::callbacks::EarlyStopper;
use crate::training::metrics::Metric;
use crate::training::model::ModelFactory;
use crate::wrappers::{Criterion, OptimizerWrapper};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Well-known hyperparameter keys read by the result-collection loop.
pub mod keys {
    pub const CRITERION: &str = "criterion";
    pub const OPTIMIZER: &str = "optimizer";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const NUM_EPOCHS: &str = "num_epochs";
    pub const METRICS: &str = "metrics";
    pub const EARLY_STOPPER: &str = "early_stopper";
    pub const MODEL_CLASS: &str = "model_class";
    /// Training flag: stream per-epoch history to the experiment tracker.
    pub const TRACKER_INTERACTION: &str = "tracker_interaction";
}

/// The value of a single hyperparameter.
#[derive(Clone)]
pub enum HyperValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<HyperValue>),
    Criterion(Arc<Criterion>),
    Optimizer(Arc<OptimizerWrapper>),
    Metrics(Vec<Arc<dyn Metric>>),
    EarlyStopper(EarlyStopper),
    Model(Arc<dyn ModelFactory>),
}

impl HyperValue {
    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Criterion(_) => "criterion",
            Self::Optimizer(_) => "optimizer",
            Self::Metrics(_) => "metrics",
            Self::EarlyStopper(_) => "early_stopper",
            Self::Model(_) => "model",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Render the value as a result-table cell. Objects render as their name.
    pub fn to_cell(&self) -> Cell {
        match self {
            Self::Bool(v) => Cell::Bool(*v),
            Self::Int(v) => Cell::Int(*v),
            Self::Float(v) => Cell::Float(*v),
            Self::Text(v) => Cell::Text(v.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// JSON form sent to experiment trackers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => crate::float_repr::to_value(*v),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Metrics(metrics) => serde_json::Value::Array(
                metrics
                    .iter()
                    .map(|m| serde_json::Value::String(m.name().to_string()))
                    .collect(),
            ),
            Self::EarlyStopper(stopper) => serde_json::json!({
                "patience": stopper.patience,
                "min_delta": stopper.min_delta,
            }),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Criterion(c) => f.write_str(c.name()),
            Self::Optimizer(o) => f.write_str(o.name()),
            Self::Metrics(metrics) => {
                let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
                write!(f, "[{}]", names.join(", "))
            }
            Self::EarlyStopper(s) => {
                write!(f, "EarlyStopper(patience={}, min_delta={})", s.patience, s.min_delta)
            }
            Self::Model(m) => f.write_str(m.name()),
        }
    }
}

impl fmt::Debug for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            other => write!(f, "{}({other})", other.kind()),
        }
    }
}

impl PartialEq for HyperValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Criterion(a), Self::Criterion(b)) => a.name() == b.name(),
            (Self::Optimizer(a), Self::Optimizer(b)) => {
                a.name() == b.name() && a.partial_params() == b.partial_params()
            }
            (Self::Metrics(a), Self::Metrics(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name() == y.name())
            }
            (Self::EarlyStopper(a), Self::EarlyStopper(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a.name() == b.name(),
            _ => false,
        }
    }
}

impl From<bool> for HyperValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for HyperValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for HyperValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for HyperValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for HyperValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HyperValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HyperValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Criterion> for HyperValue {
    fn from(v: Criterion) -> Self {
        Self::Criterion(Arc::new(v))
    }
}

impl From<Arc<Criterion>> for HyperValue {
    fn from(v: Arc<Criterion>) -> Self {
        Self::Criterion(v)
    }
}

impl From<OptimizerWrapper> for HyperValue {
    fn from(v: OptimizerWrapper) -> Self {
        Self::Optimizer(Arc::new(v))
    }
}

impl From<Arc<OptimizerWrapper>> for HyperValue {
    fn from(v: Arc<OptimizerWrapper>) -> Self {
        Self::Optimizer(v)
    }
}

impl From<EarlyStopper> for HyperValue {
    fn from(v: EarlyStopper) -> Self {
        Self::EarlyStopper(v)
    }
}

impl From<Arc<dyn ModelFactory>> for HyperValue {
    fn from(v: Arc<dyn ModelFactory>) -> Self {
        Self::Model(v)
    }
}

impl From<Vec<Arc<dyn Metric>>> for HyperValue {
    fn from(v: Vec<Arc<dyn Metric>>) -> Self {
        Self::Metrics(v)
    }
}

/// An ordered map of hyperparameter names to values.
#[derive(Clone, Default, PartialEq)]
pub struct Hyperparameters {
    values: BTreeMap<String, HyperValue>,
}

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HyperValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HyperValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HyperValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<HyperValue> {
        self.values.remove(key)
    }

    /// A copy without the given key.
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.values.remove(key);
        copy
    }

    /// Merge `other` on top of `self`; keys in `other` win.
    pub fn merge(&self, other: &Hyperparameters) -> Self {
        let mut merged = self.clone();
        for (k, v) in &other.values {
            merged.values.insert(k.clone(), v.clone());
        }
        merged
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> Result<&HyperValue, SweepError> {
        self.get(key).ok_or_else(|| SweepError::missing(key))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, SweepError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| type_error(key, "number")),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, SweepError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| type_error(key, "non-negative integer")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, SweepError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| type_error(key, "bool")),
        }
    }

    /// True only when the key holds `Bool(true)`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(HyperValue::Bool(true)))
    }

    pub fn criterion(&self) -> Result<Arc<Criterion>, SweepError> {
        match self.require(keys::CRITERION)? {
            HyperValue::Criterion(c) => Ok(Arc::clone(c)),
            _ => Err(type_error(keys::CRITERION, "criterion")),
        }
    }

    pub fn optimizer(&self) -> Result<Arc<OptimizerWrapper>, SweepError> {
        match self.require(keys::OPTIMIZER)? {
            HyperValue::Optimizer(o) => Ok(Arc::clone(o)),
            _ => Err(type_error(keys::OPTIMIZER, "optimizer")),
        }
    }

    pub fn model_factory(&self) -> Result<Arc<dyn ModelFactory>, SweepError> {
        match self.require(keys::MODEL_CLASS)? {
            HyperValue::Model(m) => Ok(Arc::clone(m)),
            _ => Err(type_error(keys::MODEL_CLASS, "model")),
        }
    }

    /// Metrics, empty when the key is absent.
    pub fn metrics(&self) -> Result<Vec<Arc<dyn Metric>>, SweepError> {
        match self.get(keys::METRICS) {
            None => Ok(Vec::new()),
            Some(HyperValue::Metrics(m)) => Ok(m.clone()),
            Some(_) => Err(type_error(keys::METRICS, "metrics")),
        }
    }

    pub fn early_stopper(&self) -> Result<Option<EarlyStopper>, SweepError> {
        match self.get(keys::EARLY_STOPPER) {
            None => Ok(None),
            Some(HyperValue::EarlyStopper(s)) => Ok(Some(s.clone())),
            Some(_) => Err(type_error(keys::EARLY_STOPPER, "early_stopper")),
        }
    }

    pub fn batch_size(&self) -> Result<usize, SweepError> {
        self.get_usize(keys::BATCH_SIZE)?
            .ok_or_else(|| SweepError::missing(keys::BATCH_SIZE))
    }

    pub fn num_epochs(&self) -> Result<usize, SweepError> {
        self.get_usize(keys::NUM_EPOCHS)?
            .ok_or_else(|| SweepError::missing(keys::NUM_EPOCHS))
    }
}

impl fmt::Debug for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<HyperValue>> FromIterator<(K, V)> for Hyperparameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

fn type_error(key: &str, expected: &'static str) -> SweepError {
    SweepError::HyperparameterType {
        key: key.to_string(),
        expected,
    }
}

/// Device a model and its data loaders are placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl FromStr for Device {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| SweepError::invalid_input(format!("unknown device '{other}'"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = SweepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}
