//! Evaluation metrics and per-epoch fit history.

use crate::error::SweepError;
use crate::wrappers::criterion::check_shapes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named evaluation metric computed on a whole split.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, predicted: &[f64], target: &[f64]) -> Result<f64, SweepError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteError;

impl Metric for MeanAbsoluteError {
    fn name(&self) -> &str {
        "mae"
    }

    fn compute(&self, predicted: &[f64], target: &[f64]) -> Result<f64, SweepError> {
        check_shapes(predicted, target)?;
        if predicted.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = predicted.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
        Ok(total / predicted.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RootMeanSquaredError;

impl Metric for RootMeanSquaredError {
    fn name(&self) -> &str {
        "rmse"
    }

    fn compute(&self, predicted: &[f64], target: &[f64]) -> Result<f64, SweepError> {
        check_shapes(predicted, target)?;
        if predicted.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = predicted.iter().zip(target).map(|(p, t)| (p - t).powi(2)).sum();
        Ok((total / predicted.len() as f64).sqrt())
    }
}

/// Fraction of predictions on the same side of `threshold` as the target.
#[derive(Debug, Clone, Copy)]
pub struct BinaryAccuracy {
    pub threshold: f64,
}

impl Default for BinaryAccuracy {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Metric for BinaryAccuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn compute(&self, predicted: &[f64], target: &[f64]) -> Result<f64, SweepError> {
        check_shapes(predicted, target)?;
        if predicted.is_empty() {
            return Ok(0.0);
        }
        let hits = predicted
            .iter()
            .zip(target)
            .filter(|(p, t)| (**p >= self.threshold) == (**t >= self.threshold))
            .count();
        Ok(hits as f64 / predicted.len() as f64)
    }
}

/// Which side of the data a history series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which epoch of a history to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryIndex {
    /// The final epoch.
    Last,
    /// `patience` epochs before the final one: the epoch an early stopper
    /// last saw an improvement when it halted training. Clamped to the first
    /// epoch for short histories.
    BeforePatience(usize),
}

impl HistoryIndex {
    /// Position in a series of `len` values, or `None` for an empty series.
    pub fn resolve(&self, len: usize) -> Option<usize> {
        let last = len.checked_sub(1)?;
        Some(match self {
            Self::Last => last,
            Self::BeforePatience(patience) => last.saturating_sub(*patience),
        })
    }
}

/// Per-epoch values of the criterion and every metric, for both splits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    pub train: BTreeMap<String, Vec<f64>>,
    pub val: BTreeMap<String, Vec<f64>>,
    pub epochs_completed: usize,
    pub stopped_early: bool,
}

impl FitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, split: Split, name: &str, value: f64) {
        let series = match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
        };
        series.entry(name.to_string()).or_default().push(value);
    }

    /// Close an epoch after all of its values were recorded.
    pub fn end_epoch(&mut self) {
        self.epochs_completed += 1;
    }

    pub fn series(&self, split: Split, name: &str) -> Option<&[f64]> {
        let map = match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
        };
        map.get(name).map(Vec::as_slice)
    }

    pub fn value_at(&self, split: Split, name: &str, index: HistoryIndex) -> Result<f64, SweepError> {
        let missing = || SweepError::MissingHistory {
            metric: name.to_string(),
            split: split.to_string(),
        };
        let series = self.series(split, name).ok_or_else(missing)?;
        let idx = index.resolve(series.len()).ok_or_else(missing)?;
        Ok(series[idx])
    }

    /// The values recorded for epoch `epoch`, keyed `"{split}/{name}"`.
    pub fn epoch_values(&self, epoch: usize) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for (split, map) in [(Split::Train, &self.train), (Split::Val, &self.val)] {
            for (name, series) in map {
                if let Some(v) = series.get(epoch) {
                    values.insert(format!("{split}/{name}"), *v);
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_metrics() {
        let p = [1.0, 2.0, 4.0];
        let t = [1.0, 1.0, 1.0];
        assert_eq!(MeanAbsoluteError.compute(&p, &t).unwrap(), 4.0 / 3.0);
        assert_eq!(RootMeanSquaredError.compute(&p, &t).unwrap(), (10.0f64 / 3.0).sqrt());
        let acc = BinaryAccuracy::default()
            .compute(&[0.9, 0.2, 0.6, 0.4], &[1.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(acc, 0.5);
    }

    #[test]
    fn test_history_index_resolution() {
        assert_eq!(HistoryIndex::Last.resolve(5), Some(4));
        assert_eq!(HistoryIndex::BeforePatience(2).resolve(5), Some(2));
        assert_eq!(HistoryIndex::BeforePatience(9).resolve(5), Some(0));
        assert_eq!(HistoryIndex::Last.resolve(0), None);
    }

    #[test]
    fn test_fit_history_records_and_reads() {
        let mut history = FitHistory::new();
        for (train, val) in [(0.5, 0.6), (0.3, 0.4), (0.2, 0.45)] {
            history.record(Split::Train, "loss", train);
            history.record(Split::Val, "loss", val);
            history.end_epoch();
        }
        assert_eq!(history.epochs_completed, 3);
        assert_eq!(
            history.value_at(Split::Val, "loss", HistoryIndex::Last).unwrap(),
            0.45
        );
        assert_eq!(
            history
                .value_at(Split::Val, "loss", HistoryIndex::BeforePatience(1))
                .unwrap(),
            0.4
        );
        assert!(matches!(
            history.value_at(Split::Train, "mae", HistoryIndex::Last),
            Err(SweepError::MissingHistory { .. })
        ));
        let epoch = history.epoch_values(1);
        assert_eq!(epoch.get("train/loss"), Some(&0.3));
        assert_eq!(epoch.get("val/loss"), Some(&0.4));
    }
}
