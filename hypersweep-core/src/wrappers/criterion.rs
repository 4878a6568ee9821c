//! Loss criteria: a named loss computation with an optional reduction step.
//!
//! The loss function itself is always unreduced (one value per element), so
//! a single implementation can be paired with any reduction.

use crate::error::SweepError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Step used for finite-difference gradients.
const FD_STEP: f64 = 1e-6;

/// Clamp applied to probabilities before taking logarithms.
const PROB_EPS: f64 = 1e-12;

/// An element-wise, unreduced loss.
pub trait LossFunction: Send + Sync {
    /// One loss value per element of `predicted`.
    fn unreduced(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError>;

    /// Derivative of each element's loss with respect to its prediction.
    ///
    /// Defaults to a central finite difference over [`LossFunction::unreduced`].
    fn gradient(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        let mut grads = Vec::with_capacity(predicted.len());
        for (i, (&p, &t)) in predicted.iter().zip(target).enumerate() {
            let up = self.unreduced(&[p + FD_STEP], &[t])?;
            let down = self.unreduced(&[p - FD_STEP], &[t])?;
            let (Some(up), Some(down)) = (up.first(), down.first()) else {
                return Err(SweepError::loss(format!(
                    "loss returned no value for element {i}"
                )));
            };
            grads.push((up - down) / (2.0 * FD_STEP));
        }
        Ok(grads)
    }
}

pub(crate) fn check_shapes(predicted: &[f64], target: &[f64]) -> Result<(), SweepError> {
    if predicted.len() != target.len() {
        return Err(SweepError::loss(format!(
            "prediction has {} elements but target has {}",
            predicted.len(),
            target.len()
        )));
    }
    Ok(())
}

/// Squared error, `(p - t)^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl LossFunction for MseLoss {
    fn unreduced(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(p, t)| (p - t).powi(2))
            .collect())
    }

    fn gradient(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(p, t)| 2.0 * (p - t))
            .collect())
    }
}

/// Absolute error, `|p - t|`.
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Loss;

impl LossFunction for L1Loss {
    fn unreduced(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(p, t)| (p - t).abs())
            .collect())
    }

    fn gradient(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(p, t)| {
                let d = p - t;
                if d > 0.0 {
                    1.0
                } else if d < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            })
            .collect())
    }
}

/// Binary cross-entropy on probabilities in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCrossEntropyLoss;

impl LossFunction for BinaryCrossEntropyLoss {
    fn unreduced(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(&p, &t)| {
                let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .collect())
    }

    fn gradient(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted
            .iter()
            .zip(target)
            .map(|(&p, &t)| {
                let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                (p - t) / (p * (1.0 - p))
            })
            .collect())
    }
}

/// An element-wise loss from a closure `(prediction, target) -> loss`.
pub struct FnLoss<F>(pub F);

impl<F> LossFunction for FnLoss<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn unreduced(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        check_shapes(predicted, target)?;
        Ok(predicted.iter().zip(target).map(|(&p, &t)| (self.0)(p, t)).collect())
    }
}

type ReduceFn = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// How element-wise losses collapse into a scalar.
#[derive(Clone)]
pub enum Reduction {
    Mean,
    Sum,
    Max,
    Custom(Arc<ReduceFn>),
}

impl Reduction {
    pub fn custom(f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Self::Sum => values.iter().sum(),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Custom(f) => f(values),
        }
    }

    /// Partial derivative of the reduced value with respect to each input.
    pub fn weights(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        match self {
            Self::Mean => vec![if n == 0 { 0.0 } else { 1.0 / n as f64 }; n],
            Self::Sum => vec![1.0; n],
            Self::Max => {
                let mut w = vec![0.0; n];
                let argmax = values
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i);
                if let Some(i) = argmax {
                    w[i] = 1.0;
                }
                w
            }
            Self::Custom(f) => {
                let mut perturbed = values.to_vec();
                (0..n)
                    .map(|i| {
                        let original = perturbed[i];
                        perturbed[i] = original + FD_STEP;
                        let up = f(&perturbed);
                        perturbed[i] = original - FD_STEP;
                        let down = f(&perturbed);
                        perturbed[i] = original;
                        (up - down) / (2.0 * FD_STEP)
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Debug for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => f.write_str("Mean"),
            Self::Sum => f.write_str("Sum"),
            Self::Max => f.write_str("Max"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A named loss criterion.
///
/// [`Criterion::compute`] returns the unreduced loss; training code applies
/// [`Criterion::reduce`] (or calls [`Criterion::loss`]) to get a scalar. When
/// no reduction is configured the mean is used.
#[derive(Clone)]
pub struct Criterion {
    name: String,
    loss: Arc<dyn LossFunction>,
    reduction: Option<Reduction>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, loss: impl LossFunction + 'static) -> Self {
        Self {
            name: name.into(),
            loss: Arc::new(loss),
            reduction: None,
        }
    }

    pub fn from_arc(name: impl Into<String>, loss: Arc<dyn LossFunction>) -> Self {
        Self {
            name: name.into(),
            loss,
            reduction: None,
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = Some(reduction);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reduction(&self) -> Option<&Reduction> {
        self.reduction.as_ref()
    }

    /// Element-wise loss between predictions and targets.
    pub fn compute(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        self.loss.unreduced(predicted, target)
    }

    pub fn reduce(&self, values: &[f64]) -> f64 {
        self.reduction.as_ref().unwrap_or(&Reduction::Mean).apply(values)
    }

    /// Reduced scalar loss.
    pub fn loss(&self, predicted: &[f64], target: &[f64]) -> Result<f64, SweepError> {
        Ok(self.reduce(&self.compute(predicted, target)?))
    }

    /// Gradient of the reduced loss with respect to each prediction.
    pub fn gradient(&self, predicted: &[f64], target: &[f64]) -> Result<Vec<f64>, SweepError> {
        let values = self.compute(predicted, target)?;
        let weights = self
            .reduction
            .as_ref()
            .unwrap_or(&Reduction::Mean)
            .weights(&values);
        let element_grads = self.loss.gradient(predicted, target)?;
        Ok(element_grads
            .iter()
            .zip(weights)
            .map(|(g, w)| g * w)
            .collect())
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criterion")
            .field("name", &self.name)
            .field("reduction", &self.reduction)
            .finish()
    }
}

/// A criterion over several keyed output heads, combined by weighted sum.
#[derive(Clone)]
pub struct MultiHeadCriterion {
    name: String,
    heads: Vec<(String, Arc<dyn LossFunction>, f64)>,
    reduction: Option<Reduction>,
}

impl MultiHeadCriterion {
    /// `weights[i]` applies to `heads[i]`.
    pub fn new(
        name: impl Into<String>,
        heads: Vec<(String, Arc<dyn LossFunction>)>,
        weights: Vec<f64>,
    ) -> Result<Self, SweepError> {
        if heads.len() != weights.len() {
            return Err(SweepError::loss(format!(
                "{} heads but {} weights",
                heads.len(),
                weights.len()
            )));
        }
        if heads.is_empty() {
            return Err(SweepError::loss("multi-head criterion needs at least one head"));
        }
        Ok(Self {
            name: name.into(),
            heads: heads
                .into_iter()
                .zip(weights)
                .map(|((key, loss), w)| (key, loss, w))
                .collect(),
            reduction: None,
        })
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = Some(reduction);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Weighted element-wise sum of every head's unreduced loss.
    pub fn compute(
        &self,
        predicted: &BTreeMap<String, Vec<f64>>,
        target: &BTreeMap<String, Vec<f64>>,
    ) -> Result<Vec<f64>, SweepError> {
        let mut total: Option<Vec<f64>> = None;
        for (key, loss, weight) in &self.heads {
            let p = predicted
                .get(key)
                .ok_or_else(|| SweepError::loss(format!("prediction missing head '{key}'")))?;
            let t = target
                .get(key)
                .ok_or_else(|| SweepError::loss(format!("target missing head '{key}'")))?;
            let head_loss = loss.unreduced(p, t)?;
            match total.as_mut() {
                None => total = Some(head_loss.iter().map(|v| v * weight).collect()),
                Some(acc) => {
                    if acc.len() != head_loss.len() {
                        return Err(SweepError::loss(format!(
                            "head '{key}' has {} elements, expected {}",
                            head_loss.len(),
                            acc.len()
                        )));
                    }
                    for (a, v) in acc.iter_mut().zip(&head_loss) {
                        *a += v * weight;
                    }
                }
            }
        }
        Ok(total.unwrap_or_default())
    }

    pub fn loss(
        &self,
        predicted: &BTreeMap<String, Vec<f64>>,
        target: &BTreeMap<String, Vec<f64>>,
    ) -> Result<f64, SweepError> {
        let values = self.compute(predicted, target)?;
        Ok(self.reduction.as_ref().unwrap_or(&Reduction::Mean).apply(&values))
    }
}

impl fmt::Display for MultiHeadCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
