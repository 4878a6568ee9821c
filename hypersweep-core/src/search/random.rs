//! Randomized search over per-key samplers.

use super::Combination;
use crate::error::SweepError;
use crate::hyperparams::{HyperValue, Hyperparameters};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type SampleFn = dyn Fn(&mut StdRng) -> HyperValue + Send + Sync;

/// How a single hyperparameter is drawn.
#[derive(Clone)]
pub enum Sampler {
    Fixed(HyperValue),
    Uniform { min: f64, max: f64 },
    LogUniform { min: f64, max: f64 },
    /// Inclusive on both ends.
    IntRange { min: i64, max: i64 },
    Choice(Vec<HyperValue>),
    Custom(Arc<SampleFn>),
}

impl Sampler {
    pub fn custom(f: impl Fn(&mut StdRng) -> HyperValue + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn choice<V: Into<HyperValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Choice(values.into_iter().map(Into::into).collect())
    }

    fn validate(&self, key: &str) -> Result<(), SweepError> {
        let bad = |why: String| Err(SweepError::invalid_input(format!("sampler '{key}': {why}")));
        match self {
            Self::Uniform { min, max } | Self::LogUniform { min, max }
                if !(min.is_finite() && max.is_finite() && (max - min).is_finite()) =>
            {
                bad(format!("bounds must be finite with a finite span, got {min}..{max}"))
            }
            Self::Uniform { min, max } if min > max => bad(format!("min {min} > max {max}")),
            Self::LogUniform { min, max } if *min <= 0.0 || min > max => {
                bad(format!("log-uniform bounds must satisfy 0 < min <= max, got {min}..{max}"))
            }
            Self::IntRange { min, max } if min > max => bad(format!("min {min} > max {max}")),
            Self::Choice(values) if values.is_empty() => bad("empty choice".to_string()),
            _ => Ok(()),
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> HyperValue {
        match self {
            Self::Fixed(v) => v.clone(),
            Self::Uniform { min, max } => {
                if min == max {
                    HyperValue::Float(*min)
                } else {
                    HyperValue::Float(rng.gen_range(*min..*max))
                }
            }
            Self::LogUniform { min, max } => {
                if min == max {
                    HyperValue::Float(*min)
                } else {
                    HyperValue::Float(rng.gen_range(min.ln()..max.ln()).exp())
                }
            }
            Self::IntRange { min, max } => HyperValue::Int(rng.gen_range(*min..=*max)),
            Self::Choice(values) => values[rng.gen_range(0..values.len())].clone(),
            Self::Custom(f) => f(rng),
        }
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "Fixed({v:?})"),
            Self::Uniform { min, max } => write!(f, "Uniform({min}..{max})"),
            Self::LogUniform { min, max } => write!(f, "LogUniform({min}..{max})"),
            Self::IntRange { min, max } => write!(f, "IntRange({min}..={max})"),
            Self::Choice(values) => f.debug_tuple("Choice").field(values).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Named samplers that together draw one hyperparameter map.
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    samplers: BTreeMap<String, Sampler>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, sampler: Sampler) -> Self {
        self.insert(key, sampler);
        self
    }

    /// Builder-style insert of a constant value.
    pub fn fixed(self, key: impl Into<String>, value: impl Into<HyperValue>) -> Self {
        self.with(key, Sampler::Fixed(value.into()))
    }

    pub fn insert(&mut self, key: impl Into<String>, sampler: Sampler) {
        self.samplers.insert(key.into(), sampler);
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        self.samplers.iter().try_for_each(|(k, s)| s.validate(k))
    }

    pub fn sample(&self, rng: &mut StdRng) -> Hyperparameters {
        self.samplers
            .iter()
            .map(|(k, s)| (k.clone(), s.sample(rng)))
            .collect()
    }
}

/// Draws `n_run` distinct `(training, model)` pairs.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    pub model_space: SearchSpace,
    pub training_space: SearchSpace,
    pub n_run: usize,
    /// Seed for the sampler RNG; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Draws allowed per requested run before giving up.
    pub max_attempts_per_run: usize,
}

impl RandomSearch {
    pub fn new(model_space: SearchSpace, training_space: SearchSpace, n_run: usize) -> Self {
        Self {
            model_space,
            training_space,
            n_run,
            seed: None,
            max_attempts_per_run: 100,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_attempts_per_run(mut self, attempts: usize) -> Self {
        self.max_attempts_per_run = attempts.max(1);
        self
    }

    /// Sample combinations, rejecting any pair that was already drawn.
    pub fn combinations(&self) -> Result<Vec<Combination>, SweepError> {
        self.model_space.validate()?;
        self.training_space.validate()?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_attempts = self.n_run.saturating_mul(self.max_attempts_per_run);
        let mut combinations: Vec<Combination> = Vec::with_capacity(self.n_run);
        let mut attempts = 0usize;
        let mut rejected = 0usize;

        while combinations.len() < self.n_run {
            if attempts >= max_attempts {
                return Err(SweepError::SearchSpaceExhausted {
                    requested: self.n_run,
                    found: combinations.len(),
                });
            }
            attempts += 1;

            let model = self.model_space.sample(&mut rng);
            let training = self.training_space.sample(&mut rng);
            let duplicate = combinations
                .iter()
                .any(|c| c.model == model && c.training == training);
            if duplicate {
                rejected += 1;
                continue;
            }
            combinations.push(Combination {
                index: combinations.len(),
                training,
                model,
            });
        }

        debug!(
            accepted = combinations.len(),
            rejected, "Randomized search sampling finished"
        );
        Ok(combinations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces() -> (SearchSpace, SearchSpace) {
        let model = SearchSpace::new()
            .with("hidden", Sampler::choice([4, 8]))
            .fixed("dropout", 0.1);
        let training = SearchSpace::new()
            .with("lr", Sampler::choice([0.1, 0.01]))
            .fixed("batch_size", 32);
        (model, training)
    }

    #[test]
    fn test_draws_distinct_pairs() {
        let (model, training) = spaces();
        let combos = RandomSearch::new(model, training, 4)
            .with_seed(Some(3))
            .combinations()
            .unwrap();
        assert_eq!(combos.len(), 4);
        for (i, a) in combos.iter().enumerate() {
            assert_eq!(a.index, i);
            for b in &combos[i + 1..] {
                assert!(a.model != b.model || a.training != b.training);
            }
        }
    }

    #[test]
    fn test_exhausted_space_errors_instead_of_looping() {
        let (model, training) = spaces();
        let err = RandomSearch::new(model, training, 5)
            .with_seed(Some(1))
            .with_max_attempts_per_run(20)
            .combinations()
            .unwrap_err();
        assert!(matches!(
            err,
            SweepError::SearchSpaceExhausted { requested: 5, found: 4 }
        ));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let space = SearchSpace::new()
            .with("lr", Sampler::LogUniform { min: 1e-4, max: 1e-1 })
            .with("layers", Sampler::IntRange { min: 1, max: 6 })
            .with("momentum", Sampler::Uniform { min: 0.0, max: 0.9 });
        let search = RandomSearch::new(space, SearchSpace::new(), 10).with_seed(Some(42));
        assert_eq!(search.combinations().unwrap(), search.combinations().unwrap());
    }

    #[test]
    fn test_samplers_respect_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let lr = Sampler::LogUniform { min: 1e-4, max: 1e-1 }
                .sample(&mut rng)
                .as_f64()
                .unwrap();
            assert!((1e-4..=1e-1).contains(&lr));
            let n = Sampler::IntRange { min: -2, max: 2 }
                .sample(&mut rng)
                .as_i64()
                .unwrap();
            assert!((-2..=2).contains(&n));
        }
        let custom = Sampler::custom(|rng| HyperValue::Int(rng.gen_range(10..11)));
        assert_eq!(custom.sample(&mut rng), HyperValue::Int(10));
    }

    #[test]
    fn test_invalid_sampler_rejected() {
        let space = SearchSpace::new().with("lr", Sampler::LogUniform { min: 0.0, max: 1.0 });
        let search = RandomSearch::new(space, SearchSpace::new(), 1);
        assert!(matches!(search.combinations(), Err(SweepError::InvalidInput(_))));
        let empty = SearchSpace::new().with("x", Sampler::Choice(vec![]));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        let samplers = [
            Sampler::Uniform { min: 0.0, max: f64::INFINITY },
            Sampler::Uniform { min: f64::NEG_INFINITY, max: 1.0 },
            Sampler::Uniform { min: f64::NAN, max: 1.0 },
            // Both ends finite, but the span overflows.
            Sampler::Uniform { min: -1.7e308, max: 1.7e308 },
            Sampler::LogUniform { min: 1e-3, max: f64::INFINITY },
            Sampler::LogUniform { min: f64::NAN, max: 1.0 },
        ];
        for sampler in samplers {
            let space = SearchSpace::new().with("lr", sampler.clone());
            let search = RandomSearch::new(SearchSpace::new(), space, 1).with_seed(Some(0));
            assert!(
                matches!(search.combinations(), Err(SweepError::InvalidInput(_))),
                "{sampler:?} accepted"
            );
        }
    }
}
