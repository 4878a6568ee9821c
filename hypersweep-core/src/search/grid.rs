//! Exhaustive grid search.

use super::Combination;
use crate::hyperparams::Hyperparameters;

/// The Cartesian product `training x model`, training-major: every model
/// configuration is paired with the first training configuration before the
/// second one is used.
pub fn grid_combinations(
    training: &[Hyperparameters],
    model: &[Hyperparameters],
) -> Vec<Combination> {
    let mut combinations = Vec::with_capacity(training.len() * model.len());
    for t in training {
        for m in model {
            combinations.push(Combination {
                index: combinations.len(),
                training: t.clone(),
                model: m.clone(),
            });
        }
    }
    combinations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_training_major() {
        let training = vec![
            Hyperparameters::new().with("lr", 0.1),
            Hyperparameters::new().with("lr", 0.01),
        ];
        let model = vec![
            Hyperparameters::new().with("hidden", 4),
            Hyperparameters::new().with("hidden", 8),
            Hyperparameters::new().with("hidden", 16),
        ];
        let combos = grid_combinations(&training, &model);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[1].training, training[0]);
        assert_eq!(combos[1].model, model[1]);
        assert_eq!(combos[3].training, training[1]);
        assert_eq!(combos[3].model, model[0]);
        assert!(combos.iter().enumerate().all(|(i, c)| c.index == i));
    }

    #[test]
    fn test_empty_side_yields_nothing() {
        let training = vec![Hyperparameters::new().with("lr", 0.1)];
        assert!(grid_combinations(&training, &[]).is_empty());
    }
}
