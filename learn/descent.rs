// ========================================================================================
//                          Batch Gradient Descent
// ========================================================================================

use super::cost::{OptimizerError, cost, gradient};
use super::progress::{DescentObserver, IterationReport, NoopDescentObserver};
use super::types::Coefficients;
use crate::dataflow::PCollection;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Settings for [`GradientDescent`]. Every field has a default, so a TOML
/// `[descent]` section only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescentConfig {
    /// Initial step size.
    pub learning_rate: f64,
    /// Regularization weight. `None` or a value `<= 0` disables it.
    pub lambda: Option<f64>,
    /// Iteration stops once the cost is at or below this value.
    pub cost_threshold: f64,
    /// Factor applied to the learning rate whenever an iteration raises the cost.
    pub step_decay: f64,
    /// Upper bound on iterations. `None` iterates until the threshold is met.
    pub max_iterations: Option<usize>,
}

impl Default for DescentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            lambda: None,
            cost_threshold: 0.01,
            step_decay: 0.9,
            max_iterations: Some(10_000),
        }
    }
}

impl DescentConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if !(self.step_decay > 0.0 && self.step_decay <= 1.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "step_decay must lie in (0, 1], got {}",
                self.step_decay
            )));
        }
        if !(self.cost_threshold.is_finite() && self.cost_threshold >= 0.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "cost_threshold must be a non-negative finite number, got {}",
                self.cost_threshold
            )));
        }
        if let Some(lambda) = self.lambda {
            if lambda.is_nan() {
                return Err(OptimizerError::InvalidConfig(
                    "lambda must be a number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Result of a converged run.
#[derive(Debug, Clone, PartialEq)]
pub struct DescentOutcome {
    pub theta: Coefficients,
    pub cost: f64,
    pub iterations: usize,
    /// Learning rate after all decays.
    pub learning_rate: f64,
}

/// Minimizes the regularized squared-error cost over a row dataset.
///
/// Each iteration computes the gradient at the current parameters, moves every
/// parameter against it, then evaluates the cost at the new parameters. A step
/// that raises the cost is kept, but the learning rate shrinks by
/// `step_decay` for the next one.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    config: DescentConfig,
}

impl GradientDescent {
    pub fn new(config: DescentConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DescentConfig {
        &self.config
    }

    pub fn run(
        &self,
        dataset: &PCollection<Array1<f64>>,
        initial: &Coefficients,
    ) -> Result<DescentOutcome, OptimizerError> {
        self.run_with_observer(dataset, initial, &mut NoopDescentObserver)
    }

    pub fn run_with_observer<O: DescentObserver + ?Sized>(
        &self,
        dataset: &PCollection<Array1<f64>>,
        initial: &Coefficients,
        observer: &mut O,
    ) -> Result<DescentOutcome, OptimizerError> {
        let config = &self.config;
        let mut theta = initial.clone();
        let mut learning_rate = config.learning_rate;
        let mut previous_cost = f64::MAX;
        let mut iteration = 0;

        observer.on_start(&theta, learning_rate);

        while previous_cost > config.cost_threshold {
            if let Some(max_iterations) = config.max_iterations {
                if iteration >= max_iterations {
                    log::warn!(
                        "Stopping gradient descent after {max_iterations} iterations at cost {previous_cost:.6e}"
                    );
                    return Err(OptimizerError::DidNotConverge {
                        max_iterations,
                        threshold: config.cost_threshold,
                        last_cost: previous_cost,
                    });
                }
            }

            let step = gradient(dataset, &theta, config.lambda)?;
            theta.scaled_add(-learning_rate, &step);
            let current_cost = cost(dataset, &theta, config.lambda)?;
            iteration += 1;

            if !current_cost.is_finite() {
                return Err(OptimizerError::Diverged {
                    iteration,
                    cost: current_cost,
                });
            }

            let cost_increased = current_cost > previous_cost;
            if cost_increased {
                learning_rate *= config.step_decay;
            }

            observer.on_iteration(&IterationReport {
                iteration,
                cost: current_cost,
                learning_rate,
                cost_increased,
                theta: &theta,
                gradient: &step,
            });
            previous_cost = current_cost;
        }

        observer.on_finish(iteration, previous_cost);
        Ok(DescentOutcome {
            theta,
            cost: previous_cost,
            iterations: iteration,
            learning_rate,
        })
    }
}
