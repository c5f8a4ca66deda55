// ========================================================================================
//                     Regularized Squared-Error Cost and Gradient
// ========================================================================================

// Rows carry the target in column 0 and features in columns 1..n, so a row has
// exactly as many columns as theta has entries.

use super::types::Coefficients;
use crate::dataflow::{PCollection, PTable, PipelineError, Sum};
use ndarray::{Array1, s};
use std::sync::Arc;
use thiserror::Error;

/// A dataset row whose width does not match the parameters.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Row {row:?} has {features} features, but the parameters expect {expected} (one bias plus {expected} weights)."
)]
pub struct DimensionMismatch {
    pub row: Vec<f64>,
    pub features: usize,
    pub expected: usize,
}

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),

    #[error("The dataset contains no rows; cost and gradient are undefined.")]
    EmptyDataset,

    #[error("Parameters must contain at least the bias term.")]
    EmptyTheta,

    #[error(
        "Gradient descent did not reach a cost of {threshold} within {max_iterations} iterations. The last cost was {last_cost:.6e}."
    )]
    DidNotConverge {
        max_iterations: usize,
        threshold: f64,
        last_cost: f64,
    },

    #[error(
        "Gradient descent diverged at iteration {iteration}: the cost became {cost}. Try a smaller learning rate."
    )]
    Diverged { iteration: usize, cost: f64 },

    #[error("Invalid descent configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline evaluation failed: {0}")]
    Pipeline(PipelineError),
}

/// A mismatched row fails inside a pipeline stage; it is unwrapped here so
/// callers see the mismatch itself rather than a generic stage failure.
impl From<PipelineError> for OptimizerError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::StageFailed { stage, source } => {
                match source.downcast::<DimensionMismatch>() {
                    Ok(mismatch) => Self::DimensionMismatch(*mismatch),
                    Err(source) => Self::Pipeline(PipelineError::StageFailed { stage, source }),
                }
            }
            other => Self::Pipeline(other),
        }
    }
}

/// `h(x) - y` for a single row, with `h(x) = theta0 + sum(theta_i * x_i)`.
pub fn residual(row: &Array1<f64>, theta: &Coefficients) -> Result<f64, DimensionMismatch> {
    if theta.is_empty() || row.len() != theta.len() {
        return Err(DimensionMismatch {
            row: row.to_vec(),
            features: row.len().saturating_sub(1),
            expected: theta.feature_count(),
        });
    }
    let hypothesis = theta[0] + row.slice(s![1..]).dot(&theta.weights());
    Ok(hypothesis - row[0])
}

/// The regularization weight in effect. Zero or negative values disable it.
pub fn regularization_weight(lambda: Option<f64>) -> Option<f64> {
    lambda.filter(|&weight| weight > 0.0)
}

/// `(sum of squared residuals + lambda * sum_{i>=1} theta_i^2) / 2m`.
///
/// The bias is never penalized.
pub fn cost(
    dataset: &PCollection<Array1<f64>>,
    theta: &Coefficients,
    lambda: Option<f64>,
) -> Result<f64, OptimizerError> {
    let m = row_count(dataset, theta)?;

    let shared = Arc::new(theta.clone());
    let squared_errors = dataset
        .try_map("squared residual", move |row| {
            residual(row, &shared).map(|error| error * error)
        })
        .aggregate("sum of squared residuals", Sum)
        .value()?;

    let penalty = regularization_weight(lambda)
        .map_or(0.0, |weight| weight * theta.weights().mapv(|t| t * t).sum());

    Ok((squared_errors + penalty) / (2.0 * m))
}

/// Partial derivatives of the cost, one per parameter.
///
/// Index 0 is `sum(e) / m`; index `i >= 1` is `sum(e * x_i) / m` minus
/// `lambda * theta_i / m` when regularization is enabled.
pub fn gradient(
    dataset: &PCollection<Array1<f64>>,
    theta: &Coefficients,
    lambda: Option<f64>,
) -> Result<Array1<f64>, OptimizerError> {
    let m = row_count(dataset, theta)?;

    let shared = Arc::new(theta.clone());
    let contributions: PTable<usize, f64> = PTable::from(dataset.try_flat_map(
        "gradient contributions",
        move |row| {
            let error = residual(row, &shared)?;
            let mut terms = Vec::with_capacity(row.len());
            terms.push((0, error));
            terms.extend(row.iter().enumerate().skip(1).map(|(index, x)| (index, error * x)));
            Ok::<_, DimensionMismatch>(terms)
        },
    ));
    let sums = contributions
        .group_by_key()
        .combine_values("sum of contributions", Sum)
        .as_map()?;

    let weight = regularization_weight(lambda);
    Ok(Array1::from_shape_fn(theta.len(), |index| {
        let mut partial = sums.get(&index).copied().unwrap_or(0.0) / m;
        if index > 0 {
            if let Some(weight) = weight {
                partial -= weight * theta[index] / m;
            }
        }
        partial
    }))
}

/// Number of rows as a float, rejecting empty parameters and empty datasets.
fn row_count(dataset: &PCollection<Array1<f64>>, theta: &Coefficients) -> Result<f64, OptimizerError> {
    if theta.is_empty() {
        return Err(OptimizerError::EmptyTheta);
    }
    let m = dataset.length().value()?;
    if m == 0 {
        return Err(OptimizerError::EmptyDataset);
    }
    Ok(m as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::{Pipeline, PipelineConfig};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn pipeline() -> Pipeline {
        Pipeline::new(&PipelineConfig { threads: Some(2) }).unwrap()
    }

    #[test]
    fn residual_is_hypothesis_minus_target() {
        let theta = Coefficients::from(vec![1.0, 2.0, -1.0]);
        // h = 1 + 2*3 - 1*4 = 3, y = 5
        assert_relative_eq!(residual(&array![5.0, 3.0, 4.0], &theta).unwrap(), -2.0);
    }

    #[test]
    fn residual_rejects_mismatched_rows() {
        let theta = Coefficients::from(vec![0.0, 1.0]);
        let mismatch = residual(&array![1.0, 2.0, 3.0], &theta).unwrap_err();
        assert_eq!(mismatch.row, vec![1.0, 2.0, 3.0]);
        assert_eq!(mismatch.features, 2);
        assert_eq!(mismatch.expected, 1);
    }

    #[test]
    fn cost_without_and_with_regularization() {
        let p = pipeline();
        let rows = p.collection_of(
            "rows",
            vec![array![1.0, 1.0], array![2.0, 2.0], array![3.0, 3.0]],
        );
        let theta = Coefficients::from(vec![1.0, 1.0]);
        // Every residual is 1, so the unregularized cost is 3 / 6.
        assert_relative_eq!(cost(&rows, &theta, None).unwrap(), 0.5);
        assert_relative_eq!(cost(&rows, &theta, Some(0.0)).unwrap(), 0.5);
        assert_relative_eq!(cost(&rows, &theta, Some(-3.0)).unwrap(), 0.5);
        // The bias is excluded from the penalty: (3 + 2 * 1) / 6.
        assert_relative_eq!(cost(&rows, &theta, Some(2.0)).unwrap(), 5.0 / 6.0);
    }

    #[test]
    fn gradient_matches_hand_computation() {
        let p = pipeline();
        let rows = p.collection_of("rows", vec![array![2.0, 1.0], array![4.0, 2.0]]);
        let theta = Coefficients::from(vec![0.0, 1.0]);
        // Residuals: 1 - 2 = -1 and 2 - 4 = -2.
        let plain = gradient(&rows, &theta, None).unwrap();
        assert_relative_eq!(plain[0], (-1.0 - 2.0) / 2.0);
        assert_relative_eq!(plain[1], (-1.0 * 1.0 + -2.0 * 2.0) / 2.0);

        let regularized = gradient(&rows, &theta, Some(4.0)).unwrap();
        assert_relative_eq!(regularized[0], plain[0]);
        assert_relative_eq!(regularized[1], plain[1] - 4.0 * 1.0 / 2.0);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let p = pipeline();
        let rows = p.collection_of("rows", Vec::<Array1<f64>>::new());
        assert!(matches!(
            cost(&rows, &Coefficients::from(vec![0.0]), None),
            Err(OptimizerError::EmptyDataset)
        ));
        let one = p.collection_of("one", vec![array![1.0]]);
        assert!(matches!(
            gradient(&one, &Coefficients::from(Vec::new()), None),
            Err(OptimizerError::EmptyTheta)
        ));
    }

    #[test]
    fn mismatch_inside_a_stage_surfaces_as_dimension_mismatch() {
        let p = pipeline();
        let rows = p.collection_of("rows", vec![array![1.0, 1.0], array![1.0, 2.0, 3.0]]);
        let theta = Coefficients::from(vec![0.0, 1.0]);
        match gradient(&rows, &theta, None) {
            Err(OptimizerError::DimensionMismatch(mismatch)) => {
                assert_eq!(mismatch.row, vec![1.0, 2.0, 3.0]);
            }
            other => panic!("expected a dimension mismatch, got {other:?}"),
        }
        assert!(matches!(
            cost(&rows, &theta, None),
            Err(OptimizerError::DimensionMismatch(_))
        ));
    }
}
