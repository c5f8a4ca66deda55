//! # Regularized Linear Regression
//!
//! Batch gradient descent on a squared-error cost with an optional L2 penalty
//! on the feature weights. Rows are evaluated through the dataflow engine, so
//! every cost and gradient pass runs on the pipeline's worker pool.

pub mod cost;
pub mod descent;
pub mod progress;
pub mod types;

pub use cost::{DimensionMismatch, OptimizerError, cost, gradient, residual};
pub use descent::{DescentConfig, DescentOutcome, GradientDescent};
pub use progress::{DescentObserver, IterationReport, LoggingObserver, NoopDescentObserver};
pub use types::Coefficients;
