use super::types::Coefficients;

/// State of the optimizer after one completed iteration.
#[derive(Clone, Copy, Debug)]
pub struct IterationReport<'a> {
    pub iteration: usize,
    pub cost: f64,
    /// Learning rate for the next iteration, after any decay.
    pub learning_rate: f64,
    /// Whether this iteration increased the cost and triggered a decay.
    pub cost_increased: bool,
    pub theta: &'a Coefficients,
    pub gradient: &'a ndarray::Array1<f64>,
}

/// Observer for reporting the progress of gradient descent.
pub trait DescentObserver {
    fn on_start(&mut self, theta: &Coefficients, learning_rate: f64) {
        let _ = (theta, learning_rate);
    }
    fn on_iteration(&mut self, report: &IterationReport<'_>) {
        let _ = report;
    }
    fn on_finish(&mut self, iterations: usize, cost: f64) {
        let _ = (iterations, cost);
    }
}

#[derive(Default)]
pub struct NoopDescentObserver;

impl DescentObserver for NoopDescentObserver {}

/// Logs every iteration at debug level and the final state at info level.
#[derive(Default)]
pub struct LoggingObserver;

impl DescentObserver for LoggingObserver {
    fn on_start(&mut self, theta: &Coefficients, learning_rate: f64) {
        log::info!("Starting gradient descent from theta [{theta}] with learning rate {learning_rate}");
    }

    fn on_iteration(&mut self, report: &IterationReport<'_>) {
        log::debug!(
            "Iteration {}: cost {:.6e}, gradient {}, theta [{}], learning rate {}{}",
            report.iteration,
            report.cost,
            report.gradient,
            report.theta,
            report.learning_rate,
            if report.cost_increased {
                " (decayed)"
            } else {
                ""
            }
        );
    }

    fn on_finish(&mut self, iterations: usize, cost: f64) {
        log::info!("Gradient descent reached cost {cost:.6e} after {iterations} iterations");
    }
}
