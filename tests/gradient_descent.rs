use approx::assert_abs_diff_eq;
use ndarray::{Array1, array};
use omen::dataflow::{PCollection, Pipeline, PipelineConfig};
use omen::learn::{
    Coefficients, DescentConfig, GradientDescent, LoggingObserver, OptimizerError, cost,
};

fn line(pipeline: &Pipeline) -> PCollection<Array1<f64>> {
    pipeline.collection_of(
        "y = 2x",
        (-2..=2)
            .map(|x| {
                let x = f64::from(x);
                array![2.0 * x, x]
            })
            .collect(),
    )
}

fn pipeline() -> Pipeline {
    Pipeline::new(&PipelineConfig { threads: Some(4) }).unwrap()
}

#[test]
fn converges_to_the_generating_line() {
    let pipeline = pipeline();
    let rows = line(&pipeline);
    let descent = GradientDescent::new(DescentConfig {
        learning_rate: 0.05,
        ..DescentConfig::default()
    })
    .unwrap();

    let outcome = descent
        .run_with_observer(&rows, &Coefficients::zeros_for_features(1), &mut LoggingObserver)
        .unwrap();

    assert!(outcome.cost <= 0.01);
    assert_abs_diff_eq!(outcome.theta[0], 0.0, epsilon = 0.5);
    assert_abs_diff_eq!(outcome.theta[1], 2.0, epsilon = 0.15);
    assert_abs_diff_eq!(cost(&rows, &outcome.theta, None).unwrap(), outcome.cost);
    assert_eq!(outcome.learning_rate, 0.05);
}

#[test]
fn overshooting_steps_decay_the_learning_rate() {
    let pipeline = pipeline();
    let rows = line(&pipeline);
    let descent = GradientDescent::new(DescentConfig {
        learning_rate: 1.1,
        ..DescentConfig::default()
    })
    .unwrap();

    let outcome = descent
        .run(&rows, &Coefficients::zeros_for_features(1))
        .unwrap();
    assert!(outcome.cost <= 0.01);
    assert!(outcome.learning_rate < 1.1);
    assert_abs_diff_eq!(outcome.theta[1], 2.0, epsilon = 0.15);
}

#[test]
fn regularization_penalizes_weights_but_not_the_bias() {
    let pipeline = pipeline();
    let rows = pipeline.collection_of(
        "offset line",
        (0..10)
            .map(|x| {
                let x = f64::from(x);
                array![1.0 + 0.5 * x, x]
            })
            .collect(),
    );
    let theta = Coefficients::from(vec![1.0, 0.5]);
    assert_abs_diff_eq!(cost(&rows, &theta, None).unwrap(), 0.0);
    // Only the weight is penalized: 3 * 0.25 / (2 * 10).
    assert_abs_diff_eq!(cost(&rows, &theta, Some(3.0)).unwrap(), 0.0375, epsilon = 1e-12);
}

#[test]
fn runaway_learning_rate_is_reported_as_divergence() {
    let pipeline = pipeline();
    let rows = line(&pipeline);
    let descent = GradientDescent::new(DescentConfig {
        learning_rate: 1e6,
        ..DescentConfig::default()
    })
    .unwrap();

    match descent.run(&rows, &Coefficients::zeros_for_features(1)) {
        Err(OptimizerError::Diverged { iteration, cost }) => {
            assert!(iteration > 1);
            assert!(!cost.is_finite());
        }
        other => panic!("expected divergence, got {other:?}"),
    }
}

#[test]
fn iteration_cap_stops_a_slow_descent() {
    let pipeline = pipeline();
    let rows = line(&pipeline);
    let descent = GradientDescent::new(DescentConfig {
        learning_rate: 0.001,
        max_iterations: Some(3),
        ..DescentConfig::default()
    })
    .unwrap();

    match descent.run(&rows, &Coefficients::zeros_for_features(1)) {
        Err(OptimizerError::DidNotConverge {
            max_iterations,
            last_cost,
            ..
        }) => {
            assert_eq!(max_iterations, 3);
            assert!(last_cost > 0.01);
        }
        other => panic!("expected the iteration cap, got {other:?}"),
    }
}

#[test]
fn row_width_must_match_theta() {
    let pipeline = pipeline();
    let rows = pipeline.collection_of("rows", vec![array![1.0, 2.0, 3.0]]);
    let descent = GradientDescent::new(DescentConfig::default()).unwrap();

    match descent.run(&rows, &Coefficients::from(vec![0.0, 0.0])) {
        Err(OptimizerError::DimensionMismatch(mismatch)) => {
            assert_eq!(mismatch.features, 2);
            assert_eq!(mismatch.expected, 1);
            assert_eq!(mismatch.row, vec![1.0, 2.0, 3.0]);
        }
        other => panic!("expected a dimension mismatch, got {other:?}"),
    }

    let empty = pipeline.collection_of("empty", Vec::<Array1<f64>>::new());
    assert!(matches!(
        descent.run(&empty, &Coefficients::zeros_for_features(1)),
        Err(OptimizerError::EmptyDataset)
    ));
}
