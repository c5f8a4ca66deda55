#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use omen::bayes::{Attribute, TrainedClassifier, train, write_report};
use omen::config::OmenConfig;
use omen::data::{load_attributes, load_observed, load_outcomes, load_rows};
use omen::dataflow::Pipeline;
use omen::learn::{Coefficients, DescentObserver, GradientDescent, IterationReport};

#[derive(Parser)]
#[command(
    name = "omen",
    about = "Naive Bayes over blocked event streams, plus regularized linear regression",
    long_about = "Trains a naive Bayes classifier from timestamped attribute and outcome records, \
                 scores observed attributes against a trained classifier, and fits linear \
                 models with batch gradient descent."
)]
struct Cli {
    /// Optional TOML configuration with [pipeline], [blocking] and [descent] sections
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Worker threads; defaults to one per logical CPU
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a classifier from attribute and outcome records
    Train(TrainArgs),
    /// Score observed attributes against a trained classifier
    Predict(PredictArgs),
    /// Fit a linear model with gradient descent
    Fit(FitArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Attribute records with timestamp,namespace,value,qualifier columns
    #[arg(long, value_name = "PATH")]
    attributes: PathBuf,

    /// Outcome records with timestamp,namespace,value,qualifier columns
    #[arg(long, value_name = "PATH")]
    outcomes: PathBuf,

    /// Where to write the trained classifier
    #[arg(long, default_value = "model.toml")]
    output: PathBuf,

    /// Block width in milliseconds; defaults to one day
    #[arg(long, value_name = "MILLIS")]
    block_width: Option<i64>,

    /// Print the evaluation plan of the conditional probability table
    #[arg(long)]
    show_plan: bool,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained classifier (.toml)
    #[arg(long, value_name = "PATH")]
    model: PathBuf,

    /// File of observed attributes with namespace,value,qualifier columns
    #[arg(long, value_name = "PATH")]
    observed: Option<PathBuf>,

    /// An observed attribute as NAMESPACE:VALUE[:QUALIFIER]; may be repeated
    #[arg(long = "attribute", value_name = "ATTRIBUTE")]
    attributes: Vec<Attribute>,

    /// Write the column header before the scores
    #[arg(long)]
    header: bool,

    /// Rescale scores to sum to one
    #[arg(long)]
    normalize: bool,
}

#[derive(Args)]
struct FitArgs {
    /// Regression rows; first column is the target, the rest are features
    #[arg(long, value_name = "PATH")]
    data: PathBuf,

    /// Initial parameters as comma-separated values, bias first; defaults to zeros
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    theta: Option<Vec<f64>>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Regularization weight; zero or negative disables it
    #[arg(long, allow_hyphen_values = true)]
    lambda: Option<f64>,

    #[arg(long)]
    cost_threshold: Option<f64>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Iterate until the cost threshold is reached, however long it takes
    #[arg(long, conflicts_with = "max_iterations")]
    unbounded: bool,
}

/// Spinner on stderr that shows the cost of the latest iteration.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(10)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        if let Ok(style) = ProgressStyle::with_template("> [{elapsed_precise}] {spinner} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl DescentObserver for SpinnerObserver {
    fn on_iteration(&mut self, report: &IterationReport<'_>) {
        self.bar.set_message(format!(
            "iteration {} cost {:.6e} learning rate {}",
            report.iteration, report.cost, report.learning_rate
        ));
    }

    fn on_finish(&mut self, iterations: usize, cost: f64) {
        self.bar
            .finish_with_message(format!("converged after {iterations} iterations, cost {cost:.6e}"));
    }
}

impl Drop for SpinnerObserver {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

fn load_config(cli: &Cli) -> Result<OmenConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => OmenConfig::load(path)?,
        None => OmenConfig::default(),
    };
    if cli.threads.is_some() {
        config.pipeline.threads = cli.threads;
    }
    Ok(config)
}

fn run_train(config: OmenConfig, args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let width = args.block_width.unwrap_or(config.blocking.width_millis);
    let blocker = omen::bayes::Blocker::new(width)?;

    eprintln!("> Loading attributes from {}", args.attributes.display());
    let attributes = load_attributes(&args.attributes)?;
    eprintln!("> Loading outcomes from {}", args.outcomes.display());
    let outcomes = load_outcomes(&args.outcomes)?;
    eprintln!(
        "> Loaded {} attribute and {} outcome records",
        attributes.len(),
        outcomes.len()
    );

    let pipeline = Pipeline::new(&config.pipeline)?;
    eprintln!(
        "> Training with {}ms blocks on {} threads",
        blocker.width(),
        pipeline.threads()
    );
    let attributes = blocker.block(&pipeline.table_of("attributes", attributes));
    let outcomes = blocker.block(&pipeline.table_of("outcomes", outcomes));

    let output = train(&attributes, &outcomes)?;
    if args.show_plan {
        eprintln!("{}", output.conditionals.lineage());
    }
    let classifier = output.materialize()?;
    classifier.save(&args.output)?;
    eprintln!(
        "> Saved {} conditional probabilities over {} outcomes to {}",
        classifier.conditionals.len(),
        classifier.priors.len(),
        args.output.display()
    );
    Ok(())
}

fn run_predict(config: OmenConfig, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let classifier = TrainedClassifier::load(&args.model)?;
    let mut observed = args.attributes;
    if let Some(path) = &args.observed {
        observed.extend(load_observed(path)?);
    }
    if observed.is_empty() {
        eprintln!("> No observed attributes were given; every outcome will be left out.");
    }

    let pipeline = Pipeline::new(&config.pipeline)?;
    let mut posterior = classifier.predict(&pipeline, &observed)?;
    if args.normalize {
        posterior = posterior.normalized();
    }
    write_report(&posterior, std::io::stdout().lock(), args.header)?;
    Ok(())
}

fn run_fit(config: OmenConfig, args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut descent_config = config.descent;
    if let Some(learning_rate) = args.learning_rate {
        descent_config.learning_rate = learning_rate;
    }
    if args.lambda.is_some() {
        descent_config.lambda = args.lambda;
    }
    if let Some(cost_threshold) = args.cost_threshold {
        descent_config.cost_threshold = cost_threshold;
    }
    if args.max_iterations.is_some() {
        descent_config.max_iterations = args.max_iterations;
    }
    if args.unbounded {
        descent_config.max_iterations = None;
    }
    let descent = GradientDescent::new(descent_config)?;

    eprintln!("> Loading regression rows from {}", args.data.display());
    let rows = load_rows(&args.data)?;
    let initial = match args.theta {
        Some(values) => Coefficients::from(values),
        None => Coefficients::zeros_for_features(rows.first().map_or(0, |row| row.len() - 1)),
    };
    eprintln!("> Fitting {} parameters over {} rows", initial.len(), rows.len());

    let pipeline = Pipeline::new(&config.pipeline)?;
    let dataset = pipeline.collection_of("regression rows", rows);
    let mut observer = SpinnerObserver::new();
    let outcome = descent.run_with_observer(&dataset, &initial, &mut observer)?;

    eprintln!(
        "> Converged after {} iterations with cost {:.6e} (final learning rate {})",
        outcome.iterations, outcome.cost, outcome.learning_rate
    );
    println!("{}", outcome.theta);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match load_config(&cli) {
        Err(e) => Err(e),
        Ok(config) => match cli.command {
            Some(Commands::Train(args)) => run_train(config, args),
            Some(Commands::Predict(args)) => run_predict(config, args),
            Some(Commands::Fit(args)) => run_fit(config, args),
            None => Cli::command().print_help().map_err(Into::into),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
