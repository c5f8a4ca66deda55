//! # Naive Bayes Over Blocked Event Streams
//!
//! Attributes and outcomes arrive as timestamped records. Both streams are
//! truncated to a common block (one day by default), attributes are associated
//! with every outcome recorded in the same block, and the association counts
//! become conditional probabilities `P(attribute | outcome)` next to outcome
//! priors `P(outcome)`. Prediction multiplies the conditionals of the observed
//! attributes with the prior of each outcome.

pub mod artifact;
pub mod blocking;
pub mod predict;
pub mod report;
pub mod train;
pub mod types;

pub use artifact::{ModelError, TrainedClassifier};
pub use blocking::{Blocker, BlockingError, ONE_DAY_MILLIS};
pub use predict::{AttributeFilter, Posterior, predict};
pub use report::{REPORT_HEADER, ReportError, render_report, write_report};
pub use train::{TrainingOutput, train};
pub use types::{Attribute, AttributeBuilder, BuildError, Outcome, OutcomeBuilder};
