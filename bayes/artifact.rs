// ========================================================================================
//                        Trained Classifier Persistence
// ========================================================================================

use super::predict::{Posterior, predict};
use super::train::TrainingOutput;
use super::types::{Attribute, Outcome};
use crate::dataflow::{Pipeline, PipelineError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write the model file: {0}")]
    Io(#[from] io::Error),

    #[error("The model file is not valid TOML for a trained classifier: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize the trained classifier: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One `P(attribute | outcome)` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalEntry {
    pub probability: f64,
    pub attribute: Attribute,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorEntry {
    pub probability: f64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalEntry {
    pub probability: f64,
    pub attribute: Attribute,
}

/// The materialized probability tables of a trained classifier. This is the
/// unit that is written to and read from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedClassifier {
    #[serde(default, rename = "conditional")]
    pub conditionals: Vec<ConditionalEntry>,
    #[serde(default, rename = "prior")]
    pub priors: Vec<PriorEntry>,
    #[serde(default, rename = "marginal")]
    pub attribute_marginals: Vec<MarginalEntry>,
}

impl TrainedClassifier {
    /// Saves the classifier to a human-readable TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        log::info!(
            "Saved classifier with {} outcomes to {}",
            self.priors.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&text)?;
        log::info!(
            "Loaded classifier with {} conditional probabilities from {}",
            model.conditionals.len(),
            path.display()
        );
        Ok(model)
    }

    /// Loads the tables back into `pipeline` as deferred tables.
    pub fn to_tables(&self, pipeline: &Pipeline) -> TrainingOutput {
        TrainingOutput {
            conditionals: pipeline.table_of(
                "conditional probabilities",
                self.conditionals
                    .iter()
                    .map(|c| (c.attribute.clone(), (c.outcome.clone(), c.probability)))
                    .collect(),
            ),
            priors: pipeline.table_of(
                "outcome priors",
                self.priors
                    .iter()
                    .map(|p| (p.outcome.clone(), p.probability))
                    .collect(),
            ),
            attribute_marginals: pipeline.table_of(
                "attribute marginals",
                self.attribute_marginals
                    .iter()
                    .map(|m| (m.attribute.clone(), m.probability))
                    .collect(),
            ),
        }
    }

    /// Scores every outcome against the observed attributes.
    pub fn predict(
        &self,
        pipeline: &Pipeline,
        observed: &[Attribute],
    ) -> Result<Posterior, PipelineError> {
        let tables = self.to_tables(pipeline);
        predict(&tables.conditionals, &tables.priors, observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::PipelineConfig;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn attribute(namespace: &str, value: &str) -> Attribute {
        Attribute::builder()
            .namespace(namespace)
            .value(value)
            .build()
            .unwrap()
    }

    fn sample() -> TrainedClassifier {
        let late = Outcome::builder()
            .namespace("FLIGHT")
            .value("late")
            .qualifier("over 30m")
            .build()
            .unwrap();
        let on_time = Outcome::builder().value("on-time").build().unwrap();
        TrainedClassifier {
            conditionals: vec![
                ConditionalEntry {
                    probability: 0.5,
                    attribute: attribute("WEATHER", "rain"),
                    outcome: late.clone(),
                },
                ConditionalEntry {
                    probability: 0.8,
                    attribute: attribute("WEATHER", "wind"),
                    outcome: late.clone(),
                },
                ConditionalEntry {
                    probability: 0.1,
                    attribute: attribute("WEATHER", "rain"),
                    outcome: on_time.clone(),
                },
            ],
            priors: vec![
                PriorEntry {
                    probability: 0.25,
                    outcome: late,
                },
                PriorEntry {
                    probability: 0.75,
                    outcome: on_time,
                },
            ],
            attribute_marginals: vec![MarginalEntry {
                probability: 0.4,
                attribute: attribute("WEATHER", "rain"),
            }],
        }
    }

    #[test]
    fn toml_file_restores_the_same_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let model = sample();

        model.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[conditional]]"));
        assert!(text.contains("[[prior]]"));
        assert!(text.contains("[[marginal]]"));

        assert_eq!(TrainedClassifier::load(&path).unwrap(), model);
    }

    #[test]
    fn empty_classifier_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        TrainedClassifier::default().save(&path).unwrap();
        assert_eq!(
            TrainedClassifier::load(&path).unwrap(),
            TrainedClassifier::default()
        );
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[prior]]\nprobability = \"high\"\n").unwrap();
        assert!(matches!(
            TrainedClassifier::load(&path),
            Err(ModelError::Parse(_))
        ));
        assert!(matches!(
            TrainedClassifier::load(&dir.path().join("missing.toml")),
            Err(ModelError::Io(_))
        ));
    }

    #[test]
    fn loaded_classifier_predicts() {
        let pipeline = Pipeline::new(&PipelineConfig { threads: Some(2) }).unwrap();
        let posterior = sample()
            .predict(
                &pipeline,
                &[attribute("WEATHER", "rain"), attribute("WEATHER", "wind")],
            )
            .unwrap();
        let scores = posterior.scores();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].0.value(), "late");
        assert_relative_eq!(scores[0].1, 0.5 * 0.8 * 0.25);
        assert_eq!(scores[1].0.value(), "on-time");
        assert_relative_eq!(scores[1].1, 0.1 * 0.75);
    }
}
