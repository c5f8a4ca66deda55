// ========================================================================================
//                              Posterior Scoring
// ========================================================================================

use super::types::{Attribute, Outcome};
use crate::dataflow::{PTable, PipelineError, Product};
use ahash::AHashSet;
use itertools::Itertools;
use std::cmp::Ordering;
use std::sync::Arc;

/// Accepts conditional probabilities whose attribute was observed.
#[derive(Debug, Clone, Default)]
pub struct AttributeFilter {
    observed: Arc<AHashSet<Attribute>>,
}

impl AttributeFilter {
    pub fn new(observed: impl IntoIterator<Item = Attribute>) -> Self {
        Self {
            observed: Arc::new(observed.into_iter().collect()),
        }
    }

    pub fn accepts(&self, attribute: &Attribute) -> bool {
        self.observed.contains(attribute)
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

/// Unnormalized posterior scores, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Posterior {
    scores: Vec<(Outcome, f64)>,
}

impl Posterior {
    /// Orders scores descending. Equal scores fall back to ascending outcome
    /// order so repeated runs render identically.
    pub fn from_scores(scores: impl IntoIterator<Item = (Outcome, f64)>) -> Self {
        let scores = scores
            .into_iter()
            .sorted_by(|(a_outcome, a_score), (b_outcome, b_score)| {
                match b_score.total_cmp(a_score) {
                    Ordering::Equal => a_outcome.cmp(b_outcome),
                    unequal => unequal,
                }
            })
            .collect();
        Self { scores }
    }

    pub fn scores(&self) -> &[(Outcome, f64)] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn best(&self) -> Option<&(Outcome, f64)> {
        self.scores.first()
    }

    pub fn score_of(&self, outcome: &Outcome) -> Option<f64> {
        self.scores
            .iter()
            .find(|(candidate, _)| candidate == outcome)
            .map(|(_, score)| *score)
    }

    /// Rescales the scores to sum to 1.0. A posterior whose scores sum to zero
    /// is returned unchanged.
    pub fn normalized(&self) -> Posterior {
        let total: f64 = self.scores.iter().map(|(_, score)| score).sum();
        if total <= 0.0 || !total.is_finite() {
            return self.clone();
        }
        Posterior {
            scores: self
                .scores
                .iter()
                .map(|(outcome, score)| (outcome.clone(), score / total))
                .collect(),
        }
    }
}

/// Scores every outcome against the observed attributes:
/// `score(o) = P(o) * product of P(a | o)` over observed attributes `a` that
/// have a conditional probability for `o`.
///
/// Outcomes with no matching conditional probability are left out rather than
/// scored by their prior alone. Attributes that never occurred in training are
/// ignored.
pub fn predict(
    conditionals: &PTable<Attribute, (Outcome, f64)>,
    priors: &PTable<Outcome, f64>,
    observed: &[Attribute],
) -> Result<Posterior, PipelineError> {
    let filter = AttributeFilter::new(observed.iter().cloned());
    log::debug!("Scoring outcomes against {} distinct observed attributes", filter.len());

    let matched = conditionals.filter("observed attributes", move |attribute, _| {
        filter.accepts(attribute)
    });
    let likelihoods: PTable<Outcome, f64> = PTable::from(matched.values())
        .group_by_key()
        .combine_values("attribute likelihood", Product);
    let scores = likelihoods
        .join("likelihood with prior", priors)
        .map_values("posterior score", |(likelihood, prior)| likelihood * prior)
        .materialize()?;

    Ok(Posterior::from_scores(scores.iter().cloned()))
}
