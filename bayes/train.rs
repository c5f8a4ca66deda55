// ========================================================================================
//                          Naive Bayes Training Aggregation
// ========================================================================================

use super::artifact::{ConditionalEntry, MarginalEntry, PriorEntry, TrainedClassifier};
use super::types::{Attribute, Outcome};
use crate::dataflow::{Key, PTable, PipelineError};
use itertools::Itertools;

/// The deferred probability tables produced by [`train`].
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    /// `P(attribute | outcome)`, keyed by attribute.
    pub conditionals: PTable<Attribute, (Outcome, f64)>,
    /// `P(outcome)` over all outcome records.
    pub priors: PTable<Outcome, f64>,
    /// Share of outcome records whose block contained the attribute.
    pub attribute_marginals: PTable<Attribute, f64>,
}

/// Builds the conditional, prior and marginal probability tables from
/// blocked attribute and outcome records.
///
/// Both tables must already be keyed by block (see
/// [`Blocker::block`](super::blocking::Blocker::block)). An attribute is
/// associated with every outcome recorded in the same block, and each distinct
/// attribute is counted at most once per outcome record.
///
/// Everything except the total number of outcome records stays deferred; that
/// total is evaluated here because every prior and marginal divides by it.
pub fn train(
    attributes: &PTable<i64, Attribute>,
    outcomes: &PTable<i64, Outcome>,
) -> Result<TrainingOutput, PipelineError> {
    let outcome_counts = outcomes.values().count();

    let associated: PTable<Outcome, Attribute> = PTable::from(
        outcomes
            .join("outcomes with block attributes", &attributes.distinct())
            .values(),
    );

    let regrouped: PTable<Outcome, (Attribute, u64)> = PTable::from(
        associated
            .count()
            .as_collection()
            .map("regroup pair counts by outcome", regroup_pair_count),
    );

    let conditionals: PTable<Attribute, (Outcome, f64)> = PTable::from(
        regrouped
            .join("pair counts with outcome counts", &outcome_counts)
            .as_collection()
            .map("conditional probability", conditional_probability),
    );

    let attribute_totals = associated.values().count();

    let total = outcomes.length().value()?;
    log::info!("Training over {total} outcome records.");

    let priors = probabilities(&outcome_counts, total, "outcome priors");
    let attribute_marginals = probabilities(&attribute_totals, total, "attribute marginals");

    Ok(TrainingOutput {
        conditionals,
        priors,
        attribute_marginals,
    })
}

impl TrainingOutput {
    /// Evaluates all three tables and collects them into a sorted, in-memory
    /// classifier.
    pub fn materialize(&self) -> Result<TrainedClassifier, PipelineError> {
        let conditionals = self
            .conditionals
            .materialize()?
            .iter()
            .map(|(attribute, (outcome, probability))| ConditionalEntry {
                probability: *probability,
                attribute: attribute.clone(),
                outcome: outcome.clone(),
            })
            .sorted_by(|a, b| {
                (&a.attribute, &a.outcome).cmp(&(&b.attribute, &b.outcome))
            })
            .collect_vec();

        let impossible = conditionals.iter().filter(|c| c.probability > 1.0).count();
        if impossible > 0 {
            log::warn!(
                "{impossible} conditional probabilities exceed 1.0. Attribute/outcome pair counts were larger than the outcome counts, which means the inputs were not keyed consistently."
            );
        }

        let priors = self
            .priors
            .materialize()?
            .iter()
            .map(|(outcome, probability)| PriorEntry {
                probability: *probability,
                outcome: outcome.clone(),
            })
            .sorted_by(|a, b| a.outcome.cmp(&b.outcome))
            .collect_vec();

        let attribute_marginals = self
            .attribute_marginals
            .materialize()?
            .iter()
            .map(|(attribute, probability)| MarginalEntry {
                probability: *probability,
                attribute: attribute.clone(),
            })
            .sorted_by(|a, b| a.attribute.cmp(&b.attribute))
            .collect_vec();

        log::info!(
            "Materialized {} conditional probabilities, {} priors and {} attribute marginals.",
            conditionals.len(),
            priors.len(),
            attribute_marginals.len()
        );

        Ok(TrainedClassifier {
            conditionals,
            priors,
            attribute_marginals,
        })
    }
}

/// Moves the outcome out of a pair count key so the count can be joined with
/// the outcome's own total.
pub fn regroup_pair_count(
    ((outcome, attribute), count): &((Outcome, Attribute), u64),
) -> (Outcome, (Attribute, u64)) {
    (outcome.clone(), (attribute.clone(), *count))
}

/// `P(attribute | outcome) = pair count / outcome count`, re-keyed by attribute.
pub fn conditional_probability(
    (outcome, ((attribute, pair_count), outcome_count)): &(Outcome, ((Attribute, u64), u64)),
) -> (Attribute, (Outcome, f64)) {
    (
        attribute.clone(),
        (outcome.clone(), ratio(*pair_count, *outcome_count)),
    )
}

/// Divides every count by `total`.
pub fn probabilities<T: Key>(counts: &PTable<T, u64>, total: u64, label: &str) -> PTable<T, f64> {
    counts.map_values(label, move |count| ratio(*count, total))
}

/// `numerator / denominator` as a float. Exact while both counts stay below
/// 2^53. A zero denominator yields a non-finite value, which cannot happen for
/// counts drawn from the same records.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 / denominator as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::{Pipeline, PipelineConfig};
    use approx::assert_relative_eq;

    fn pipeline() -> Pipeline {
        Pipeline::new(&PipelineConfig { threads: Some(4) }).unwrap()
    }

    fn attribute(value: &str) -> Attribute {
        Attribute::builder()
            .namespace("KEYWORD")
            .value(value)
            .build()
            .unwrap()
    }

    fn outcome(value: &str) -> Outcome {
        Outcome::builder().value(value).build().unwrap()
    }

    #[test]
    fn conditional_probability_divides_pair_count_by_outcome_count() {
        let cases = [(10, 5, 0.5), (20, 10, 0.5), (3, 3, 1.0), (4, 1, 0.25)];
        for (outcome_count, pair_count, expected) in cases {
            let row = (outcome("late"), ((attribute("rain"), pair_count), outcome_count));
            let (a, (o, p)) = conditional_probability(&row);
            assert_eq!(a, attribute("rain"));
            assert_eq!(o, outcome("late"));
            assert_relative_eq!(p, expected);
        }
    }

    #[test]
    fn priors_divide_by_total_records() {
        let p = pipeline();
        let mut outcomes = Vec::new();
        for (value, repeats) in [("a", 4), ("b", 2), ("c", 1), ("d", 1)] {
            for day in 0..repeats {
                outcomes.push((i64::from(day), outcome(value)));
            }
        }
        let outcomes = p.table_of("outcomes", outcomes);
        let attributes = p.table_of("attributes", Vec::<(i64, Attribute)>::new());

        let output = train(&attributes, &outcomes).unwrap();
        let priors = output.priors.as_map().unwrap();
        assert_eq!(priors.len(), 4);
        assert_relative_eq!(priors[&outcome("a")], 0.5);
        assert_relative_eq!(priors[&outcome("b")], 0.25);
        assert_relative_eq!(priors[&outcome("c")], 0.125);
        assert_relative_eq!(priors[&outcome("d")], 0.125);
        assert_relative_eq!(priors.values().sum::<f64>(), 1.0);
        assert!(output.conditionals.materialize().unwrap().is_empty());
    }

    #[test]
    fn probabilities_scale_without_clamping() {
        let p = pipeline();
        let counts = p.table_of("counts", vec![("a", 100_u64), ("b", 200), ("c", 250)]);
        let scaled = probabilities(&counts, 100, "scale").as_map().unwrap();
        assert_relative_eq!(scaled[&"a"], 1.0);
        assert_relative_eq!(scaled[&"b"], 2.0);
        assert_relative_eq!(scaled[&"c"], 2.5);
    }

    #[test]
    fn regrouping_keeps_every_pair() {
        let p = pipeline();
        let mut pairs = vec![(outcome("o1"), attribute("a1")); 5];
        pairs.push((outcome("o2"), attribute("a2")));
        pairs.push((outcome("o3"), attribute("a1")));

        let counts = p.table_of("pairs", pairs).count();
        let mut regrouped = counts
            .as_collection()
            .map("regroup", regroup_pair_count)
            .materialize()
            .unwrap()
            .to_vec();
        regrouped.sort();
        assert_eq!(
            regrouped,
            vec![
                (outcome("o1"), (attribute("a1"), 5)),
                (outcome("o2"), (attribute("a2"), 1)),
                (outcome("o3"), (attribute("a1"), 1)),
            ]
        );
    }

    #[test]
    fn attributes_count_once_per_outcome_record() {
        let p = pipeline();
        // Day 0 repeats the same attribute; it still counts once for "late".
        let attributes = p.table_of(
            "attributes",
            vec![
                (0, attribute("rain")),
                (0, attribute("rain")),
                (1, attribute("rain")),
                (1, attribute("wind")),
            ],
        );
        let outcomes = p.table_of(
            "outcomes",
            vec![(0, outcome("late")), (1, outcome("late")), (2, outcome("on-time"))],
        );

        let model = train(&attributes, &outcomes).unwrap().materialize().unwrap();

        let lookup = |a: &str, o: &str| {
            model
                .conditionals
                .iter()
                .find(|c| c.attribute == attribute(a) && c.outcome == outcome(o))
                .map(|c| c.probability)
        };
        assert_relative_eq!(lookup("rain", "late").unwrap(), 1.0);
        assert_relative_eq!(lookup("wind", "late").unwrap(), 0.5);
        assert_eq!(lookup("rain", "on-time"), None);

        let marginal = |a: &str| {
            model
                .attribute_marginals
                .iter()
                .find(|m| m.attribute == attribute(a))
                .map(|m| m.probability)
        };
        assert_relative_eq!(marginal("rain").unwrap(), 2.0 / 3.0);
        assert_relative_eq!(marginal("wind").unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn outcomes_sharing_a_block_each_receive_its_attributes() {
        let p = pipeline();
        let attributes = p.table_of(
            "attributes",
            vec![(0, attribute("x")), (0, attribute("x")), (1, attribute("x"))],
        );
        let outcomes = p.table_of(
            "outcomes",
            vec![(0, outcome("A")), (0, outcome("B")), (1, outcome("A"))],
        );

        let model = train(&attributes, &outcomes).unwrap().materialize().unwrap();

        let conditionals: Vec<(Outcome, f64)> = model
            .conditionals
            .iter()
            .map(|c| (c.outcome.clone(), c.probability))
            .collect();
        assert_eq!(conditionals.len(), 2);
        assert_eq!(conditionals[0].0, outcome("A"));
        assert_relative_eq!(conditionals[0].1, 1.0);
        assert_eq!(conditionals[1].0, outcome("B"));
        assert_relative_eq!(conditionals[1].1, 1.0);

        assert_eq!(model.priors.len(), 2);
        assert_eq!(model.priors[0].outcome, outcome("A"));
        assert_relative_eq!(model.priors[0].probability, 2.0 / 3.0);
        assert_eq!(model.priors[1].outcome, outcome("B"));
        assert_relative_eq!(model.priors[1].probability, 1.0 / 3.0);

        assert_eq!(model.attribute_marginals.len(), 1);
        assert_eq!(model.attribute_marginals[0].attribute, attribute("x"));
        assert_relative_eq!(model.attribute_marginals[0].probability, 1.0);
    }

    #[test]
    fn regroup_and_rejoin_preserve_join_cardinality() {
        let p = pipeline();
        let attributes = p.table_of(
            "attributes",
            vec![
                (0, attribute("a")),
                (0, attribute("b")),
                (0, attribute("b")),
                (1, attribute("a")),
                (2, attribute("c")),
            ],
        );
        let outcomes = p.table_of(
            "outcomes",
            vec![(0, outcome("x")), (1, outcome("x")), (2, outcome("y")), (3, outcome("y"))],
        );

        let associated = outcomes.join("join", &attributes.distinct()).values();
        let joined = associated.length().value().unwrap();
        assert_eq!(joined, 4);

        let pair_counts = PTable::from(associated).count();
        let regrouped = PTable::from(
            pair_counts
                .as_collection()
                .map("regroup", regroup_pair_count),
        );
        let rejoined = regrouped
            .join("rejoin", &outcomes.values().count())
            .materialize()
            .unwrap();
        let total: u64 = rejoined.iter().map(|(_, ((_, count), _))| count).sum();
        assert_eq!(total, joined);
        assert_eq!(rejoined.len(), 3);

        let model = train(&attributes, &outcomes).unwrap().materialize().unwrap();
        assert_eq!(model.conditionals.len(), rejoined.len());
    }

    #[test]
    fn empty_inputs_train_empty_tables() {
        let p = pipeline();
        let attributes = p.table_of("attributes", Vec::<(i64, Attribute)>::new());
        let outcomes = p.table_of("outcomes", Vec::<(i64, Outcome)>::new());
        let model = train(&attributes, &outcomes).unwrap().materialize().unwrap();
        assert!(model.conditionals.is_empty());
        assert!(model.priors.is_empty());
        assert!(model.attribute_marginals.is_empty());
    }
}
