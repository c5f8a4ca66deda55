use super::collection::{Element, Key, PCollection, PObject, PipelineError};
use super::combine::{Combiner, fold_by_key};
use super::stage::{Operation, Stage};
use ahash::AHashMap;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// A deferred, unordered collection of key/value pairs. Keys are not unique.
pub struct PTable<K, V> {
    pairs: PCollection<(K, V)>,
}

impl<K, V> Clone for PTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
        }
    }
}

impl<K, V> fmt::Debug for PTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PTable").field(&self.pairs).finish()
    }
}

impl<K: Key, V: Element> From<PCollection<(K, V)>> for PTable<K, V> {
    fn from(pairs: PCollection<(K, V)>) -> Self {
        Self { pairs }
    }
}

impl<K: Key, V: Element> PTable<K, V> {
    pub fn as_collection(&self) -> &PCollection<(K, V)> {
        &self.pairs
    }

    pub fn stage(&self) -> &Arc<Stage> {
        self.pairs.stage()
    }

    pub fn lineage(&self) -> String {
        self.pairs.lineage()
    }

    pub fn materialize(&self) -> Result<Arc<Vec<(K, V)>>, PipelineError> {
        self.pairs.materialize()
    }

    /// Materializes the table into a map. When a key occurs more than once,
    /// which of its values survives is unspecified; callers that need every
    /// value should combine by key first.
    pub fn as_map(&self) -> Result<AHashMap<K, V>, PipelineError> {
        let pairs = self.pairs.materialize()?;
        Ok(pairs.iter().cloned().collect())
    }

    pub fn length(&self) -> PObject<u64> {
        self.pairs.length()
    }

    pub fn keys(&self) -> PCollection<K> {
        let label = format!("keys of {}", self.stage().label());
        self.pairs.map(&label, |(key, _)| key.clone())
    }

    pub fn values(&self) -> PCollection<V> {
        let label = format!("values of {}", self.stage().label());
        self.pairs.map(&label, |(_, value)| value.clone())
    }

    pub fn map_values<W, F>(&self, label: &str, f: F) -> PTable<K, W>
    where
        W: Element,
        F: Fn(&V) -> W + Send + Sync + 'static,
    {
        PTable::from(self.pairs.map(label, move |(key, value)| (key.clone(), f(value))))
    }

    pub fn filter<F>(&self, label: &str, predicate: F) -> PTable<K, V>
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        PTable::from(self.pairs.filter(label, move |(key, value)| predicate(key, value)))
    }

    /// Groups values sharing a key. Grouping is fused with the reduction that
    /// follows it, so nothing is evaluated until values are combined.
    pub fn group_by_key(&self) -> PGroupedTable<K, V> {
        let label = format!("group {}", self.stage().label());
        let stage = self
            .pairs
            .new_stage(Operation::GroupByKey, &label, vec![Arc::clone(self.stage())]);
        PGroupedTable {
            table: self.clone(),
            stage,
        }
    }

    /// Inner join on equal keys: one output pair for every combination of a
    /// left value and a right value that share a key.
    pub fn join<W: Element>(&self, label: &str, right: &PTable<K, W>) -> PTable<K, (V, W)> {
        let left = self.clone();
        let right = right.clone();
        let upstream = vec![Arc::clone(left.stage()), Arc::clone(right.stage())];
        PTable::from(self.pairs.derive(Operation::Join, label, upstream, move |context| {
            let left_pairs = left.materialize()?;
            let right_pairs = right.materialize()?;
            let joined = context.install(|| {
                let index: AHashMap<K, Vec<W>> = right_pairs
                    .par_iter()
                    .fold(AHashMap::new, |mut partial: AHashMap<K, Vec<W>>, (key, value)| {
                        partial.entry(key.clone()).or_default().push(value.clone());
                        partial
                    })
                    .reduce(AHashMap::new, |mut merged, partial| {
                        for (key, mut values) in partial {
                            merged.entry(key).or_default().append(&mut values);
                        }
                        merged
                    });
                left_pairs
                    .par_iter()
                    .flat_map_iter(|(key, value)| {
                        index.get(key).into_iter().flatten().map(move |matched| {
                            (key.clone(), (value.clone(), matched.clone()))
                        })
                    })
                    .collect::<Vec<(K, (V, W))>>()
            });
            Ok(joined)
        }))
    }
}

impl<K: Key, V: Key> PTable<K, V> {
    /// Distinct key/value pairs.
    pub fn distinct(&self) -> PTable<K, V> {
        PTable::from(self.pairs.distinct())
    }

    /// Occurrences of every distinct key/value pair.
    pub fn count(&self) -> PTable<(K, V), u64> {
        self.pairs.count()
    }
}

/// A table whose values are grouped by key, awaiting a reduction.
pub struct PGroupedTable<K, V> {
    table: PTable<K, V>,
    stage: Arc<Stage>,
}

impl<K: Key, V: Element> PGroupedTable<K, V> {
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// Reduces every group to a single value with an associative, commutative
    /// combiner.
    pub fn combine_values<C>(&self, label: &str, combiner: C) -> PTable<K, V>
    where
        C: Combiner<V> + 'static,
    {
        let table = self.table.clone();
        PTable::from(self.table.pairs.derive(
            Operation::CombineValues,
            label,
            vec![Arc::clone(&self.stage)],
            move |context| {
                let pairs = table.materialize()?;
                let combined = context.install(|| fold_by_key(pairs.par_iter().cloned(), &combiner));
                Ok(combined.into_iter().collect())
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::collection::{Pipeline, PipelineConfig};
    use crate::dataflow::combine::{Product, Sum};

    fn pipeline() -> Pipeline {
        Pipeline::new(&PipelineConfig { threads: Some(3) }).expect("pipeline")
    }

    fn sorted<T: Ord + Clone>(values: &[T]) -> Vec<T> {
        let mut out = values.to_vec();
        out.sort();
        out
    }

    #[test]
    fn join_emits_every_matching_combination() {
        let p = pipeline();
        let left = p.table_of("left", vec![(1, "a"), (1, "b"), (2, "c"), (3, "d")]);
        let right = p.table_of("right", vec![(1, 10), (1, 11), (2, 20), (4, 40)]);

        let joined = left.join("left with right", &right).materialize().unwrap();
        assert_eq!(
            sorted(&joined),
            vec![
                (1, ("a", 10)),
                (1, ("a", 11)),
                (1, ("b", 10)),
                (1, ("b", 11)),
                (2, ("c", 20)),
            ]
        );
    }

    #[test]
    fn combine_values_reduces_each_group() {
        let p = pipeline();
        let scores = p.table_of(
            "scores",
            vec![("x", 0.5), ("y", 0.25), ("x", 0.8), ("z", 2.0)],
        );
        let products = scores
            .group_by_key()
            .combine_values("multiply", Product)
            .as_map()
            .unwrap();
        assert_eq!(products.len(), 3);
        assert_eq!(products[&"x"], 0.5 * 0.8);
        assert_eq!(products[&"y"], 0.25);
        assert_eq!(products[&"z"], 2.0);

        let sums = p
            .table_of("indices", (0..100_usize).map(|i| (i % 4, 1.0)).collect())
            .group_by_key()
            .combine_values("sum", Sum)
            .as_map()
            .unwrap();
        assert!(sums.values().all(|&total| total == 25.0));
    }

    #[test]
    fn distinct_keys_values_and_counts() {
        let p = pipeline();
        let table = p.table_of("events", vec![(7, 'a'), (7, 'a'), (7, 'b'), (8, 'a')]);

        assert_eq!(
            sorted(&table.distinct().materialize().unwrap()),
            vec![(7, 'a'), (7, 'b'), (8, 'a')]
        );
        assert_eq!(
            sorted(&table.keys().materialize().unwrap()),
            vec![7, 7, 7, 8]
        );
        assert_eq!(
            sorted(&table.values().distinct().materialize().unwrap()),
            vec!['a', 'b']
        );
        let counts = table.count().as_map().unwrap();
        assert_eq!(counts[&(7, 'a')], 2);
        assert_eq!(counts[&(7, 'b')], 1);
        assert_eq!(counts[&(8, 'a')], 1);
        assert_eq!(table.length().value().unwrap(), 4);
    }

    #[test]
    fn map_values_and_filter_keep_keys() {
        let p = pipeline();
        let table = p.table_of("raw", vec![(1, 2.0), (2, 3.0), (3, 4.0)]);
        let squared = table
            .map_values("square", |v: &f64| v * v)
            .filter("drop key 2", |key, _| *key != 2);
        let map = squared.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], 4.0);
        assert_eq!(map[&3], 16.0);
    }

    #[test]
    fn grouped_stage_sits_between_table_and_combine() {
        let p = pipeline();
        let table = p.table_of("pairs", vec![(1_u8, 1_u64)]);
        let grouped = table.group_by_key();
        let combined = grouped.combine_values("total", Sum);

        let upstream = combined.stage().upstream();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0].operation(), Operation::GroupByKey);
        assert_eq!(upstream[0].upstream()[0].operation(), Operation::Source);
        assert_eq!(grouped.stage().label(), "group pairs");
    }
}
