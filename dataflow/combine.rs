//! Associative, commutative reductions used by every aggregation in the engine.
//!
//! The evaluator splits its input at arbitrary points, folds each split into a
//! partial result and merges partials in whatever order the worker threads
//! finish. A combiner therefore has to give the same answer for any grouping
//! and any ordering of its inputs.

use super::collection::{Element, Key};
use ahash::AHashMap;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::ops::{Add, Mul};

/// A reduction with an identity element.
///
/// Implementations must satisfy, for all `a`, `b`, `c`:
/// `combine(a, combine(b, c)) == combine(combine(a, b), c)`,
/// `combine(a, b) == combine(b, a)` and `combine(identity(), a) == a`.
pub trait Combiner<V>: Send + Sync {
    fn identity(&self) -> V;
    fn combine(&self, left: V, right: V) -> V;
}

/// Addition. Used for counts and for summing per-row cost and gradient terms.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl<V> Combiner<V> for Sum
where
    V: Element + Add<Output = V> + std::iter::Sum<V>,
{
    fn identity(&self) -> V {
        std::iter::empty::<V>().sum()
    }

    fn combine(&self, left: V, right: V) -> V {
        left + right
    }
}

/// Multiplication. Used to compose independent conditional probabilities.
#[derive(Clone, Copy, Debug, Default)]
pub struct Product;

impl<V> Combiner<V> for Product
where
    V: Element + Mul<Output = V> + std::iter::Product<V>,
{
    fn identity(&self) -> V {
        std::iter::empty::<V>().product()
    }

    fn combine(&self, left: V, right: V) -> V {
        left * right
    }
}

/// Folds keyed values into one combined value per key.
///
/// Each worker folds its own split into a private map, and the partial maps
/// are merged pairwise. No ordering of the input is assumed.
pub(crate) fn fold_by_key<K, V, C, I>(pairs: I, combiner: &C) -> AHashMap<K, V>
where
    K: Key,
    V: Element,
    C: Combiner<V>,
    I: ParallelIterator<Item = (K, V)>,
{
    pairs
        .fold(AHashMap::new, |mut partial, (key, value)| {
            merge_value(&mut partial, key, value, combiner);
            partial
        })
        .reduce(AHashMap::new, |left, right| {
            // Merge the smaller map into the larger one.
            let (mut target, source) = if left.len() >= right.len() {
                (left, right)
            } else {
                (right, left)
            };
            for (key, value) in source {
                merge_value(&mut target, key, value, combiner);
            }
            target
        })
}

fn merge_value<K, V, C>(map: &mut AHashMap<K, V>, key: K, value: V, combiner: &C)
where
    K: Key,
    V: Element,
    C: Combiner<V>,
{
    match map.entry(key) {
        Entry::Occupied(mut slot) => {
            let current = std::mem::replace(slot.get_mut(), combiner.identity());
            *slot.get_mut() = combiner.combine(current, value);
        }
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
    }
}
