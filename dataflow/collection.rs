use super::combine::{Combiner, Sum, fold_by_key};
use super::stage::{Operation, Stage};
use super::table::PTable;
use ahash::AHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Anything that can flow through a collection: cheap enough to clone and safe
/// to hand to any worker thread.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

/// An element that can be used as a grouping, join or counting key.
pub trait Key: Element + Eq + Hash {}

impl<T: Element + Eq + Hash> Key for T {}

/// Errors raised while building a pipeline or evaluating one of its stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed while processing an element: {source}")]
    StageFailed {
        stage: String,
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Stage '{0}' was expected to produce exactly one value but produced none.")]
    EmptySingleton(String),
}

/// Execution settings for a [`Pipeline`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of worker threads. `None` (or zero) uses one thread per logical CPU.
    pub threads: Option<usize>,
}

impl PipelineConfig {
    pub fn resolved_threads(&self) -> usize {
        self.threads
            .filter(|&threads| threads > 0)
            .unwrap_or_else(num_cpus::get)
    }
}

/// Shared state of every collection that belongs to one pipeline.
pub(crate) struct PipelineContext {
    pool: rayon::ThreadPool,
    next_stage: AtomicUsize,
}

impl PipelineContext {
    fn next_stage_id(&self) -> usize {
        self.next_stage.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `op` on the pipeline's own worker pool.
    pub(crate) fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

/// Entry point for building deferred computations.
///
/// A pipeline owns a dedicated worker pool. Collections created from it record
/// their operations without evaluating anything; work happens only when a
/// collection is materialized.
#[derive(Clone)]
pub struct Pipeline {
    context: Arc<PipelineContext>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let threads = config.resolved_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("omen-worker-{index}"))
            .build()?;
        log::debug!("Pipeline worker pool started with {threads} threads");
        Ok(Self {
            context: Arc::new(PipelineContext {
                pool,
                next_stage: AtomicUsize::new(0),
            }),
        })
    }

    pub fn threads(&self) -> usize {
        self.context.pool.current_num_threads()
    }

    /// Wraps in-memory values as the source of a deferred computation.
    pub fn collection_of<T: Element>(&self, label: &str, values: Vec<T>) -> PCollection<T> {
        let stage = self.stage(Operation::Source, label, Vec::new());
        let values = Arc::new(values);
        PCollection::from_plan(Arc::clone(&self.context), stage, move || {
            Ok(Arc::clone(&values))
        })
    }

    /// Wraps in-memory key/value pairs as the source of a deferred computation.
    pub fn table_of<K: Key, V: Element>(&self, label: &str, pairs: Vec<(K, V)>) -> PTable<K, V> {
        PTable::from(self.collection_of(label, pairs))
    }

    fn stage(&self, operation: Operation, label: &str, upstream: Vec<Arc<Stage>>) -> Arc<Stage> {
        Arc::new(Stage::new(
            self.context.next_stage_id(),
            operation,
            label,
            upstream,
        ))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("threads", &self.threads())
            .finish()
    }
}

type Plan<T> = dyn Fn() -> Result<Arc<Vec<T>>, PipelineError> + Send + Sync;

/// An immutable, lazily evaluated, unordered collection.
///
/// Cloning a collection is cheap and shares both its plan and its memoized
/// result, so a collection used by several downstream stages is evaluated
/// only once.
pub struct PCollection<T> {
    context: Arc<PipelineContext>,
    stage: Arc<Stage>,
    plan: Arc<Plan<T>>,
    cache: Arc<OnceLock<Arc<Vec<T>>>>,
}

impl<T> Clone for PCollection<T> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            stage: Arc::clone(&self.stage),
            plan: Arc::clone(&self.plan),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T> fmt::Debug for PCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PCollection")
            .field("stage", &self.stage.to_string())
            .field("materialized", &self.cache.get().is_some())
            .finish()
    }
}

impl<T: Element> PCollection<T> {
    fn from_plan<F>(context: Arc<PipelineContext>, stage: Arc<Stage>, plan: F) -> Self
    where
        F: Fn() -> Result<Arc<Vec<T>>, PipelineError> + Send + Sync + 'static,
    {
        Self {
            context,
            stage,
            plan: Arc::new(plan),
            cache: Arc::new(OnceLock::new()),
        }
    }

    /// Creates a downstream collection of this pipeline. `plan` receives the
    /// pipeline context and must materialize its own inputs.
    pub(crate) fn derive<U, F>(
        &self,
        operation: Operation,
        label: &str,
        upstream: Vec<Arc<Stage>>,
        plan: F,
    ) -> PCollection<U>
    where
        U: Element,
        F: Fn(&PipelineContext) -> Result<Vec<U>, PipelineError> + Send + Sync + 'static,
    {
        let stage = self.new_stage(operation, label, upstream);
        let context = Arc::clone(&self.context);
        PCollection::from_plan(Arc::clone(&self.context), stage, move || {
            plan(context.as_ref()).map(Arc::new)
        })
    }

    /// Allocates a stage of this collection's pipeline without attaching a plan.
    pub(crate) fn new_stage(
        &self,
        operation: Operation,
        label: &str,
        upstream: Vec<Arc<Stage>>,
    ) -> Arc<Stage> {
        Arc::new(Stage::new(
            self.context.next_stage_id(),
            operation,
            label,
            upstream,
        ))
    }

    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// Text rendering of the deferred plan that produces this collection.
    pub fn lineage(&self) -> String {
        self.stage.render_lineage()
    }

    pub fn is_materialized(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Forces evaluation of this collection and everything upstream of it.
    ///
    /// This blocks the caller until all contributing stages have finished. The
    /// result is memoized; later calls return the same shared vector. The
    /// order of the returned elements carries no meaning.
    pub fn materialize(&self) -> Result<Arc<Vec<T>>, PipelineError> {
        if let Some(values) = self.cache.get() {
            return Ok(Arc::clone(values));
        }
        log::debug!("Evaluating stage {}", self.stage);
        let values = (self.plan)()?;
        Ok(Arc::clone(self.cache.get_or_init(|| values)))
    }

    /// Applies a fallible function to every element, emitting zero or more
    /// outputs per element. The first failure aborts the stage.
    pub fn try_flat_map<U, I, E, F>(&self, label: &str, f: F) -> PCollection<U>
    where
        U: Element,
        I: IntoIterator<Item = U>,
        E: StdError + Send + Sync + 'static,
        F: Fn(&T) -> Result<I, E> + Send + Sync + 'static,
    {
        self.transform(Operation::ParallelDo, label, f)
    }

    /// Applies a fallible one-to-one function to every element.
    pub fn try_map<U, E, F>(&self, label: &str, f: F) -> PCollection<U>
    where
        U: Element,
        E: StdError + Send + Sync + 'static,
        F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
    {
        self.transform(Operation::ParallelDo, label, move |item| {
            f(item).map(std::iter::once)
        })
    }

    pub fn flat_map<U, I, F>(&self, label: &str, f: F) -> PCollection<U>
    where
        U: Element,
        I: IntoIterator<Item = U>,
        F: Fn(&T) -> I + Send + Sync + 'static,
    {
        self.transform(Operation::ParallelDo, label, move |item| {
            Ok::<_, Infallible>(f(item))
        })
    }

    pub fn map<U, F>(&self, label: &str, f: F) -> PCollection<U>
    where
        U: Element,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.transform(Operation::ParallelDo, label, move |item| {
            Ok::<_, Infallible>(std::iter::once(f(item)))
        })
    }

    pub fn filter<F>(&self, label: &str, predicate: F) -> PCollection<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.transform(Operation::Filter, label, move |item| {
            Ok::<_, Infallible>(predicate(item).then(|| item.clone()))
        })
    }

    /// Keys every element by the result of `key_fn`.
    pub fn by_key<K, F>(&self, label: &str, key_fn: F) -> PTable<K, T>
    where
        K: Key,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        PTable::from(self.map(label, move |item| (key_fn(item), item.clone())))
    }

    /// Number of elements, as a deferred singleton.
    pub fn length(&self) -> PObject<u64> {
        let upstream = self.clone();
        let label = format!("length of {}", self.stage.label());
        PObject::new(self.derive(
            Operation::Length,
            &label,
            vec![Arc::clone(&self.stage)],
            move |_| {
                let values = upstream.materialize()?;
                Ok(vec![values.len() as u64])
            },
        ))
    }

    /// Reduces all elements with `combiner`, as a deferred singleton. An empty
    /// collection reduces to the combiner's identity.
    pub fn aggregate<C>(&self, label: &str, combiner: C) -> PObject<T>
    where
        C: Combiner<T> + 'static,
    {
        let upstream = self.clone();
        PObject::new(self.derive(
            Operation::Aggregate,
            label,
            vec![Arc::clone(&self.stage)],
            move |context| {
                let values = upstream.materialize()?;
                let total = context.install(|| {
                    values
                        .par_iter()
                        .cloned()
                        .reduce(|| combiner.identity(), |a, b| combiner.combine(a, b))
                });
                Ok(vec![total])
            },
        ))
    }

    fn transform<U, I, E, F>(&self, operation: Operation, label: &str, f: F) -> PCollection<U>
    where
        U: Element,
        I: IntoIterator<Item = U>,
        E: StdError + Send + Sync + 'static,
        F: Fn(&T) -> Result<I, E> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let stage_label = label.to_string();
        self.derive(
            operation,
            label,
            vec![Arc::clone(&self.stage)],
            move |context| {
                let values = upstream.materialize()?;
                let chunks = context
                    .install(|| {
                        values
                            .par_iter()
                            .map(|item| f(item).map(|out| out.into_iter().collect::<Vec<U>>()))
                            .collect::<Result<Vec<Vec<U>>, E>>()
                    })
                    .map_err(|source| PipelineError::StageFailed {
                        stage: stage_label.clone(),
                        source: Box::new(source),
                    })?;
                Ok(chunks.into_iter().flatten().collect())
            },
        )
    }
}

impl<T: Key> PCollection<T> {
    /// Distinct elements.
    pub fn distinct(&self) -> PCollection<T> {
        let upstream = self.clone();
        let label = format!("distinct {}", self.stage.label());
        self.derive(
            Operation::Distinct,
            &label,
            vec![Arc::clone(&self.stage)],
            move |context| {
                let values = upstream.materialize()?;
                let unique = context.install(|| {
                    values
                        .par_iter()
                        .fold(AHashSet::new, |mut partial, item| {
                            partial.insert(item.clone());
                            partial
                        })
                        .reduce(AHashSet::new, |mut left, right| {
                            left.extend(right);
                            left
                        })
                });
                Ok(unique.into_iter().collect())
            },
        )
    }

    /// Number of occurrences of every distinct element.
    pub fn count(&self) -> PTable<T, u64> {
        let upstream = self.clone();
        let label = format!("count {}", self.stage.label());
        PTable::from(self.derive(
            Operation::Count,
            &label,
            vec![Arc::clone(&self.stage)],
            move |context| {
                let values = upstream.materialize()?;
                let counts = context
                    .install(|| fold_by_key(values.par_iter().map(|item| (item.clone(), 1_u64)), &Sum));
                Ok(counts.into_iter().collect())
            },
        ))
    }
}

/// A deferred single value, such as the length of a collection.
#[derive(Clone, Debug)]
pub struct PObject<T> {
    inner: PCollection<T>,
}

impl<T: Element> PObject<T> {
    fn new(inner: PCollection<T>) -> Self {
        Self { inner }
    }

    pub fn stage(&self) -> &Arc<Stage> {
        self.inner.stage()
    }

    /// Forces evaluation and returns the value.
    pub fn value(&self) -> Result<T, PipelineError> {
        let values = self.inner.materialize()?;
        values
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::EmptySingleton(self.inner.stage().label().to_string()))
    }
}
