//! # Deferred Parallel Collections
//!
//! A small dataflow engine with the collection semantics the estimators are
//! written against: element-wise transforms, counting, distinct, group-by-key
//! with a combiner, inner join, and materialization into memory.
//!
//! - Deferred: every operation returns a new immutable collection that records
//!   its operation and upstream stages. Nothing runs until a collection (or a
//!   singleton such as a length) is materialized.
//! - Unordered: element functions run on a `rayon` pool and aggregation goes
//!   through associative, commutative combiners, so results never depend on
//!   how the input was split or in which order partial results were merged.
//! - Memoized: a materialized stage keeps its result, so shared upstream stages
//!   are evaluated once per pipeline.

pub mod collection;
pub mod combine;
pub mod stage;
pub mod table;

pub use collection::{
    Element, Key, PCollection, PObject, Pipeline, PipelineConfig, PipelineError,
};
pub use combine::{Combiner, Product, Sum};
pub use stage::{Operation, Stage};
pub use table::{PGroupedTable, PTable};
