//! Aggregate access: request keys, the shared cache, the relational loader
//! and the execution-local batching reader.

mod batching;
mod cache;
mod loader;
mod request;

pub use batching::BatchingCellReader;
pub use cache::{AggregationCache, CacheStats};
pub use loader::{InMemoryFactTable, LoadError, SegmentLoader};
pub use request::{CellRequest, CompoundPredicate};
