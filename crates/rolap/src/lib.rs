//! Meta crate that re-exports the ROLAP result engine with sensible
//! defaults. Downstream users can depend on this crate and opt into the
//! evaluator via feature flags while keeping access to the underlying crates
//! for deeper integration (custom schema readers, segment loaders or calcs).

#[cfg(feature = "common")]
pub use rolap_common as common;

#[cfg(feature = "eval")]
pub use rolap_eval as eval;

#[cfg(feature = "common")]
pub use rolap_common::{Aggregator, CellValue, OlapError, OlapErrorKind, OlapResult};

#[cfg(feature = "eval")]
pub use rolap_eval::{
    CancellationToken, Cell, CellProperties, Engine, EvalConfig, Query, QueryExecution,
    QueryResult, new_engine,
};
