//! Multi-phase query execution.
//!
//! Runs the slicer, axis and cell steps of a compiled [`Query`], each inside
//! a load-and-retry phase loop, and produces a [`QueryResult`].

pub mod axis;
pub mod axis_members;
pub mod cell_key;
pub mod cell_store;
mod cells;
pub mod compound_slicer;
pub mod eval;
pub mod modulos;
mod phase;
pub mod query;
pub mod result;
pub mod stats;
pub mod visual_totals;

#[cfg(test)]
mod tests;

pub use axis::Axis;
pub use axis_members::AxisMemberList;
pub use cell_key::CellKeyCodec;
pub use cell_store::{CellInfo, CellInfoBuilder, CellInfoContainer, CellStore, Position};
pub use eval::{Engine, ExecutionState, QueryExecution};
pub use modulos::Modulos;
pub use query::{CellProperties, Query, QueryAxis};
pub use result::{Cell, QueryResult};
pub use stats::{ExecutionStats, Step};

use std::sync::Arc;

use crate::reader::SegmentLoader;
use crate::schema::SchemaReader;

/// Construct an engine over the given collaborators with default settings.
pub fn new_engine(schema: Arc<dyn SchemaReader>, loader: Arc<dyn SegmentLoader>) -> Engine {
    Engine::new(schema, loader)
}
