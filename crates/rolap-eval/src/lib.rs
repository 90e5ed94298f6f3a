pub mod calc;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod format;
pub mod member;
pub mod reader;
pub mod schema;

pub mod test_cube;

pub use cancel::{CancellationToken, ExecutionGuard};
pub use config::{ConfigError, EvalConfig};
pub use engine::{Cell, CellProperties, Engine, Query, QueryExecution, QueryResult, new_engine};
pub use evaluator::{EvalContext, Evaluator, RootEvaluator};
pub use member::{HierarchyId, Member, MemberKind, MemberRef};
pub use schema::{Hierarchy, SchemaReader};

pub use rolap_common::{Aggregator, CellValue, OlapError, OlapErrorKind, OlapResult};
