use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rolap_common::{CellValue, OlapError, OlapErrorKind};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::CellRequest;
use crate::member::{HierarchyId, MemberRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unknown fact column `{0}`")]
    UnknownColumn(String),
    #[error("materialized {rows} fact rows, limit is {limit}")]
    RowLimit { rows: usize, limit: usize },
    #[error("segment load failed: {0}")]
    Backend(String),
}

impl From<LoadError> for OlapError {
    fn from(e: LoadError) -> Self {
        let kind = match e {
            LoadError::RowLimit { .. } => OlapErrorKind::ResultLimit,
            _ => OlapErrorKind::Load,
        };
        OlapError::new(kind).with_message(e.to_string())
    }
}

/// Relational side of the engine: turns a batch of cell requests into
/// aggregate values, one per request, in request order.
pub trait SegmentLoader: Send + Sync {
    fn load(&self, requests: &[CellRequest]) -> Result<Vec<CellValue>, LoadError>;
}

struct FactRow {
    /// Ancestor-or-self unique names per hierarchy.
    paths: Vec<FxHashSet<Arc<str>>>,
    values: FxHashMap<Arc<str>, CellValue>,
}

impl FactRow {
    fn matches(&self, h: HierarchyId, name: &str) -> bool {
        self.paths
            .get(h.index())
            .is_some_and(|p| p.contains(name))
    }
}

/// Denormalized fact rows keyed by leaf members; aggregates on demand.
#[derive(Default)]
pub struct InMemoryFactTable {
    rows: Vec<FactRow>,
    columns: FxHashSet<Arc<str>>,
    row_limit: Option<usize>,
    batches: AtomicUsize,
    requests: AtomicUsize,
}

impl std::fmt::Debug for InMemoryFactTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFactTable")
            .field("rows", &self.rows.len())
            .field("columns", &self.columns)
            .field("row_limit", &self.row_limit)
            .finish()
    }
}

impl InMemoryFactTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a request whose matching row count exceeds `limit`.
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn set_row_limit(&mut self, limit: Option<usize>) {
        self.row_limit = limit;
    }

    pub fn declare_column(&mut self, column: &str) {
        self.columns.insert(column.into());
    }

    /// Add one fact row located at `members` (one member per hierarchy,
    /// typically leaves). Hierarchies not mentioned only match unconstrained
    /// requests.
    pub fn add_row(&mut self, members: &[MemberRef], values: &[(&str, CellValue)]) {
        let width = members
            .iter()
            .map(|m| m.hierarchy().index() + 1)
            .max()
            .unwrap_or(0);
        let mut paths = vec![FxHashSet::default(); width];
        for m in members {
            let path = &mut paths[m.hierarchy().index()];
            path.insert(m.unique_name_arc().clone());
            let mut cur = m.parent();
            while let Some(p) = cur {
                path.insert(p.unique_name_arc().clone());
                cur = p.parent();
            }
        }
        let mut row_values = FxHashMap::default();
        for (col, v) in values {
            let col: Arc<str> = (*col).into();
            self.columns.insert(col.clone());
            row_values.insert(col, v.clone());
        }
        self.rows.push(FactRow {
            paths,
            values: row_values,
        });
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of `load` calls served.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Total requests across all batches.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn row_matches(row: &FactRow, request: &CellRequest) -> bool {
        if !request
            .constraints()
            .iter()
            .all(|(h, name)| row.matches(*h, name))
        {
            return false;
        }
        match request.predicate() {
            None => true,
            Some(pred) => pred
                .tuples()
                .iter()
                .any(|conj| conj.iter().all(|(h, name)| row.matches(*h, name))),
        }
    }

    fn load_one(&self, request: &CellRequest) -> Result<CellValue, LoadError> {
        if !self.columns.contains(request.column()) {
            return Err(LoadError::UnknownColumn(request.column().to_string()));
        }
        let matched: Vec<&FactRow> = self
            .rows
            .iter()
            .filter(|r| Self::row_matches(r, request))
            .collect();
        if let Some(limit) = self.row_limit
            && matched.len() > limit
        {
            return Err(LoadError::RowLimit {
                rows: matched.len(),
                limit,
            });
        }
        if matched.is_empty() {
            return Ok(CellValue::Null);
        }
        let values = matched
            .iter()
            .filter_map(|r| r.values.get(request.column()));
        Ok(request.aggregator().aggregate(values).normalize())
    }
}

impl SegmentLoader for InMemoryFactTable {
    fn load(&self, requests: &[CellRequest]) -> Result<Vec<CellValue>, LoadError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.requests.fetch_add(requests.len(), Ordering::Relaxed);
        requests.iter().map(|r| self.load_one(r)).collect()
    }
}
