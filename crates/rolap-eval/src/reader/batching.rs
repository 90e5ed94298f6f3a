use std::sync::Arc;

use rolap_common::{CellValue, OlapError, OlapErrorKind, OlapResult};
use rustc_hash::FxHashSet;

use super::{AggregationCache, CellRequest, SegmentLoader};

/// Execution-local cell reader.
///
/// Serves requests from the shared [`AggregationCache`]; a miss is recorded
/// in the pending batch, marks the reader dirty and yields
/// [`CellValue::Pending`]. The orchestrator loads the batch between passes.
pub struct BatchingCellReader {
    cache: Arc<AggregationCache>,
    loader: Arc<dyn SegmentLoader>,
    batch: Vec<CellRequest>,
    batched: FxHashSet<CellRequest>,
    quantum: Option<usize>,
    dirty: bool,
    hits: u64,
    misses: u64,
    loads: u64,
}

impl std::fmt::Debug for BatchingCellReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingCellReader")
            .field("pending", &self.batch.len())
            .field("dirty", &self.dirty)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("loads", &self.loads)
            .finish()
    }
}

impl BatchingCellReader {
    pub fn new(
        cache: Arc<AggregationCache>,
        loader: Arc<dyn SegmentLoader>,
        quantum: Option<usize>,
    ) -> Self {
        Self {
            cache,
            loader,
            batch: Vec::new(),
            batched: FxHashSet::default(),
            quantum,
            dirty: false,
            hits: 0,
            misses: 0,
            loads: 0,
        }
    }

    pub fn get(&mut self, request: CellRequest) -> OlapResult<CellValue> {
        if let Some(v) = self.cache.get(&request) {
            self.hits += 1;
            return Ok(v);
        }
        self.misses += 1;
        self.dirty = true;
        if !self.batched.contains(&request) {
            if let Some(q) = self.quantum
                && self.batch.len() >= q
            {
                return Err(OlapError::new(OlapErrorKind::QuantumExceeded)
                    .with_message(format!("more than {q} cell requests in one pass")));
            }
            self.batched.insert(request.clone());
            self.batch.push(request);
        }
        Ok(CellValue::Pending)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn hit_count(&self) -> u64 {
        self.hits
    }

    pub fn miss_count(&self) -> u64 {
        self.misses
    }

    pub fn pending_count(&self) -> usize {
        self.batch.len()
    }

    pub fn load_count(&self) -> u64 {
        self.loads
    }

    /// Start counting a new pass.
    pub fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Load the pending batch into the shared cache. Returns whether
    /// anything was loaded.
    pub fn load_aggregations(&mut self) -> OlapResult<bool> {
        self.dirty = false;
        if self.batch.is_empty() {
            return Ok(false);
        }
        let batch = std::mem::take(&mut self.batch);
        self.batched.clear();
        let values = self.loader.load(&batch)?;
        if values.len() != batch.len() {
            return Err(OlapError::new(OlapErrorKind::Internal).with_message(format!(
                "loader returned {} values for {} requests",
                values.len(),
                batch.len()
            )));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(requests = batch.len(), "loaded aggregate batch");
        for (req, v) in batch.into_iter().zip(values) {
            self.cache.insert(req, v);
        }
        self.loads += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{HierarchyId, MeasureInfo, Member, MemberRef};
    use crate::reader::InMemoryFactTable;
    use rolap_common::Aggregator;

    fn setup() -> (Arc<InMemoryFactTable>, MemberRef, MeasureInfo, Vec<MemberRef>) {
        let info = MeasureInfo {
            aggregator: Aggregator::Sum,
            column: "sales".into(),
            format_string: None,
            formatter: None,
        };
        let m = Member::measure("[Measures].[Sales]", "Sales", 0, info.clone());
        let leaves: Vec<MemberRef> = (0..3)
            .map(|i| Member::regular(HierarchyId(1), format!("[S].[{i}]"), i.to_string(), None, i))
            .collect();
        let mut t = InMemoryFactTable::new();
        for (i, l) in leaves.iter().enumerate() {
            t.add_row(&[l.clone()], &[("sales", CellValue::Int(i as i64 + 1))]);
        }
        (Arc::new(t), m, info, leaves)
    }

    #[test]
    fn miss_then_load_then_hit() {
        let (table, m, info, leaves) = setup();
        let mut reader = BatchingCellReader::new(Arc::new(AggregationCache::new()), table.clone(), None);
        let req = CellRequest::for_context(&m, &info, &leaves[1..2]);
        assert_eq!(reader.get(req.clone()).unwrap(), CellValue::Pending);
        assert_eq!(reader.get(req.clone()).unwrap(), CellValue::Pending);
        assert_eq!(reader.pending_count(), 1);
        assert!(reader.is_dirty());
        assert!(reader.load_aggregations().unwrap());
        assert!(!reader.is_dirty());
        assert_eq!(reader.get(req).unwrap(), CellValue::Int(2));
        assert_eq!(table.batch_count(), 1);
        assert!(!reader.load_aggregations().unwrap());
    }

    #[test]
    fn quantum_cuts_the_pass_short() {
        let (table, m, info, leaves) = setup();
        let mut reader = BatchingCellReader::new(Arc::new(AggregationCache::new()), table, Some(2));
        for l in &leaves[..2] {
            reader.get(CellRequest::for_context(&m, &info, std::slice::from_ref(l))).unwrap();
        }
        let err = reader
            .get(CellRequest::for_context(&m, &info, &leaves[2..]))
            .unwrap_err();
        assert_eq!(err.kind, OlapErrorKind::QuantumExceeded);
        assert!(reader.load_aggregations().unwrap());
        assert_eq!(reader.pending_count(), 0);
    }
}
