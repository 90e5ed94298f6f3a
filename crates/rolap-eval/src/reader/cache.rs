//! Aggregate values shared across executions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rolap_common::CellValue;

use super::CellRequest;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

/// Read-through cache of loaded aggregates keyed by [`CellRequest`].
///
/// Safe to share between executions running on different threads. With a
/// capacity set, the oldest entry is evicted on overflow.
#[derive(Debug, Default)]
pub struct AggregationCache {
    map: DashMap<CellRequest, CellValue>,
    order: Mutex<VecDeque<CellRequest>>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl AggregationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn get(&self, request: &CellRequest) -> Option<CellValue> {
        match self.map.get(request) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, request: CellRequest, value: CellValue) {
        if let Some(cap) = self.capacity {
            let mut order = self.order.lock();
            if !self.map.contains_key(&request) {
                while order.len() >= cap {
                    let Some(oldest) = order.pop_front() else {
                        break;
                    };
                    self.map.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                order.push_back(request.clone());
            }
        }
        self.map.insert(request, value);
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contains(&self, request: &CellRequest) -> bool {
        self.map.contains_key(request)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
        self.order.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{HierarchyId, MeasureInfo, Member};
    use rolap_common::Aggregator;

    fn request(i: i32) -> CellRequest {
        let info = MeasureInfo {
            aggregator: Aggregator::Sum,
            column: "x".into(),
            format_string: None,
            formatter: None,
        };
        let m = Member::measure("[Measures].[X]", "X", 0, info.clone());
        let h = Member::regular(HierarchyId(1), format!("[H].[{i}]"), i.to_string(), None, i);
        CellRequest::for_context(&m, &info, &[h])
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = AggregationCache::new();
        assert!(cache.get(&request(1)).is_none());
        cache.insert(request(1), CellValue::Int(7));
        assert_eq!(cache.get(&request(1)), Some(CellValue::Int(7)));
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.inserts), (1, 1, 1));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = AggregationCache::with_capacity_limit(2);
        cache.insert(request(1), CellValue::Int(1));
        cache.insert(request(2), CellValue::Int(2));
        cache.insert(request(3), CellValue::Int(3));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&request(1)));
        assert!(cache.contains(&request(3)));
        assert_eq!(cache.stats().evictions, 1);
    }
}
