use std::sync::Arc;

use rolap_common::Aggregator;
use smallvec::SmallVec;

use crate::member::{HierarchyId, MeasureInfo, MemberRef};

/// OR of ANDs over member constraints. Used when a single aggregate must be
/// computed over a set of tuples in one request (distinct counts over a
/// compound slicer or a visual total).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundPredicate {
    hierarchies: SmallVec<[HierarchyId; 4]>,
    /// Each tuple is a conjunction; `All` members are omitted.
    tuples: Vec<SmallVec<[(HierarchyId, Arc<str>); 4]>>,
}

impl CompoundPredicate {
    pub fn from_tuples<'a, I, T>(tuples: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = &'a MemberRef>,
    {
        let mut hierarchies: SmallVec<[HierarchyId; 4]> = SmallVec::new();
        let mut out: Vec<SmallVec<[(HierarchyId, Arc<str>); 4]>> = Vec::new();
        for tuple in tuples {
            let mut conj: SmallVec<[(HierarchyId, Arc<str>); 4]> = SmallVec::new();
            for m in tuple {
                if !hierarchies.contains(&m.hierarchy()) {
                    hierarchies.push(m.hierarchy());
                }
                if !m.is_all() {
                    conj.push((m.hierarchy(), m.unique_name_arc().clone()));
                }
            }
            conj.sort();
            out.push(conj);
        }
        hierarchies.sort();
        out.sort();
        out.dedup();
        Self {
            hierarchies,
            tuples: out,
        }
    }

    pub fn hierarchies(&self) -> &[HierarchyId] {
        &self.hierarchies
    }

    pub fn tuples(&self) -> &[SmallVec<[(HierarchyId, Arc<str>); 4]>] {
        &self.tuples
    }
}

/// One aggregate value the evaluator needs: a stored measure constrained by
/// the non-`All` members of the current context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellRequest {
    measure: Arc<str>,
    column: Arc<str>,
    aggregator: Aggregator,
    /// Sorted by hierarchy, at most one per hierarchy.
    constraints: SmallVec<[(HierarchyId, Arc<str>); 4]>,
    predicate: Option<Arc<CompoundPredicate>>,
}

impl CellRequest {
    pub fn new(measure: &MemberRef, info: &MeasureInfo) -> Self {
        Self {
            measure: measure.unique_name_arc().clone(),
            column: info.column.clone(),
            aggregator: info.aggregator,
            constraints: SmallVec::new(),
            predicate: None,
        }
    }

    /// Build the request for `measure` under the given context members.
    pub fn for_context(measure: &MemberRef, info: &MeasureInfo, context: &[MemberRef]) -> Self {
        let mut req = Self::new(measure, info);
        for m in context {
            if m.is_measure() || m.is_all() {
                continue;
            }
            req.constraints
                .push((m.hierarchy(), m.unique_name_arc().clone()));
        }
        req.constraints.sort();
        req
    }

    /// Replace the constraints on the predicate's hierarchies with the
    /// predicate itself.
    pub fn with_predicate(mut self, predicate: CompoundPredicate) -> Self {
        self.constraints
            .retain(|(h, _)| !predicate.hierarchies().contains(h));
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    pub fn constraints(&self) -> &[(HierarchyId, Arc<str>)] {
        &self.constraints
    }

    pub fn predicate(&self) -> Option<&CompoundPredicate> {
        self.predicate.as_deref()
    }
}
