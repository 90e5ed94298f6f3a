use std::cmp::Ordering;
use std::sync::Arc;

use rolap_common::{CellValue, OlapError, OlapErrorKind, OlapResult};
use smallvec::smallvec;

use super::{Calc, SetCalc, Tuple, TupleIter, evaluate_list};
use crate::engine::visual_totals;
use crate::evaluator::Evaluator;
use crate::member::{HierarchyId, MemberRef, compare_tuples};

fn boxed(tuples: Vec<Tuple>) -> TupleIter {
    Box::new(tuples.into_iter())
}

/// Literal tuple list, e.g. `{[Store].[CA], [Store].[WA]}`.
#[derive(Debug, Clone)]
pub struct TupleListCalc {
    tuples: Arc<Vec<Tuple>>,
}

impl TupleListCalc {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self {
            tuples: Arc::new(tuples),
        }
    }

    /// One single-member tuple per member.
    pub fn of_members(members: impl IntoIterator<Item = MemberRef>) -> Self {
        Self::new(members.into_iter().map(|m| smallvec![m]).collect())
    }
}

impl SetCalc for TupleListCalc {
    fn evaluate_iterable(&self, _ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        Ok(boxed(self.tuples.as_ref().clone()))
    }
}

#[derive(Debug, Clone)]
pub struct ChildrenCalc {
    member: MemberRef,
}

impl ChildrenCalc {
    pub fn new(member: MemberRef) -> Self {
        Self { member }
    }
}

impl SetCalc for ChildrenCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let children = ev.schema().children(&self.member);
        Ok(boxed(children.into_iter().map(|m| smallvec![m]).collect()))
    }
}

/// Every visible member of a hierarchy, roots first, depth-first.
#[derive(Debug, Clone)]
pub struct MembersCalc {
    hierarchy: HierarchyId,
}

impl MembersCalc {
    pub fn new(hierarchy: HierarchyId) -> Self {
        Self { hierarchy }
    }
}

impl SetCalc for MembersCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let schema = ev.schema();
        let mut out = Vec::new();
        let mut stack: Vec<MemberRef> = schema.root_members(self.hierarchy);
        stack.reverse();
        while let Some(m) = stack.pop() {
            let mut children = schema.children(&m);
            children.reverse();
            stack.extend(children);
            out.push(smallvec![m]);
        }
        Ok(boxed(out))
    }
}

#[derive(Debug, Clone)]
pub struct CrossJoinCalc {
    left: Arc<dyn SetCalc>,
    right: Arc<dyn SetCalc>,
}

impl CrossJoinCalc {
    pub fn new(left: Arc<dyn SetCalc>, right: Arc<dyn SetCalc>) -> Self {
        Self { left, right }
    }
}

impl SetCalc for CrossJoinCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let left = evaluate_list(self.left.as_ref(), ev)?;
        let right = evaluate_list(self.right.as_ref(), ev)?;
        let mut out = Vec::with_capacity(left.len() * right.len());
        for l in &left {
            for r in &right {
                let mut t = l.clone();
                t.extend(r.iter().cloned());
                out.push(t);
            }
        }
        Ok(boxed(out))
    }

    fn is_ordered(&self) -> bool {
        self.left.is_ordered() || self.right.is_ordered()
    }
}

/// Sorts tuples into canonical hierarchical order.
#[derive(Debug, Clone)]
pub struct HierarchizeCalc {
    inner: Arc<dyn SetCalc>,
}

impl HierarchizeCalc {
    pub fn new(inner: Arc<dyn SetCalc>) -> Self {
        Self { inner }
    }
}

impl SetCalc for HierarchizeCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let mut tuples = evaluate_list(self.inner.as_ref(), ev)?;
        tuples.sort_by(|a, b| compare_tuples(a, b));
        Ok(boxed(tuples))
    }
}

/// Orders tuples by a scalar key evaluated in each tuple's context.
#[derive(Debug, Clone)]
pub struct OrderCalc {
    inner: Arc<dyn SetCalc>,
    key: Arc<dyn Calc>,
    descending: bool,
}

impl OrderCalc {
    pub fn new(inner: Arc<dyn SetCalc>, key: Arc<dyn Calc>, descending: bool) -> Self {
        Self {
            inner,
            key,
            descending,
        }
    }
}

/// Numbers first (ascending), everything else after, by display text.
fn compare_keys(a: &CellValue, b: &CellValue, descending: bool) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_string().cmp(&b.to_string()),
    }
}

impl SetCalc for OrderCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let tuples = evaluate_list(self.inner.as_ref(), ev)?;
        let mut keyed = Vec::with_capacity(tuples.len());
        for t in tuples {
            ev.check_cancel()?;
            let sp = ev.savepoint();
            ev.set_tuple(&t);
            let key = self.key.evaluate(ev);
            ev.restore(sp);
            keyed.push((key?, t));
        }
        // stable: equal keys keep input order
        keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, self.descending));
        Ok(boxed(keyed.into_iter().map(|(_, t)| t).collect()))
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

/// Replaces each member that has descendants later in the set by a visual
/// total of those descendants.
#[derive(Debug, Clone)]
pub struct VisualTotalsCalc {
    inner: Arc<dyn SetCalc>,
}

impl VisualTotalsCalc {
    pub fn new(inner: Arc<dyn SetCalc>) -> Self {
        Self { inner }
    }
}

impl SetCalc for VisualTotalsCalc {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter> {
        let tuples = evaluate_list(self.inner.as_ref(), ev)?;
        let mut members: Vec<MemberRef> = Vec::with_capacity(tuples.len());
        for t in tuples {
            match t.as_slice() {
                [m] => members.push(m.clone()),
                [] => {}
                _ => {
                    return Err(OlapError::new(OlapErrorKind::Type).with_message(format!(
                        "VisualTotals expects single-member tuples, got {} members",
                        t.len()
                    )));
                }
            }
        }
        let out = visual_totals::build(&members);
        Ok(boxed(out.into_iter().map(|m| smallvec![m]).collect()))
    }

    fn is_ordered(&self) -> bool {
        self.inner.is_ordered()
    }
}
