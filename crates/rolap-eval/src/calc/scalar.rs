use std::sync::Arc;

use rolap_common::{Aggregator, CellValue, OlapError, OlapErrorKind, OlapResult};
use smallvec::SmallVec;

use super::{Calc, Tuple};
use crate::evaluator::Evaluator;
use crate::member::{HierarchyId, MemberRef};
use crate::reader::CompoundPredicate;

#[derive(Debug, Clone)]
pub struct ConstantCalc {
    value: CellValue,
}

impl ConstantCalc {
    pub fn new(value: CellValue) -> Self {
        Self { value }
    }
}

impl Calc for ConstantCalc {
    fn evaluate(&self, _ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        Ok(self.value.clone())
    }

    fn depends_on(&self, _hierarchy: HierarchyId) -> bool {
        false
    }
}

/// Value of the current cell with some members overridden, i.e. a tuple
/// reference such as `([Measures].[Sales], [Time].[1997])`.
#[derive(Debug, Clone)]
pub struct MemberValueCalc {
    members: Vec<MemberRef>,
}

impl MemberValueCalc {
    pub fn new(members: Vec<MemberRef>) -> Self {
        Self { members }
    }

    pub fn of(member: MemberRef) -> Self {
        Self::new(vec![member])
    }
}

impl Calc for MemberValueCalc {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        let sp = ev.savepoint();
        ev.set_tuple(&self.members);
        let out = ev.evaluate_current();
        ev.restore(sp);
        out
    }

    fn depends_on(&self, hierarchy: HierarchyId) -> bool {
        !self.members.iter().any(|m| m.hierarchy() == hierarchy)
    }

    fn primary_hierarchy(&self) -> Option<HierarchyId> {
        match self.members.as_slice() {
            [only] => Some(only.hierarchy()),
            _ => None,
        }
    }
}

/// Member reference resolved through the schema at evaluation time, so
/// calculated members may refer to each other regardless of definition
/// order.
#[derive(Debug, Clone)]
pub struct NamedMemberCalc {
    unique_name: Arc<str>,
}

impl NamedMemberCalc {
    pub fn new(unique_name: impl Into<Arc<str>>) -> Self {
        Self {
            unique_name: unique_name.into(),
        }
    }
}

impl Calc for NamedMemberCalc {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        let Some(member) = ev.schema().lookup_member(&self.unique_name) else {
            return Ok(CellValue::Error(
                OlapError::new(OlapErrorKind::Name)
                    .with_message(format!("unknown member {}", self.unique_name)),
            ));
        };
        let sp = ev.savepoint();
        ev.set_context(member);
        let out = ev.evaluate_current();
        ev.restore(sp);
        out
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
pub struct ArithmeticCalc {
    op: ArithOp,
    left: Arc<dyn Calc>,
    right: Arc<dyn Calc>,
}

impl ArithmeticCalc {
    pub fn new(op: ArithOp, left: Arc<dyn Calc>, right: Arc<dyn Calc>) -> Self {
        Self { op, left, right }
    }

    /// Null is the additive identity; it annihilates products and quotients.
    fn apply(op: ArithOp, l: CellValue, r: CellValue) -> CellValue {
        if l.is_pending() || r.is_pending() {
            return CellValue::Pending;
        }
        if l.is_error() {
            return l;
        }
        if r.is_error() {
            return r;
        }
        if l.is_null() && r.is_null() {
            return CellValue::Null;
        }
        let operand = |v: &CellValue| match op {
            ArithOp::Add | ArithOp::Sub if v.is_null() => Some(0.0),
            _ => v.as_f64(),
        };
        if matches!(op, ArithOp::Mul | ArithOp::Div) && (l.is_null() || r.is_null()) {
            return CellValue::Null;
        }
        let (Some(a), Some(b)) = (operand(&l), operand(&r)) else {
            return CellValue::Error(
                OlapError::new(OlapErrorKind::Type).with_message("non-numeric operand"),
            );
        };
        let out = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => {
                if b == 0.0 {
                    return CellValue::Error(OlapError::new(OlapErrorKind::Div));
                }
                a / b
            }
        };
        CellValue::Number(out).normalize()
    }
}

impl Calc for ArithmeticCalc {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        let l = self.left.evaluate(ev)?;
        let r = self.right.evaluate(ev)?;
        Ok(Self::apply(self.op, l, r))
    }

    fn depends_on(&self, hierarchy: HierarchyId) -> bool {
        self.left.depends_on(hierarchy) || self.right.depends_on(hierarchy)
    }

    fn primary_hierarchy(&self) -> Option<HierarchyId> {
        self.left
            .primary_hierarchy()
            .or_else(|| self.right.primary_hierarchy())
    }
}

/// Roll-up of the current measure over a list of tuples.
///
/// Distinct-count measures are answered with a single compound request so
/// overlapping tuples are not counted twice.
#[derive(Debug, Clone)]
pub struct AggregateCalc {
    tuples: Arc<Vec<Tuple>>,
}

impl AggregateCalc {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self {
            tuples: Arc::new(tuples),
        }
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }
}

impl Calc for AggregateCalc {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        let aggregator = ev.measure().measure_info().map(|i| i.aggregator);
        if aggregator.is_some_and(Aggregator::is_distinct) {
            let predicate = CompoundPredicate::from_tuples(self.tuples.iter());
            if let Some(v) = ev.evaluate_distinct(predicate)? {
                return Ok(v);
            }
        }
        let mut values = Vec::with_capacity(self.tuples.len());
        for t in self.tuples.iter() {
            ev.check_cancel()?;
            let sp = ev.savepoint();
            ev.set_tuple(t);
            let v = ev.evaluate_current();
            ev.restore(sp);
            values.push(v?);
        }
        Ok(aggregator
            .unwrap_or(Aggregator::Sum)
            .rollup(values)
            .normalize())
    }

    fn depends_on(&self, hierarchy: HierarchyId) -> bool {
        !self
            .tuples
            .iter()
            .any(|t| t.iter().any(|m| m.hierarchy() == hierarchy))
    }
}

/// Memoizes `inner` in the per-execution expression cache, keyed by `key`
/// and the context members `inner` depends on.
#[derive(Debug, Clone)]
pub struct CachedCalc {
    key: Arc<str>,
    inner: Arc<dyn Calc>,
}

impl CachedCalc {
    pub fn new(key: impl Into<Arc<str>>, inner: Arc<dyn Calc>) -> Self {
        Self {
            key: key.into(),
            inner,
        }
    }
}

impl Calc for CachedCalc {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue> {
        let members: SmallVec<[Arc<str>; 8]> = ev
            .context()
            .members()
            .iter()
            .filter(|m| self.inner.depends_on(m.hierarchy()))
            .map(|m| m.unique_name_arc().clone())
            .collect();
        let key = (self.key.clone(), members);
        if let Some(v) = ev.cached(&key) {
            return Ok(v);
        }
        let v = self.inner.evaluate(ev)?;
        if !v.is_pending() {
            ev.cache_put(key, v.clone());
        }
        Ok(v)
    }

    fn depends_on(&self, hierarchy: HierarchyId) -> bool {
        self.inner.depends_on(hierarchy)
    }

    fn primary_hierarchy(&self) -> Option<HierarchyId> {
        self.inner.primary_hierarchy()
    }
}
