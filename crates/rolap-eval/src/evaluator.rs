//! Evaluation context and the evaluator handed to compiled calcs.
//!
//! An [`Evaluator`] is a cheap view: a mutable borrow of the
//! execution-wide [`RootEvaluator`] plus its own [`EvalContext`]. Calcs
//! override members with [`Evaluator::set_context`] and undo the changes
//! with a [`Savepoint`].

use std::sync::Arc;

use rolap_common::{CellValue, OlapError, OlapErrorKind, OlapResult};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::cancel::ExecutionGuard;
use crate::format::{FormatterCache, ValueFormatter};
use crate::member::{HierarchyId, MemberKind, MemberRef};
use crate::reader::{BatchingCellReader, CellRequest, CompoundPredicate};
use crate::schema::SchemaReader;

pub(crate) const DEFAULT_FORMAT: &str = "Standard";

/// Marker returned by [`EvalContext::savepoint`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Savepoint(usize);

/// One current member per hierarchy, with an undo log.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Indexed by `HierarchyId`; slot 0 holds the current measure.
    members: Vec<MemberRef>,
    undo: Vec<(usize, MemberRef)>,
}

impl EvalContext {
    pub fn new(members: Vec<MemberRef>) -> Self {
        Self {
            members,
            undo: Vec::new(),
        }
    }

    pub fn members(&self) -> &[MemberRef] {
        &self.members
    }

    pub fn member(&self, hierarchy: HierarchyId) -> &MemberRef {
        &self.members[hierarchy.index()]
    }

    pub fn measure(&self) -> &MemberRef {
        &self.members[HierarchyId::MEASURES.index()]
    }

    pub fn set_member(&mut self, member: MemberRef) {
        let idx = member.hierarchy().index();
        if Arc::ptr_eq(&self.members[idx], &member) {
            return;
        }
        let old = std::mem::replace(&mut self.members[idx], member);
        self.undo.push((idx, old));
    }

    pub fn set_tuple(&mut self, tuple: &[MemberRef]) {
        for m in tuple {
            self.set_member(m.clone());
        }
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint(self.undo.len())
    }

    pub fn restore(&mut self, sp: Savepoint) {
        while self.undo.len() > sp.0 {
            if let Some((idx, old)) = self.undo.pop() {
                self.members[idx] = old;
            }
        }
    }

    /// Make the current state the baseline: later restores cannot undo it.
    pub fn commit(&mut self) {
        self.undo.clear();
    }

    /// Same members, fresh undo log.
    pub fn fork(&self) -> Self {
        Self::new(self.members.clone())
    }

    /// Calculated member to expand first: highest solve order, lowest
    /// hierarchy index on ties.
    pub fn highest_calculated(&self) -> Option<&MemberRef> {
        let mut best: Option<(&MemberRef, i32)> = None;
        for m in &self.members {
            if let Some(order) = m.solve_order()
                && best.is_none_or(|(_, b)| order > b)
            {
                best = Some((m, order));
            }
        }
        best.map(|(m, _)| m)
    }
}

pub(crate) type ExpCacheKey = (Arc<str>, SmallVec<[Arc<str>; 8]>);

/// Execution-wide evaluation state shared by every [`Evaluator`].
pub struct RootEvaluator {
    pub(crate) schema: Arc<dyn SchemaReader>,
    pub(crate) reader: BatchingCellReader,
    pub(crate) exp_cache: FxHashMap<ExpCacheKey, CellValue>,
    pub(crate) guard: ExecutionGuard,
    pub(crate) formatters: Arc<FormatterCache>,
    pub(crate) locale: String,
    max_calc_depth: usize,
    calc_depth: usize,
}

impl std::fmt::Debug for RootEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootEvaluator")
            .field("reader", &self.reader)
            .field("exp_cache", &self.exp_cache.len())
            .field("calc_depth", &self.calc_depth)
            .finish_non_exhaustive()
    }
}

impl RootEvaluator {
    pub fn new(
        schema: Arc<dyn SchemaReader>,
        reader: BatchingCellReader,
        guard: ExecutionGuard,
        formatters: Arc<FormatterCache>,
        locale: String,
        max_calc_depth: usize,
    ) -> Self {
        Self {
            schema,
            reader,
            exp_cache: FxHashMap::default(),
            guard,
            formatters,
            locale,
            max_calc_depth,
            calc_depth: 0,
        }
    }

    pub fn reader(&self) -> &BatchingCellReader {
        &self.reader
    }

    /// Drop every cached expression value; required after each load since
    /// cached values may have been computed from pending data.
    pub fn clear_expression_cache(&mut self) {
        self.exp_cache.clear();
    }
}

pub struct Evaluator<'r> {
    root: &'r mut RootEvaluator,
    ctx: EvalContext,
}

impl<'r> Evaluator<'r> {
    pub fn new(root: &'r mut RootEvaluator, ctx: EvalContext) -> Self {
        Self { root, ctx }
    }

    /// Child evaluator with a copy of this context.
    pub fn push(&mut self) -> Evaluator<'_> {
        Evaluator {
            root: &mut *self.root,
            ctx: self.ctx.fork(),
        }
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub fn into_context(self) -> EvalContext {
        self.ctx
    }

    pub fn member(&self, hierarchy: HierarchyId) -> &MemberRef {
        self.ctx.member(hierarchy)
    }

    pub fn measure(&self) -> &MemberRef {
        self.ctx.measure()
    }

    pub fn set_context(&mut self, member: MemberRef) {
        self.ctx.set_member(member);
    }

    pub fn set_tuple(&mut self, tuple: &[MemberRef]) {
        self.ctx.set_tuple(tuple);
    }

    pub fn savepoint(&self) -> Savepoint {
        self.ctx.savepoint()
    }

    pub fn restore(&mut self, sp: Savepoint) {
        self.ctx.restore(sp);
    }

    pub fn schema(&self) -> &dyn SchemaReader {
        &*self.root.schema
    }

    pub fn check_cancel(&mut self) -> OlapResult<()> {
        self.root.guard.check()
    }

    pub(crate) fn cached(&self, key: &ExpCacheKey) -> Option<CellValue> {
        self.root.exp_cache.get(key).cloned()
    }

    pub(crate) fn cache_put(&mut self, key: ExpCacheKey, value: CellValue) {
        self.root.exp_cache.insert(key, value);
    }

    /// Value of the cell addressed by the current context.
    pub fn evaluate_current(&mut self) -> OlapResult<CellValue> {
        self.root.guard.check()?;
        if self.ctx.members.iter().any(|m| m.is_null()) {
            return Ok(CellValue::Null);
        }
        if let Some(calc) = self.ctx.highest_calculated().cloned() {
            return self.evaluate_calculated(&calc);
        }
        let measure = self.ctx.measure().clone();
        match measure.kind() {
            MemberKind::Measure(info) => {
                let request = CellRequest::for_context(&measure, info, &self.ctx.members);
                self.root.reader.get(request)
            }
            _ => Err(OlapError::new(OlapErrorKind::Internal)
                .with_message("no stored measure in context")
                .with_member(measure.unique_name())),
        }
    }

    fn evaluate_calculated(&mut self, member: &MemberRef) -> OlapResult<CellValue> {
        if self.root.calc_depth >= self.root.max_calc_depth {
            return Err(OlapError::new(OlapErrorKind::Cycle)
                .with_message("infinite loop while evaluating calculated member")
                .with_member(member.unique_name()));
        }
        self.root.calc_depth += 1;
        let sp = self.savepoint();
        let out = match member.kind() {
            MemberKind::Calculated(info) => info.calc.evaluate(self),
            MemberKind::CompoundSlicer(info) => info.calc.evaluate(self),
            MemberKind::VisualTotal(info) => crate::engine::visual_totals::evaluate(self, info),
            _ => Err(OlapError::new(OlapErrorKind::Internal).with_message("not a calculated member")),
        };
        self.restore(sp);
        self.root.calc_depth -= 1;
        out.map_err(|e| match e.context {
            Some(_) => e,
            None if !e.is_fatal() => e.with_member(member.unique_name()),
            None => e,
        })
    }

    /// Distinct-count value of the current stored measure over `predicate`
    /// in a single request.
    ///
    /// Returns `None` when the measure in context is not a stored distinct
    /// count or when calculated members outside the predicate's hierarchies
    /// are still in context.
    pub fn evaluate_distinct(&mut self, predicate: CompoundPredicate) -> OlapResult<Option<CellValue>> {
        let measure = self.ctx.measure().clone();
        let Some(info) = measure.measure_info() else {
            return Ok(None);
        };
        if !info.aggregator.is_distinct() {
            return Ok(None);
        }
        let mut members: SmallVec<[MemberRef; 8]> = SmallVec::new();
        for m in &self.ctx.members {
            if predicate.hierarchies().contains(&m.hierarchy()) {
                continue;
            }
            if m.is_calculated() {
                return Ok(None);
            }
            if m.is_null() {
                return Ok(Some(CellValue::Null));
            }
            members.push(m.clone());
        }
        let request = CellRequest::for_context(&measure, info, &members).with_predicate(predicate);
        self.root.reader.get(request).map(Some)
    }

    /// Format string for the current cell: the highest-solve-order
    /// calculated member carrying one, else the measure's.
    pub fn format_string(&self) -> Option<Arc<str>> {
        let mut best: Option<(&Arc<str>, i32)> = None;
        for m in &self.ctx.members {
            if let MemberKind::Calculated(info) = m.kind()
                && let Some(fmt) = &info.format_string
                && best.is_none_or(|(_, b)| info.solve_order > b)
            {
                best = Some((fmt, info.solve_order));
            }
        }
        best.map(|(f, _)| f.clone())
            .or_else(|| self.ctx.measure().format_string().cloned())
    }

    /// Formatter for the current cell: the stored measure's own, else the
    /// locale formatter for the resolved format string.
    pub fn formatter(&self) -> Arc<dyn ValueFormatter> {
        if let Some(info) = self.ctx.measure().measure_info()
            && let Some(f) = &info.formatter
        {
            return f.clone();
        }
        let fmt = self.format_string();
        self.root
            .formatters
            .get(&self.root.locale, fmt.as_deref().unwrap_or(DEFAULT_FORMAT))
    }
}
