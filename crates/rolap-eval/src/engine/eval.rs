use std::sync::Arc;

use rolap_common::{OlapError, OlapErrorKind, OlapResult};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::axis::Axis;
use super::axis_members::AxisMemberList;
use super::cell_store::{CellInfoBuilder, CellInfoContainer, CellStore, Position};
use super::cells::CellEvaluator;
use super::compound_slicer;
use super::modulos::Modulos;
use super::phase::run_phased;
use super::query::Query;
use super::result::{DeferredCells, QueryResult};
use super::stats::{ExecutionStats, Step};
use crate::calc::{SetCalc, Tuple};
use crate::cancel::{CancellationToken, ExecutionGuard};
use crate::config::EvalConfig;
use crate::evaluator::{EvalContext, Evaluator, RootEvaluator};
use crate::format::FormatterCache;
use crate::member::{HierarchyId, MemberKind, MemberRef, compare_tuples};
use crate::reader::{AggregationCache, BatchingCellReader, SegmentLoader};
use crate::schema::SchemaReader;

/// Entry point: owns the collaborators shared by every execution.
///
/// The aggregation cache and formatter cache are shared across concurrent
/// executions; everything else an execution touches is its own.
pub struct Engine {
    schema: Arc<dyn SchemaReader>,
    loader: Arc<dyn SegmentLoader>,
    cache: Arc<AggregationCache>,
    formatters: Arc<FormatterCache>,
    config: EvalConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cache", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(schema: Arc<dyn SchemaReader>, loader: Arc<dyn SegmentLoader>) -> Self {
        Self {
            schema,
            loader,
            cache: Arc::new(AggregationCache::new()),
            formatters: Arc::new(FormatterCache::new()),
            config: EvalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: Arc<AggregationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_formatters(mut self, formatters: Arc<FormatterCache>) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AggregationCache> {
        &self.cache
    }

    pub fn schema(&self) -> &Arc<dyn SchemaReader> {
        &self.schema
    }

    /// Set up an execution without running it.
    pub fn prepare(&self, query: Arc<Query>, token: CancellationToken) -> OlapResult<QueryExecution> {
        self.config.validate()?;
        QueryExecution::new(self, query, token)
    }

    pub fn execute(&self, query: &Arc<Query>) -> OlapResult<QueryResult> {
        self.execute_with_cancel(query, CancellationToken::new())
    }

    pub fn execute_with_cancel(
        &self,
        query: &Arc<Query>,
        token: CancellationToken,
    ) -> OlapResult<QueryResult> {
        let mut execution = self.prepare(query.clone(), token)?;
        execution.run()?;
        execution.into_result()
    }
}

/// Members to iterate for a hierarchy without an `All` member.
#[derive(Debug, Clone)]
struct NonAllMembers {
    hierarchy: HierarchyId,
    members: Vec<MemberRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Ready,
    Completed,
    Discarded,
}

/// One query execution: the five orchestration steps and their state.
#[derive(Debug)]
pub struct QueryExecution {
    query: Arc<Query>,
    config: EvalConfig,
    root: Option<RootEvaluator>,
    context: Option<EvalContext>,
    non_all: Vec<NonAllMembers>,
    slicer_axis: Option<Axis>,
    empty_slicer: bool,
    slicer_cell_count: u64,
    axes: Vec<Axis>,
    cells: Option<CellStore<CellInfoBuilder>>,
    stats: ExecutionStats,
    state: ExecutionState,
}

fn discarded() -> OlapError {
    OlapError::new(OlapErrorKind::Internal).with_message("query execution was discarded")
}

impl QueryExecution {
    fn new(engine: &Engine, query: Arc<Query>, token: CancellationToken) -> OlapResult<Self> {
        let schema = engine.schema.clone();
        let hierarchies = schema.hierarchies();
        if hierarchies.first().map(|h| h.id) != Some(HierarchyId::MEASURES) {
            return Err(OlapError::new(OlapErrorKind::Internal)
                .with_message("schema must list the measures hierarchy first"));
        }
        let members: Vec<MemberRef> = hierarchies.iter().map(|h| h.default_member.clone()).collect();
        let non_all = hierarchies
            .iter()
            .filter(|h| !h.has_all())
            .map(|h| NonAllMembers {
                hierarchy: h.id,
                members: schema.root_members(h.id),
            })
            .filter(|l| !l.members.is_empty())
            .collect();

        let config = engine.config.clone();
        let reader = BatchingCellReader::new(
            engine.cache.clone(),
            engine.loader.clone(),
            config.cell_batch_quantum,
        );
        let guard = ExecutionGuard::new(token, config.timeout, config.cancel_check_interval);
        let root = RootEvaluator::new(
            schema,
            reader,
            guard,
            engine.formatters.clone(),
            config.locale.clone(),
            config.max_calc_depth,
        );
        Ok(Self {
            query,
            config,
            root: Some(root),
            context: Some(EvalContext::new(members)),
            non_all,
            slicer_axis: None,
            empty_slicer: false,
            slicer_cell_count: 1,
            axes: Vec::new(),
            cells: None,
            stats: ExecutionStats::default(),
            state: ExecutionState::Ready,
        })
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn slicer_axis(&self) -> Option<&Axis> {
        self.slicer_axis.as_ref()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Number of materialized cells so far.
    pub fn cell_count(&self) -> usize {
        self.cells.as_ref().map_or(0, |c| c.len())
    }

    /// Drop everything computed so far. The execution cannot be resumed.
    pub fn discard(&mut self) {
        self.root = None;
        self.context = None;
        self.cells = None;
        self.axes.clear();
        self.slicer_axis = None;
        self.non_all.clear();
        self.state = ExecutionState::Discarded;
    }

    /// Run all steps. An error escaping any step discards the execution.
    pub fn run(&mut self) -> OlapResult<()> {
        match self.state {
            ExecutionState::Ready => {}
            ExecutionState::Completed => {
                return Err(OlapError::new(OlapErrorKind::Internal)
                    .with_message("query execution already ran"));
            }
            ExecutionState::Discarded => return Err(discarded()),
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("execute_query", axes = self.query.axes().len()).entered();

        let outcome = self.run_steps();
        if let Some(root) = &self.root {
            self.stats.elapsed = root.guard.elapsed();
        }
        match outcome {
            Ok(()) => {
                self.state = ExecutionState::Completed;
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "query execution failed");
                self.discard();
                Err(e)
            }
        }
    }

    fn run_steps(&mut self) -> OlapResult<()> {
        self.determine_slicer()?;
        self.execute_slicer()?;
        self.determine_axes()?;
        self.execute_axes()?;
        if self.config.deferred_cells {
            let lengths: Vec<usize> = self.axes.iter().map(Axis::len).collect();
            self.cells = Some(CellStore::for_axes(&lengths));
            Ok(())
        } else {
            self.compute_cells()
        }
    }

    fn split(&mut self) -> OlapResult<(&mut RootEvaluator, &mut EvalContext, &mut ExecutionStats)> {
        match (self.root.as_mut(), self.context.as_mut()) {
            (Some(root), Some(ctx)) => Ok((root, ctx, &mut self.stats)),
            _ => Err(discarded()),
        }
    }

    /// Replace each no-`All` member list with the members `collector` saw
    /// for that hierarchy. Returns whether any list changed.
    fn replace_non_all_members(&mut self, collector: &AxisMemberList) -> bool {
        let mut changed = false;
        for list in &mut self.non_all {
            let found = collector.members_of(list.hierarchy);
            if !found.is_empty() && found != list.members {
                list.members = found;
                changed = true;
            }
        }
        changed
    }

    /* ───────────────────────── slicer ───────────────────────── */

    fn determine_slicer(&mut self) -> OlapResult<()> {
        let Some(slicer) = self.query.slicer().cloned() else {
            return Ok(());
        };
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("determine_slicer").entered();

        let limit = self.config.phase_limit();
        let mut collector = AxisMemberList::new(self.config.result_limit, true);
        let (root, ctx, stats) = self.split()?;
        run_phased(root, stats, limit, Step::DetermineSlicer, |root| {
            collector.clear_members();
            collector.clear_total_cell_count();
            for t in evaluate_axis(root, ctx, slicer.set(), &[])? {
                collector.merge_tuple(&t);
            }
            collector.check_limit()
        })?;
        self.slicer_cell_count = collector.total_cell_count();
        let (_, ctx, _) = self.split()?;

        if let Some(measure) = collector.members_of(HierarchyId::MEASURES).into_iter().next() {
            ctx.set_member(measure);
            ctx.commit();
        }
        self.replace_non_all_members(&collector);
        Ok(())
    }

    fn execute_slicer(&mut self) -> OlapResult<()> {
        let Some(slicer) = self.query.slicer().cloned() else {
            self.slicer_axis = Some(Axis::empty_slicer());
            return Ok(());
        };
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("execute_slicer").entered();

        let limit = self.config.phase_limit();
        let non_all = self.non_all.clone();
        let (root, ctx, stats) = self.split()?;
        let tuples = run_phased(root, stats, limit, Step::ExecuteSlicer, |root| {
            evaluate_axis(root, ctx, slicer.set(), &non_all)
        })?;

        let empty = match tuples.len() {
            0 => true,
            1 => {
                ctx.set_tuple(&tuples[0]);
                ctx.commit();
                false
            }
            _ => {
                compound_slicer::install(ctx, &tuples, slicer.name());
                false
            }
        };
        self.empty_slicer = empty;
        self.slicer_axis = Some(Axis::new(tuples, false));
        Ok(())
    }

    /* ───────────────────────── axes ───────────────────────── */

    fn determine_axes(&mut self) -> OlapResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("determine_axes").entered();

        let query = self.query.clone();
        let limit = self.config.phase_limit();
        let mut collector = AxisMemberList::new(self.config.result_limit, false)
            .with_base_cell_count(self.slicer_cell_count);
        {
            let (root, ctx, stats) = self.split()?;
            run_phased(root, stats, limit, Step::DetermineAxes, |root| {
                collector.clear_members();
                collector.clear_total_cell_count();
                for axis in query.axes() {
                    for t in evaluate_axis(root, ctx, axis.set(), &[])? {
                        collector.merge_tuple(&t);
                    }
                    collector.check_limit()?;
                }
                Ok(())
            })?;
        }

        if collector.has_measure() {
            self.non_all.retain(|l| l.hierarchy != HierarchyId::MEASURES);
        }
        if !self.replace_non_all_members(&collector) {
            return Ok(());
        }

        // The axes now iterate the replaced member lists; recount.
        collector.set_count_only(true);
        let non_all = self.non_all.clone();
        let (root, ctx, stats) = self.split()?;
        run_phased(root, stats, limit, Step::DetermineAxes, |root| {
            collector.clear_total_cell_count();
            for axis in query.axes() {
                for t in evaluate_axis(root, ctx, axis.set(), &non_all)? {
                    collector.merge_tuple(&t);
                }
                collector.check_limit()?;
            }
            Ok(())
        })
    }

    fn execute_axes(&mut self) -> OlapResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("execute_axes").entered();

        let query = self.query.clone();
        let limit = self.config.phase_limit();
        loop {
            let non_all = self.non_all.clone();
            let mut built = Vec::with_capacity(query.axes().len());
            let mut drop: Vec<HierarchyId> = Vec::new();
            {
                let (root, ctx, stats) = self.split()?;
                for axis in query.axes() {
                    let tuples = run_phased(root, &mut *stats, limit, Step::ExecuteAxes, |root| {
                        evaluate_axis(root, ctx, axis.set(), &non_all)
                    })?;
                    if let Some(first) = tuples.first() {
                        for m in first {
                            if let MemberKind::Calculated(info) = m.kind()
                                && let Some(h) = info.calc.primary_hierarchy()
                                && non_all.iter().any(|l| l.hierarchy == h)
                                && !drop.contains(&h)
                            {
                                drop.push(h);
                            }
                        }
                    }
                    built.push(Axis::new(tuples, axis.set().is_ordered()));
                }
            }
            if drop.is_empty() {
                self.axes = built;
                break;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(hierarchies = ?drop, "calculated member covers a no-All hierarchy; re-executing axes");
            self.non_all.retain(|l| !drop.contains(&l.hierarchy));
            self.stats.axis_reevaluations += 1;
        }

        if let Some(limit) = self.config.result_limit {
            let slicer = match &self.slicer_axis {
                Some(a) if self.query.slicer().is_some() => a.len() as u64,
                _ => 1,
            };
            let total = self
                .axes
                .iter()
                .fold(slicer, |acc, a| acc.saturating_mul(a.len() as u64));
            if total > limit {
                return Err(OlapError::result_limit(limit, total));
            }
        }
        Ok(())
    }

    /* ───────────────────────── cells ───────────────────────── */

    fn compute_cells(&mut self) -> OlapResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("compute_cells").entered();

        let lengths: Vec<usize> = self.axes.iter().map(Axis::len).collect();
        let modulos = Modulos::new(&lengths).ok_or_else(|| {
            OlapError::new(OlapErrorKind::ResultLimit).with_message("cell count overflows u64")
        })?;
        let mut cells = CellStore::<CellInfoBuilder>::for_axes(&lengths);

        if self.query.cell_properties().ordinal_only() {
            for ordinal in 0..modulos.cell_count() {
                let pos = modulos.cell_pos(ordinal);
                cells.create(&pos).ordinal = ordinal;
            }
            self.stats.cells_computed = modulos.cell_count();
            self.cells = Some(cells);
            return Ok(());
        }

        let limit = self.config.phase_limit();
        let mut evaluator = CellEvaluator::new(self.empty_slicer);
        let QueryExecution {
            root,
            context,
            axes,
            stats,
            ..
        } = self;
        let (Some(root), Some(ctx)) = (root.as_mut(), context.as_ref()) else {
            return Err(discarded());
        };
        let axes: &[Axis] = axes;
        let computed = run_phased(root, stats, limit, Step::ComputeCells, |root| {
            cells.clear();
            let mut walker = CellWalker {
                axes,
                modulos: &modulos,
                cells: &mut cells,
                evaluator: &mut evaluator,
                pos: Position::from_elem(0, axes.len()),
                computed: 0,
            };
            let mut ev = Evaluator::new(root, ctx.fork());
            walker.walk(&mut ev, 0)?;
            Ok(walker.computed)
        })?;
        self.stats.cells_computed = computed;
        self.cells = Some(cells);
        Ok(())
    }

    /// Freeze the cells and hand the axes over to a [`QueryResult`].
    pub fn into_result(mut self) -> OlapResult<QueryResult> {
        match self.state {
            ExecutionState::Completed => {}
            ExecutionState::Ready => {
                return Err(OlapError::new(OlapErrorKind::Internal)
                    .with_message("query execution has not run"));
            }
            ExecutionState::Discarded => return Err(discarded()),
        }
        let lengths: Vec<usize> = self.axes.iter().map(Axis::len).collect();
        let cells = self
            .cells
            .take()
            .unwrap_or_else(|| CellStore::for_axes(&lengths))
            .map_values(CellInfoBuilder::freeze);
        let deferred = match (self.config.deferred_cells, self.root.take(), self.context.take()) {
            (true, Some(root), Some(context)) => Some(DeferredCells::new(
                root,
                context,
                self.config.phase_limit(),
                CellEvaluator::new(self.empty_slicer),
            )),
            _ => None,
        };
        Ok(QueryResult::new(
            self.axes,
            self.slicer_axis.unwrap_or_else(Axis::empty_slicer),
            cells,
            self.query.cell_properties(),
            self.stats,
            deferred,
        ))
    }
}

/// Nested loop over all axis positions, axis 0 outermost.
struct CellWalker<'a> {
    axes: &'a [Axis],
    modulos: &'a Modulos,
    cells: &'a mut CellStore<CellInfoBuilder>,
    evaluator: &'a mut CellEvaluator,
    pos: Position,
    computed: u64,
}

impl CellWalker<'_> {
    fn walk(&mut self, ev: &mut Evaluator<'_>, axis: usize) -> OlapResult<()> {
        let axes = self.axes;
        if axis == axes.len() {
            let ordinal = self.modulos.cell_ordinal(&self.pos);
            let cell = self.evaluator.evaluate(ev, &self.pos, ordinal)?;
            *self.cells.create(&self.pos) = cell;
            self.computed += 1;
            return Ok(());
        }
        for (i, position) in axes[axis].positions().iter().enumerate() {
            self.pos[axis] = i;
            let sp = ev.savepoint();
            ev.set_tuple(position);
            let out = self.walk(ev, axis + 1);
            ev.restore(sp);
            out?;
        }
        Ok(())
    }
}

type TupleKey = SmallVec<[Arc<str>; 4]>;

fn tuple_key(t: &Tuple) -> TupleKey {
    t.iter().map(|m| m.unique_name_arc().clone()).collect()
}

/// Evaluate an axis set in `base`, once per combination of the no-`All`
/// member lists, and merge the fragments.
fn evaluate_axis(
    root: &mut RootEvaluator,
    base: &EvalContext,
    set: &dyn SetCalc,
    non_all: &[NonAllMembers],
) -> OlapResult<Vec<Tuple>> {
    let mut ev = Evaluator::new(root, base.fork());
    if non_all.is_empty() {
        return collect_tuples(set, &mut ev);
    }
    let mut fragments = Vec::new();
    evaluate_under(&mut ev, set, non_all, &mut fragments)?;
    Ok(merge_fragments(fragments, set.is_ordered()))
}

fn evaluate_under(
    ev: &mut Evaluator<'_>,
    set: &dyn SetCalc,
    lists: &[NonAllMembers],
    out: &mut Vec<Vec<Tuple>>,
) -> OlapResult<()> {
    let Some((head, rest)) = lists.split_first() else {
        out.push(collect_tuples(set, ev)?);
        return Ok(());
    };
    for m in &head.members {
        let sp = ev.savepoint();
        ev.set_context(m.clone());
        let r = evaluate_under(ev, set, rest, out);
        ev.restore(sp);
        r?;
    }
    Ok(())
}

fn collect_tuples(set: &dyn SetCalc, ev: &mut Evaluator<'_>) -> OlapResult<Vec<Tuple>> {
    let mut out = Vec::new();
    for t in set.evaluate_iterable(ev)? {
        ev.check_cancel()?;
        out.push(t);
    }
    Ok(out)
}

/// First fragment verbatim, then tuples from later fragments not seen yet.
/// If later fragments contributed and the set imposes no order, the merged
/// list is put back into hierarchical order.
fn merge_fragments(fragments: Vec<Vec<Tuple>>, ordered: bool) -> Vec<Tuple> {
    let mut seen: FxHashSet<TupleKey> = FxHashSet::default();
    let mut out = Vec::new();
    let mut grew = false;
    for (i, fragment) in fragments.into_iter().enumerate() {
        for t in fragment {
            let fresh = seen.insert(tuple_key(&t));
            if i == 0 || fresh {
                grew |= i > 0;
                out.push(t);
            }
        }
    }
    if grew && !ordered {
        out.sort_by(|a, b| compare_tuples(a, b));
    }
    out
}
