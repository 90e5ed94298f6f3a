use rolap_common::{CellValue, OlapResult};
use rustc_hash::FxHashMap;

use super::cell_store::CellInfoBuilder;
use super::visual_totals::rewrite_for_distinct_count;
use crate::evaluator::Evaluator;
use crate::member::{MemberKind, MemberRef};

/// Evaluates single cells once the axis positions are in context.
pub(crate) struct CellEvaluator {
    empty_slicer: bool,
    /// Distinct-count rewrites keyed by the visual total's expression.
    rewrites: FxHashMap<String, Option<MemberRef>>,
}

impl CellEvaluator {
    pub(crate) fn new(empty_slicer: bool) -> Self {
        Self {
            empty_slicer,
            rewrites: FxHashMap::default(),
        }
    }

    /// Evaluate the cell at `pos` in `ev`'s current context. Non-fatal
    /// errors become error values carrying the coordinates; fatal ones
    /// abort.
    pub(crate) fn evaluate(
        &mut self,
        ev: &mut Evaluator<'_>,
        pos: &[usize],
        ordinal: u64,
    ) -> OlapResult<CellInfoBuilder> {
        ev.check_cancel()?;
        let sp = ev.savepoint();
        self.apply_distinct_rewrites(ev);
        let result = if self.empty_slicer {
            Ok(CellValue::Null)
        } else {
            ev.evaluate_current()
        };
        let value = match result {
            Ok(v) => v,
            Err(e) if !e.is_fatal() => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?pos, error = %e, "cell evaluation failed");
                CellValue::Error(e.with_coordinates(pos))
            }
            Err(e) => {
                ev.restore(sp);
                return Err(e);
            }
        };
        let cell = CellInfoBuilder {
            ordinal,
            value,
            format_string: ev.format_string(),
            formatter: Some(ev.formatter()),
        };
        ev.restore(sp);
        Ok(cell)
    }

    fn apply_distinct_rewrites(&mut self, ev: &mut Evaluator<'_>) {
        let distinct = ev
            .measure()
            .measure_info()
            .is_some_and(|i| i.aggregator.is_distinct());
        if !distinct {
            return;
        }
        let totals: Vec<(String, MemberRef)> = ev
            .context()
            .members()
            .iter()
            .filter_map(|m| rewrite_key(m).map(|k| (k, m.clone())))
            .collect();
        for (key, vt) in totals {
            let rewritten = self
                .rewrites
                .entry(key)
                .or_insert_with(|| rewrite_for_distinct_count(&vt))
                .clone();
            if let Some(flat) = rewritten {
                ev.set_context(flat);
            }
        }
    }
}

/// Two totals over the same base member differ when their sets do.
fn rewrite_key(member: &MemberRef) -> Option<String> {
    match member.kind() {
        MemberKind::VisualTotal(vt) => Some(vt.expr.to_string()),
        _ => None,
    }
}
