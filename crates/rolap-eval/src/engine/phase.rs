//! The load-and-retry loop every orchestrator step runs in.

use rolap_common::{OlapError, OlapErrorKind, OlapResult};

use super::stats::{ExecutionStats, Step};
use crate::evaluator::RootEvaluator;

/// Run `pass` until it completes without touching an uncached aggregate.
///
/// After each pass the pending batch (if any) is loaded, the expression
/// cache is cleared and the pass is run again. A pass cut short by the
/// request quantum does not count as an attempt. More than `limit`
/// attempts is treated as a cycle.
pub(crate) fn run_phased<T>(
    root: &mut RootEvaluator,
    stats: &mut ExecutionStats,
    limit: usize,
    step: Step,
    mut pass: impl FnMut(&mut RootEvaluator) -> OlapResult<T>,
) -> OlapResult<T> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        if attempt > limit {
            return Err(OlapError::new(OlapErrorKind::Cycle).with_message(format!(
                "query required more than {limit} iterations during {step}; probable cycle"
            )));
        }
        root.guard.check_now()?;
        root.reader.reset_counters();

        match pass(root) {
            Ok(value) => {
                if !load_phase(root, stats)? {
                    return Ok(value);
                }
                stats.record_redo(step);
                #[cfg(feature = "tracing")]
                tracing::debug!(%step, attempt, "pass touched uncached aggregates; redoing");
            }
            Err(e) if e.kind.is_retryable() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%step, attempt, "request quantum reached; loading partial batch");
                attempt -= 1;
                load_phase(root, stats)?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Close out one pass. Returns whether a batch was loaded, meaning the
/// pass must be repeated.
fn load_phase(root: &mut RootEvaluator, stats: &mut ExecutionStats) -> OlapResult<bool> {
    stats.phases += 1;
    stats.hits = root.reader.hit_count();
    stats.misses = root.reader.miss_count();
    stats.pending = root.reader.pending_count() as u64;
    if !root.reader.is_dirty() {
        return Ok(false);
    }
    let loaded = root.reader.load_aggregations()?;
    if loaded {
        root.clear_expression_cache();
        stats.loads += 1;
    }
    Ok(loaded)
}
