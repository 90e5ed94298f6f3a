//! Slicers with more than one tuple.
//!
//! Hierarchies on which every slicer tuple agrees are folded straight into
//! the context. The remaining hierarchies get a placeholder member whose
//! expression rolls the current measure up over the reduced tuples. The
//! placeholder has the lowest possible solve order so every other
//! calculated member distributes over it.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::calc::{AggregateCalc, CachedCalc, Calc, Tuple};
use crate::evaluator::EvalContext;
use crate::member::{Member, MemberRef};

/// Outcome of installing a slicer into a context.
#[derive(Debug, Default)]
pub struct SlicerInstall {
    /// Members folded into the context directly.
    pub folded: Vec<MemberRef>,
    /// Placeholder members, one per non-unary hierarchy.
    pub placeholders: Vec<MemberRef>,
}

/// Apply the slicer `tuples` to `ctx` and commit the result as the new
/// baseline. `label` keys the roll-up in the expression cache.
pub fn install(ctx: &mut EvalContext, tuples: &[Tuple], label: &str) -> SlicerInstall {
    let mut out = SlicerInstall::default();
    let Some(first) = tuples.first() else {
        return out;
    };
    let arity = first.len();

    let (unary, varying): (Vec<usize>, Vec<usize>) = (0..arity).partition(|&j| {
        tuples
            .iter()
            .all(|t| t.get(j).map(|m| m.unique_name()) == Some(first[j].unique_name()))
    });

    for &j in &unary {
        ctx.set_member(first[j].clone());
        out.folded.push(first[j].clone());
    }

    let mut seen: FxHashSet<SmallVec<[Arc<str>; 4]>> = FxHashSet::default();
    let mut reduced: Vec<Tuple> = Vec::new();
    for t in tuples {
        let proj: Tuple = varying.iter().filter_map(|&j| t.get(j).cloned()).collect();
        let key = proj.iter().map(|m| m.unique_name_arc().clone()).collect();
        if seen.insert(key) {
            reduced.push(proj);
        }
    }

    match reduced.len() {
        0 => {}
        1 => {
            for m in &reduced[0] {
                ctx.set_member(m.clone());
                out.folded.push(m.clone());
            }
        }
        _ => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                tuples = reduced.len(),
                hierarchies = varying.len(),
                "installing compound slicer"
            );
            let calc: Arc<dyn Calc> = Arc::new(CachedCalc::new(
                format!("compound-slicer:{label}"),
                Arc::new(AggregateCalc::new(reduced)),
            ));
            for &j in &varying {
                let placeholder = Member::compound_slicer(first[j].hierarchy(), label, calc.clone());
                ctx.set_member(placeholder.clone());
                out.placeholders.push(placeholder);
            }
        }
    }
    ctx.commit();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::HierarchyId;
    use smallvec::smallvec;

    fn m(h: u32, name: &str) -> MemberRef {
        Member::regular(HierarchyId(h), format!("[{h}].[{name}]"), name, None, 0)
    }

    #[test]
    fn unary_hierarchies_are_folded() {
        let gender = m(1, "F");
        let (ca, wa) = (m(2, "CA"), m(2, "WA"));
        let base = vec![m(0, "Sales"), m(1, "All"), m(2, "All")];
        let mut ctx = EvalContext::new(base);
        let tuples: Vec<Tuple> = vec![smallvec![gender.clone(), ca], smallvec![gender.clone(), wa]];
        let res = install(&mut ctx, &tuples, "slicer");
        assert_eq!(res.folded, vec![gender.clone()]);
        assert_eq!(res.placeholders.len(), 1);
        assert_eq!(ctx.member(HierarchyId(1)), &gender);
        let placeholder = ctx.member(HierarchyId(2));
        assert!(placeholder.is_calculated());
        assert_eq!(placeholder.solve_order(), Some(i32::MIN));
        // committed: a restore to the fresh savepoint keeps the slicer
        let sp = ctx.savepoint();
        ctx.restore(sp);
        assert!(ctx.member(HierarchyId(2)).is_calculated());
    }

    #[test]
    fn duplicate_tuples_collapse_to_plain_members() {
        let ca = m(2, "CA");
        let mut ctx = EvalContext::new(vec![m(0, "Sales"), m(1, "All"), m(2, "All")]);
        let tuples: Vec<Tuple> = vec![smallvec![ca.clone()], smallvec![ca.clone()]];
        let res = install(&mut ctx, &tuples, "slicer");
        assert!(res.placeholders.is_empty());
        assert_eq!(ctx.member(HierarchyId(2)), &ca);
    }
}
