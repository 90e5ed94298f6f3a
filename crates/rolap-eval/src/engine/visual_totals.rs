//! Visual-total members: construction, evaluation and the distinct-count
//! rewrite.
//!
//! A visual total aggregates the members listed under it on the axis rather
//! than the full hierarchy. Summing children is fine for additive measures
//! but over-counts a distinct count whenever children share fact values, so
//! under a distinct-count measure a nested total is flattened into one set of
//! plain members and answered with a single request.

use rolap_common::{Aggregator, CellValue, OlapResult};
use rustc_hash::FxHashSet;

use crate::evaluator::Evaluator;
use crate::member::{Member, MemberKind, MemberRef, SetExpr, VisualTotalInfo};
use crate::reader::CompoundPredicate;

/// Replace every member followed by a contiguous run of its descendants
/// with a visual total over its nearest descendants in that run.
pub fn build(members: &[MemberRef]) -> Vec<MemberRef> {
    let n = members.len();
    let mut out = members.to_vec();
    for i in (0..n).rev() {
        let root = &members[i];
        let mut end = i + 1;
        while end < n && root.is_ancestor_of(&members[end]) {
            end += 1;
        }
        if end == i + 1 {
            continue;
        }
        let children: Vec<SetExpr> = (i + 1..end)
            .filter(|&k| !(i + 1..k).any(|l| members[l].is_ancestor_of(&members[k])))
            .map(|k| SetExpr::Member(out[k].clone()))
            .collect();
        out[i] = Member::visual_total(root, SetExpr::Set(children));
    }
    out
}

pub(crate) fn evaluate(ev: &mut Evaluator<'_>, info: &VisualTotalInfo) -> OlapResult<CellValue> {
    let members = info.expr.members();
    let aggregator = ev.measure().measure_info().map(|i| i.aggregator);
    if aggregator.is_some_and(Aggregator::is_distinct) && info.expr.is_flat() {
        let predicate = CompoundPredicate::from_tuples(members.iter().map(std::slice::from_ref));
        if let Some(v) = ev.evaluate_distinct(predicate)? {
            return Ok(v);
        }
    }
    let mut values = Vec::with_capacity(members.len());
    for m in members {
        ev.check_cancel()?;
        let sp = ev.savepoint();
        ev.set_context(m);
        let v = ev.evaluate_current();
        ev.restore(sp);
        values.push(v?);
    }
    Ok(aggregator
        .unwrap_or(Aggregator::Sum)
        .rollup(values)
        .normalize())
}

/// Flatten a nested visual total into one over the plain members it
/// ultimately covers. `None` when `member` is not a visual total or is
/// already flat.
pub fn rewrite_for_distinct_count(member: &MemberRef) -> Option<MemberRef> {
    let MemberKind::VisualTotal(info) = member.kind() else {
        return None;
    };
    if info.expr.is_flat() {
        return None;
    }
    let mut leaves = Vec::new();
    let mut seen = FxHashSet::default();
    flatten(&info.expr, &mut leaves, &mut seen);
    Some(Member::visual_total(
        &info.base,
        SetExpr::Set(leaves.into_iter().map(SetExpr::Member).collect()),
    ))
}

fn flatten(expr: &SetExpr, out: &mut Vec<MemberRef>, seen: &mut FxHashSet<String>) {
    match expr {
        SetExpr::Member(m) => match m.kind() {
            MemberKind::VisualTotal(vt) => flatten(&vt.expr, out, seen),
            MemberKind::CompoundSlicer(_) | MemberKind::Null => {}
            _ => {
                if seen.insert(m.unique_name().to_string()) {
                    out.push(m.clone());
                }
            }
        },
        SetExpr::Set(items) => items.iter().for_each(|e| flatten(e, out, seen)),
        SetExpr::Call { args, .. } => args.iter().for_each(|e| flatten(e, out, seen)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::HierarchyId;

    fn tree() -> Vec<MemberRef> {
        let h = HierarchyId(1);
        let usa = Member::regular(h, "[S].[USA]", "USA", None, 0);
        let ca = Member::regular(h, "[S].[USA].[CA]", "CA", Some(usa.clone()), 0);
        let sf = Member::regular(h, "[S].[USA].[CA].[SF]", "SF", Some(ca.clone()), 0);
        let la = Member::regular(h, "[S].[USA].[CA].[LA]", "LA", Some(ca.clone()), 1);
        let wa = Member::regular(h, "[S].[USA].[WA]", "WA", Some(usa.clone()), 1);
        vec![usa, ca, sf, la, wa]
    }

    #[test]
    fn build_nests_totals() {
        let out = build(&tree());
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].unique_name(), "*[S].[USA]");
        assert_eq!(out[1].unique_name(), "*[S].[USA].[CA]");
        assert_eq!(out[2].unique_name(), "[S].[USA].[CA].[SF]");
        let MemberKind::VisualTotal(top) = out[0].kind() else {
            panic!("expected visual total");
        };
        let names: Vec<_> = top.expr.members().iter().map(|m| m.unique_name().to_string()).collect();
        assert_eq!(names, vec!["*[S].[USA].[CA]", "[S].[USA].[WA]"]);
        assert!(!top.expr.is_flat());
    }

    #[test]
    fn rewrite_flattens_to_plain_members() {
        let out = build(&tree());
        let flat = rewrite_for_distinct_count(&out[0]).expect("nested total rewrites");
        let MemberKind::VisualTotal(info) = flat.kind() else {
            panic!("expected visual total");
        };
        assert!(info.expr.is_flat());
        let names: Vec<_> = info.expr.members().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["SF", "LA", "WA"]);
        assert!(rewrite_for_distinct_count(&out[1]).is_none());
        assert!(rewrite_for_distinct_count(&out[2]).is_none());
    }
}
