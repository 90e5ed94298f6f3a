//! Hierarchy members and the closed set of member kinds the evaluator knows.

use std::{cmp::Ordering, fmt, sync::Arc};

use bitflags::bitflags;
use rolap_common::Aggregator;
use smallvec::SmallVec;

use crate::calc::Calc;
use crate::format::ValueFormatter;

/// Dense index of a hierarchy inside a cube. Index 0 is always `[Measures]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HierarchyId(pub u32);

impl HierarchyId {
    pub const MEASURES: HierarchyId = HierarchyId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HierarchyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

pub type MemberRef = Arc<Member>;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        const ALL        = 0b0000_0001;
        const CALCULATED = 0b0000_0010;
        const MEASURE    = 0b0000_0100;
        const NULL       = 0b0000_1000;
    }
}

#[derive(Clone)]
pub struct MeasureInfo {
    pub aggregator: Aggregator,
    /// Fact column the loader aggregates.
    pub column: Arc<str>,
    pub format_string: Option<Arc<str>>,
    /// Overrides the locale formatter for this measure's cells.
    pub formatter: Option<Arc<dyn ValueFormatter>>,
}

impl fmt::Debug for MeasureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasureInfo")
            .field("aggregator", &self.aggregator)
            .field("column", &self.column)
            .field("format_string", &self.format_string)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct CalculatedInfo {
    pub calc: Arc<dyn Calc>,
    pub solve_order: i32,
    pub format_string: Option<Arc<str>>,
}

/// Unresolved set expression carried by a visual-total member.
///
/// Kept symbolic so the distinct-count rewrite can flatten nested
/// visual totals and function-call structure into plain members.
#[derive(Clone, Debug)]
pub enum SetExpr {
    Member(MemberRef),
    Set(Vec<SetExpr>),
    Call { function: Arc<str>, args: Vec<SetExpr> },
}

impl SetExpr {
    /// True when every element is a plain (non visual-total) member.
    pub fn is_flat(&self) -> bool {
        match self {
            SetExpr::Member(m) => !matches!(m.kind(), MemberKind::VisualTotal(_)),
            SetExpr::Set(items) => items
                .iter()
                .all(|e| matches!(e, SetExpr::Member(m) if !matches!(m.kind(), MemberKind::VisualTotal(_)))),
            SetExpr::Call { .. } => false,
        }
    }

    /// Top-level elements as members; `Call` nodes contribute their arguments.
    pub fn members(&self) -> Vec<MemberRef> {
        let mut out = Vec::new();
        self.collect_top(&mut out);
        out
    }

    fn collect_top(&self, out: &mut Vec<MemberRef>) {
        match self {
            SetExpr::Member(m) => out.push(m.clone()),
            SetExpr::Set(items) => items.iter().for_each(|e| e.collect_top(out)),
            SetExpr::Call { args, .. } => args.iter().for_each(|e| e.collect_top(out)),
        }
    }
}

/// Canonical text: members by unique name, nested visual totals followed
/// by their own expression.
impl fmt::Display for SetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[SetExpr]) -> fmt::Result {
            for (i, e) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{e}")?;
            }
            Ok(())
        }
        match self {
            SetExpr::Member(m) => match m.kind() {
                MemberKind::VisualTotal(vt) => write!(f, "{}{}", m.unique_name(), vt.expr),
                _ => f.write_str(m.unique_name()),
            },
            SetExpr::Set(items) => {
                f.write_str("{")?;
                list(f, items)?;
                f.write_str("}")
            }
            SetExpr::Call { function, args } => {
                write!(f, "{function}(")?;
                list(f, args)?;
                f.write_str(")")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct VisualTotalInfo {
    /// The member this total stands in for.
    pub base: MemberRef,
    pub expr: SetExpr,
}

#[derive(Clone, Debug)]
pub struct CompoundSlicerInfo {
    pub calc: Arc<dyn Calc>,
}

#[derive(Clone, Debug)]
pub enum MemberKind {
    Regular,
    All,
    Null,
    Measure(MeasureInfo),
    Calculated(CalculatedInfo),
    VisualTotal(VisualTotalInfo),
    CompoundSlicer(CompoundSlicerInfo),
}

/// One member of one hierarchy.
///
/// Members are immutable and shared through [`MemberRef`]; identity is the
/// unique name.
#[derive(Debug)]
pub struct Member {
    unique_name: Arc<str>,
    name: String,
    hierarchy: HierarchyId,
    parent: Option<MemberRef>,
    depth: u32,
    ordinal: i32,
    kind: MemberKind,
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name == other.unique_name
    }
}

impl Eq for Member {}

impl std::hash::Hash for Member {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.unique_name.hash(state);
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

/* ───────────────────────── constructors ───────────────────────── */

impl Member {
    fn build(
        hierarchy: HierarchyId,
        unique_name: impl Into<Arc<str>>,
        name: impl Into<String>,
        parent: Option<MemberRef>,
        ordinal: i32,
        kind: MemberKind,
    ) -> MemberRef {
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);
        Arc::new(Member {
            unique_name: unique_name.into(),
            name: name.into(),
            hierarchy,
            parent,
            depth,
            ordinal,
            kind,
        })
    }

    pub fn all(hierarchy: HierarchyId, unique_name: impl Into<Arc<str>>) -> MemberRef {
        let unique_name = unique_name.into();
        let name = unique_name.to_string();
        Self::build(hierarchy, unique_name, name, None, 0, MemberKind::All)
    }

    pub fn regular(
        hierarchy: HierarchyId,
        unique_name: impl Into<Arc<str>>,
        name: impl Into<String>,
        parent: Option<MemberRef>,
        ordinal: i32,
    ) -> MemberRef {
        Self::build(hierarchy, unique_name, name, parent, ordinal, MemberKind::Regular)
    }

    pub fn measure(
        unique_name: impl Into<Arc<str>>,
        name: impl Into<String>,
        ordinal: i32,
        info: MeasureInfo,
    ) -> MemberRef {
        Self::build(
            HierarchyId::MEASURES,
            unique_name,
            name,
            None,
            ordinal,
            MemberKind::Measure(info),
        )
    }

    pub fn calculated(
        hierarchy: HierarchyId,
        unique_name: impl Into<Arc<str>>,
        name: impl Into<String>,
        parent: Option<MemberRef>,
        ordinal: i32,
        info: CalculatedInfo,
    ) -> MemberRef {
        Self::build(
            hierarchy,
            unique_name,
            name,
            parent,
            ordinal,
            MemberKind::Calculated(info),
        )
    }

    pub fn null(hierarchy: HierarchyId) -> MemberRef {
        Self::build(hierarchy, "#null", "#null", None, -1, MemberKind::Null)
    }

    /// A visual total standing in for `base`, aggregating `expr`.
    ///
    /// Keeps the base member's parent and ordinal so hierarchical ordering is
    /// unchanged.
    pub fn visual_total(base: &MemberRef, expr: SetExpr) -> MemberRef {
        Arc::new(Member {
            unique_name: format!("*{}", base.unique_name).into(),
            name: format!("*{}", base.name),
            hierarchy: base.hierarchy,
            parent: base.parent.clone(),
            depth: base.depth,
            ordinal: base.ordinal,
            kind: MemberKind::VisualTotal(VisualTotalInfo {
                base: base.clone(),
                expr,
            }),
        })
    }

    /// Placeholder put into the context for each hierarchy a compound slicer
    /// spans.
    pub fn compound_slicer(hierarchy: HierarchyId, label: &str, calc: Arc<dyn Calc>) -> MemberRef {
        Self::build(
            hierarchy,
            format!("[{label}].[*compound slicer {}*]", hierarchy.0),
            "*compound slicer*",
            None,
            0,
            MemberKind::CompoundSlicer(CompoundSlicerInfo { calc }),
        )
    }
}

/* ───────────────────────── accessors ───────────────────────── */

impl Member {
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn unique_name_arc(&self) -> &Arc<str> {
        &self.unique_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    pub fn parent(&self) -> Option<&MemberRef> {
        self.parent.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    pub fn flags(&self) -> MemberFlags {
        let mut flags = MemberFlags::empty();
        match self.kind {
            MemberKind::All => flags |= MemberFlags::ALL,
            MemberKind::Null => flags |= MemberFlags::NULL,
            MemberKind::Calculated(_) | MemberKind::VisualTotal(_) | MemberKind::CompoundSlicer(_) => {
                flags |= MemberFlags::CALCULATED
            }
            MemberKind::Regular | MemberKind::Measure(_) => {}
        }
        if self.hierarchy == HierarchyId::MEASURES {
            flags |= MemberFlags::MEASURE;
        }
        flags
    }

    pub fn is_all(&self) -> bool {
        matches!(self.kind, MemberKind::All)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, MemberKind::Null)
    }

    pub fn is_measure(&self) -> bool {
        self.hierarchy == HierarchyId::MEASURES
    }

    pub fn is_calculated(&self) -> bool {
        self.flags().contains(MemberFlags::CALCULATED)
    }

    pub fn measure_info(&self) -> Option<&MeasureInfo> {
        match &self.kind {
            MemberKind::Measure(info) => Some(info),
            _ => None,
        }
    }

    /// Solve order used to pick which calculated member in the context is
    /// expanded first. Non-calculated members have none.
    ///
    /// Visual totals sit just above compound-slicer placeholders so that
    /// calculated measures distribute over them.
    pub fn solve_order(&self) -> Option<i32> {
        match &self.kind {
            MemberKind::Calculated(info) => Some(info.solve_order),
            MemberKind::VisualTotal(_) => Some(i32::MIN + 1),
            MemberKind::CompoundSlicer(_) => Some(i32::MIN),
            _ => None,
        }
    }

    pub fn format_string(&self) -> Option<&Arc<str>> {
        match &self.kind {
            MemberKind::Measure(info) => info.format_string.as_ref(),
            MemberKind::Calculated(info) => info.format_string.as_ref(),
            _ => None,
        }
    }

    /// Topmost ancestor that is not an `All` member; the member itself when
    /// it is a root.
    pub fn top_ancestor(self: &Arc<Self>) -> MemberRef {
        let mut top = self.clone();
        while let Some(parent) = top.parent.clone() {
            if parent.is_all() {
                break;
            }
            top = parent;
        }
        top
    }

    pub fn is_ancestor_of(&self, other: &Member) -> bool {
        let mut cur = other.parent.as_ref();
        while let Some(p) = cur {
            if p.unique_name == self.unique_name {
                return true;
            }
            cur = p.parent.as_ref();
        }
        false
    }

    /// Ordinals from the hierarchy root down to this member.
    pub fn ordinal_path(&self) -> SmallVec<[i32; 8]> {
        let mut path: SmallVec<[i32; 8]> = SmallVec::new();
        path.push(self.ordinal);
        let mut cur = self.parent.as_ref();
        while let Some(p) = cur {
            path.push(p.ordinal);
            cur = p.parent.as_ref();
        }
        path.reverse();
        path
    }
}

/// Canonical hierarchical order: parents before children, siblings by
/// ordinal, unique name as the final tie-break.
pub fn compare_hierarchically(a: &Member, b: &Member) -> Ordering {
    a.hierarchy
        .cmp(&b.hierarchy)
        .then_with(|| a.ordinal_path().cmp(&b.ordinal_path()))
        .then_with(|| a.unique_name.cmp(&b.unique_name))
}

/// Lexicographic [`compare_hierarchically`] over tuple positions.
pub fn compare_tuples(a: &[MemberRef], b: &[MemberRef]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match compare_hierarchically(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (MemberRef, MemberRef, MemberRef, MemberRef) {
        let h = HierarchyId(1);
        let all = Member::all(h, "[Store].[All Stores]");
        let usa = Member::regular(h, "[Store].[USA]", "USA", Some(all.clone()), 0);
        let ca = Member::regular(h, "[Store].[USA].[CA]", "CA", Some(usa.clone()), 0);
        let wa = Member::regular(h, "[Store].[USA].[WA]", "WA", Some(usa.clone()), 1);
        (all, usa, ca, wa)
    }

    #[test]
    fn top_ancestor_stops_below_all() {
        let (all, usa, ca, _) = chain();
        assert_eq!(ca.top_ancestor(), usa);
        assert_eq!(usa.top_ancestor(), usa);
        assert_eq!(all.top_ancestor(), all);
        assert!(usa.is_ancestor_of(&ca));
        assert!(!ca.is_ancestor_of(&usa));
    }

    #[test]
    fn hierarchical_order_puts_parents_first() {
        let (_, usa, ca, wa) = chain();
        let mut v = vec![wa.clone(), ca.clone(), usa.clone()];
        v.sort_by(|a, b| compare_hierarchically(a, b));
        assert_eq!(v, vec![usa, ca, wa]);
    }

    #[test]
    fn visual_total_keeps_position_but_not_identity() {
        let (_, usa, ca, wa) = chain();
        let vt = Member::visual_total(&usa, SetExpr::Set(vec![SetExpr::Member(ca), SetExpr::Member(wa)]));
        assert_ne!(vt, usa);
        assert_eq!(vt.ordinal_path(), usa.ordinal_path());
        assert!(vt.is_calculated());
        assert_eq!(vt.solve_order(), Some(i32::MIN + 1));
        if let MemberKind::VisualTotal(info) = vt.kind() {
            assert!(info.expr.is_flat());
        } else {
            panic!("expected visual total");
        }
    }

    #[test]
    fn flags_reflect_kind() {
        let (all, usa, _, _) = chain();
        assert_eq!(all.flags(), MemberFlags::ALL);
        assert!(usa.flags().is_empty());
        let null = Member::null(HierarchyId::MEASURES);
        assert_eq!(null.flags(), MemberFlags::NULL | MemberFlags::MEASURE);
    }
}
