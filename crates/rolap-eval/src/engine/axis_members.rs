use std::sync::Arc;

use rolap_common::{OlapError, OlapResult};
use rustc_hash::FxHashSet;

use crate::member::{HierarchyId, MemberRef};

/// Collects the members an axis expression touches while the axes are
/// being determined, and enforces the result limit.
///
/// In slicer mode every member is kept as-is. Otherwise only the topmost
/// non-`All` ancestor of each regular member is kept; null, measure,
/// calculated and `All` members are skipped.
#[derive(Debug)]
pub struct AxisMemberList {
    members: Vec<MemberRef>,
    seen: FxHashSet<Arc<str>>,
    is_slicer: bool,
    count_only: bool,
    has_measure: bool,
    limit: Option<u64>,
    base_cell_count: u64,
    total_cell_count: u64,
    axis_count: u64,
}

impl AxisMemberList {
    pub fn new(limit: Option<u64>, is_slicer: bool) -> Self {
        Self {
            members: Vec::new(),
            seen: FxHashSet::default(),
            is_slicer,
            count_only: false,
            has_measure: false,
            limit,
            base_cell_count: 1,
            total_cell_count: 1,
            axis_count: 0,
        }
    }

    /// Start the running cell count at `count` (the slicer's share)
    /// instead of 1.
    pub fn with_base_cell_count(mut self, count: u64) -> Self {
        self.base_cell_count = count;
        self.total_cell_count = count;
        self
    }

    pub fn merge_tuple(&mut self, tuple: &[MemberRef]) {
        for m in tuple {
            self.merge_member(m);
        }
    }

    fn merge_member(&mut self, member: &MemberRef) {
        self.axis_count += 1;
        if member.is_measure() && !member.is_null() {
            self.has_measure = true;
        }
        if self.count_only {
            return;
        }
        if self.is_slicer {
            if self.seen.insert(member.unique_name_arc().clone()) {
                self.members.push(member.clone());
            }
            return;
        }
        if member.is_null() || member.is_measure() || member.is_calculated() || member.is_all() {
            return;
        }
        let top = member.top_ancestor();
        if self.seen.insert(top.unique_name_arc().clone()) {
            self.members.push(top);
        }
    }

    /// Fold the members merged since the last call into the running cell
    /// count and fail if it exceeds the limit.
    pub fn check_limit(&mut self) -> OlapResult<()> {
        let axis_count = std::mem::take(&mut self.axis_count);
        if let Some(limit) = self.limit {
            self.total_cell_count = self.total_cell_count.saturating_mul(axis_count);
            if self.total_cell_count > limit {
                return Err(OlapError::result_limit(limit, self.total_cell_count));
            }
        }
        Ok(())
    }

    pub fn clear_total_cell_count(&mut self) {
        self.total_cell_count = self.base_cell_count;
        self.axis_count = 0;
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
        self.seen.clear();
        self.axis_count = 0;
    }

    pub fn set_count_only(&mut self, count_only: bool) {
        self.count_only = count_only;
    }

    pub fn total_cell_count(&self) -> u64 {
        self.total_cell_count
    }

    /// Whether any merged member was a measure.
    pub fn has_measure(&self) -> bool {
        self.has_measure
    }

    pub fn members(&self) -> &[MemberRef] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members_of(&self, hierarchy: HierarchyId) -> Vec<MemberRef> {
        self.members
            .iter()
            .filter(|m| m.hierarchy() == hierarchy)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Member;
    use rolap_common::OlapErrorKind;

    fn store() -> (MemberRef, MemberRef, MemberRef) {
        let h = HierarchyId(1);
        let all = Member::all(h, "[Store].[All]");
        let usa = Member::regular(h, "[Store].[USA]", "USA", Some(all.clone()), 0);
        let ca = Member::regular(h, "[Store].[USA].[CA]", "CA", Some(usa.clone()), 0);
        (all, usa, ca)
    }

    #[test]
    fn non_slicer_keeps_top_ancestors_only() {
        let (all, usa, ca) = store();
        let mut list = AxisMemberList::new(None, false);
        list.merge_tuple(&[ca.clone()]);
        list.merge_tuple(&[all]);
        list.merge_tuple(&[Member::null(HierarchyId(1))]);
        assert_eq!(list.members(), &[usa]);
        assert!(!list.has_measure());
    }

    #[test]
    fn slicer_keeps_members_and_flags_measures() {
        let (_, _, ca) = store();
        let sales = Member::regular(HierarchyId::MEASURES, "[Measures].[Sales]", "Sales", None, 0);
        let mut list = AxisMemberList::new(None, true);
        list.merge_tuple(&[ca.clone(), sales.clone()]);
        list.merge_tuple(&[ca.clone(), sales.clone()]);
        assert_eq!(list.members(), &[ca, sales]);
        assert!(list.has_measure());
    }

    #[test]
    fn limit_accumulates_across_axes() {
        let (_, usa, _) = store();
        let mut list = AxisMemberList::new(Some(10), false);
        for _ in 0..3 {
            list.merge_tuple(&[usa.clone()]);
        }
        list.check_limit().unwrap();
        assert_eq!(list.total_cell_count(), 3);
        for _ in 0..4 {
            list.merge_tuple(&[usa.clone()]);
        }
        let err = list.check_limit().unwrap_err();
        assert_eq!(err.kind, OlapErrorKind::ResultLimit);
        assert!(err.to_string().contains("12 > 10"));
    }

    #[test]
    fn base_count_survives_clearing() {
        let (_, usa, _) = store();
        let mut list = AxisMemberList::new(Some(10), false).with_base_cell_count(3);
        for _ in 0..3 {
            list.merge_tuple(&[usa.clone()]);
        }
        list.check_limit().unwrap();
        assert_eq!(list.total_cell_count(), 9);
        list.clear_total_cell_count();
        assert_eq!(list.total_cell_count(), 3);
        for _ in 0..4 {
            list.merge_tuple(&[usa.clone()]);
        }
        assert!(list.check_limit().is_err());
    }

    #[test]
    fn count_only_counts_without_collecting() {
        let (_, usa, _) = store();
        let mut list = AxisMemberList::new(Some(100), false);
        list.set_count_only(true);
        list.merge_tuple(&[usa.clone()]);
        list.merge_tuple(&[usa]);
        assert!(list.is_empty());
        list.check_limit().unwrap();
        assert_eq!(list.total_cell_count(), 2);
    }
}
