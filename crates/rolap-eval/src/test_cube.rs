//! Lightweight in-memory cube for unit and integration tests.
//!
//! Builds hierarchies, members and measures by name, records fact rows in an
//! [`InMemoryFactTable`] and serves the metadata through [`SchemaReader`].

use std::sync::Arc;

use rolap_common::{Aggregator, CellValue};
use rustc_hash::FxHashMap;

use crate::calc::Calc;
use crate::engine::Engine;
use crate::member::{CalculatedInfo, HierarchyId, MeasureInfo, Member, MemberRef};
use crate::reader::InMemoryFactTable;
use crate::schema::{AccessPredicate, AllowAll, Hierarchy, SchemaReader};

pub struct TestCube {
    hierarchies: Vec<Hierarchy>,
    roots: Vec<Vec<MemberRef>>,
    children: FxHashMap<Arc<str>, Vec<MemberRef>>,
    by_name: FxHashMap<Arc<str>, MemberRef>,
    facts: InMemoryFactTable,
    access: Arc<dyn AccessPredicate>,
}

impl std::fmt::Debug for TestCube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCube")
            .field("hierarchies", &self.hierarchies.len())
            .field("members", &self.by_name.len())
            .field("facts", &self.facts)
            .finish()
    }
}

impl Default for TestCube {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCube {
    /* ─────────────── constructors ─────────────── */
    pub fn new() -> Self {
        let measures = Hierarchy {
            id: HierarchyId::MEASURES,
            name: "Measures".into(),
            all_member: None,
            default_member: Member::null(HierarchyId::MEASURES),
        };
        Self {
            hierarchies: vec![measures],
            roots: vec![Vec::new()],
            children: FxHashMap::default(),
            by_name: FxHashMap::default(),
            facts: InMemoryFactTable::new(),
            access: Arc::new(AllowAll),
        }
    }

    pub fn set_access(&mut self, access: Arc<dyn AccessPredicate>) {
        self.access = access;
    }

    fn register(&mut self, member: &MemberRef) {
        self.by_name
            .insert(member.unique_name_arc().clone(), member.clone());
    }

    /* ─────────────── measures ─────────────── */

    /// Stored measure over the lower-cased `name` column.
    pub fn add_measure(&mut self, name: &str, aggregator: Aggregator) -> MemberRef {
        self.add_formatted_measure(name, aggregator, None)
    }

    pub fn add_formatted_measure(
        &mut self,
        name: &str,
        aggregator: Aggregator,
        format_string: Option<&str>,
    ) -> MemberRef {
        let column = name.to_ascii_lowercase();
        self.facts.declare_column(&column);
        let info = MeasureInfo {
            aggregator,
            column: column.into(),
            format_string: format_string.map(Into::into),
            formatter: None,
        };
        let ordinal = self.roots[0].len() as i32;
        let m = Member::measure(format!("[Measures].[{name}]"), name, ordinal, info);
        self.push_root(HierarchyId::MEASURES, m)
    }

    pub fn add_calculated_measure(
        &mut self,
        name: &str,
        calc: Arc<dyn Calc>,
        solve_order: i32,
        format_string: Option<&str>,
    ) -> MemberRef {
        self.add_calculated_member(HierarchyId::MEASURES, name, calc, solve_order, format_string)
    }

    /* ─────────────── hierarchies ─────────────── */

    pub fn add_hierarchy(&mut self, name: &str, has_all: bool) -> HierarchyId {
        let id = HierarchyId(self.hierarchies.len() as u32);
        let all = has_all.then(|| Member::all(id, format!("[{name}].[All {name}]")));
        if let Some(a) = &all {
            self.register(a);
        }
        self.hierarchies.push(Hierarchy {
            id,
            name: name.into(),
            all_member: all.clone(),
            default_member: all.unwrap_or_else(|| Member::null(id)),
        });
        self.roots.push(Vec::new());
        id
    }

    /// Top-level member of `hierarchy`.
    pub fn add_root(&mut self, hierarchy: HierarchyId, name: &str) -> MemberRef {
        let h = &self.hierarchies[hierarchy.index()];
        let m = Member::regular(
            hierarchy,
            format!("[{}].[{name}]", h.name),
            name,
            h.all_member.clone(),
            self.roots[hierarchy.index()].len() as i32,
        );
        self.push_root(hierarchy, m)
    }

    fn push_root(&mut self, hierarchy: HierarchyId, m: MemberRef) -> MemberRef {
        let roots = &mut self.roots[hierarchy.index()];
        let h = &mut self.hierarchies[hierarchy.index()];
        if roots.is_empty() && !h.has_all() {
            h.default_member = m.clone();
        }
        roots.push(m.clone());
        self.register(&m);
        m
    }

    pub fn add_child(&mut self, parent: &MemberRef, name: &str) -> MemberRef {
        let siblings = self
            .children
            .entry(parent.unique_name_arc().clone())
            .or_default();
        let m = Member::regular(
            parent.hierarchy(),
            format!("{}.[{name}]", parent.unique_name()),
            name,
            Some(parent.clone()),
            siblings.len() as i32,
        );
        siblings.push(m.clone());
        self.register(&m);
        m
    }

    pub fn add_calculated_member(
        &mut self,
        hierarchy: HierarchyId,
        name: &str,
        calc: Arc<dyn Calc>,
        solve_order: i32,
        format_string: Option<&str>,
    ) -> MemberRef {
        let h = &self.hierarchies[hierarchy.index()];
        let m = Member::calculated(
            hierarchy,
            format!("[{}].[{name}]", h.name),
            name,
            h.all_member.clone(),
            i32::MAX,
            CalculatedInfo {
                calc,
                solve_order,
                format_string: format_string.map(Into::into),
            },
        );
        self.register(&m);
        m
    }

    /* ─────────────── facts ─────────────── */

    /// One fact row located at `members`, one member per hierarchy.
    pub fn add_fact(&mut self, members: &[MemberRef], values: &[(&str, CellValue)]) {
        self.facts.add_row(members, values);
    }

    pub fn facts_mut(&mut self) -> &mut InMemoryFactTable {
        &mut self.facts
    }

    /// Member by unique name, ignoring access rules.
    pub fn member(&self, unique_name: &str) -> Option<MemberRef> {
        self.by_name.get(unique_name).cloned()
    }

    /// Split into the schema and the fact table serving it.
    pub fn finish(mut self) -> (Arc<TestCube>, Arc<InMemoryFactTable>) {
        let facts = Arc::new(std::mem::take(&mut self.facts));
        (Arc::new(self), facts)
    }

    /// Engine over this cube with default settings.
    pub fn into_engine(self) -> (Engine, Arc<InMemoryFactTable>) {
        let (schema, facts) = self.finish();
        (Engine::new(schema, facts.clone()), facts)
    }

    fn visible(&self, members: &[MemberRef]) -> Vec<MemberRef> {
        members
            .iter()
            .filter(|m| self.access.can_see(m))
            .cloned()
            .collect()
    }
}

impl SchemaReader for TestCube {
    fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    fn root_members(&self, hierarchy: HierarchyId) -> Vec<MemberRef> {
        self.roots
            .get(hierarchy.index())
            .map(|r| self.visible(r))
            .unwrap_or_default()
    }

    fn children(&self, member: &Member) -> Vec<MemberRef> {
        if member.is_all() {
            return self.root_members(member.hierarchy());
        }
        self.children
            .get(member.unique_name())
            .map(|c| self.visible(c))
            .unwrap_or_default()
    }

    fn lookup_member(&self, unique_name: &str) -> Option<MemberRef> {
        self.by_name
            .get(unique_name)
            .filter(|m| self.access.can_see(m))
            .cloned()
    }
}
