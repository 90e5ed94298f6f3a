use std::sync::Arc;

use crate::member::{HierarchyId, Member, MemberRef};

/// Static description of one hierarchy in the cube.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub id: HierarchyId,
    pub name: Arc<str>,
    pub all_member: Option<MemberRef>,
    /// `All` when present, otherwise the first root member (or the default
    /// measure for `[Measures]`).
    pub default_member: MemberRef,
}

impl Hierarchy {
    pub fn has_all(&self) -> bool {
        self.all_member.is_some()
    }
}

/// Role-based visibility filter applied by a [`SchemaReader`].
pub trait AccessPredicate: Send + Sync {
    fn can_see(&self, member: &Member) -> bool;
}

/// Grants access to every member.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPredicate for AllowAll {
    fn can_see(&self, _member: &Member) -> bool {
        true
    }
}

/// Hides every member whose unique name starts with one of the given
/// prefixes (the member itself and, by naming convention, its descendants).
#[derive(Debug, Default, Clone)]
pub struct DenyPrefixes(pub Vec<String>);

impl AccessPredicate for DenyPrefixes {
    fn can_see(&self, member: &Member) -> bool {
        !self
            .0
            .iter()
            .any(|p| member.unique_name().starts_with(p.as_str()))
    }
}

/// Metadata collaborator: hierarchies, members and calculated members,
/// already filtered by the caller's access predicate.
pub trait SchemaReader: Send + Sync {
    fn hierarchies(&self) -> &[Hierarchy];

    fn hierarchy(&self, id: HierarchyId) -> Option<&Hierarchy> {
        self.hierarchies().get(id.index())
    }

    /// Root members of a hierarchy (children of `All` when it has one).
    fn root_members(&self, hierarchy: HierarchyId) -> Vec<MemberRef>;

    fn children(&self, member: &Member) -> Vec<MemberRef>;

    /// Look up any member, stored or calculated, by unique name.
    fn lookup_member(&self, unique_name: &str) -> Option<MemberRef>;

    fn calculated_member(&self, unique_name: &str) -> Option<MemberRef> {
        self.lookup_member(unique_name).filter(|m| m.is_calculated())
    }
}
