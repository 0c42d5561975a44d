//! Pure grant resolution.
//!
//! - No IO
//! - No panics
//!
//! A user's effective API set is the union of the `api` of every resource
//! whose group is in the user's membership set.

use std::collections::{BTreeSet, HashSet};

use gatehouse_core::GroupId;

use crate::{ApiPath, Resource};

/// The resolved set of APIs a membership set grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    apis: BTreeSet<ApiPath>,
}

impl Grants {
    /// Resolve grants for `membership` from a set of resource rows.
    ///
    /// Rows for groups outside the membership are ignored, so callers may
    /// pass an unfiltered listing.
    pub fn resolve<'a, I>(membership: &[GroupId], resources: I) -> Self
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        let groups: HashSet<&GroupId> = membership.iter().collect();
        let apis = resources
            .into_iter()
            .filter(|r| groups.contains(&r.group_id))
            .map(|r| r.api.clone())
            .collect();
        Self { apis }
    }

    pub fn permits(&self, api: &ApiPath) -> bool {
        self.apis.contains(api)
    }

    pub fn apis(&self) -> &BTreeSet<ApiPath> {
        &self.apis
    }

    pub fn into_apis(self) -> BTreeSet<ApiPath> {
        self.apis
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;

    fn grant(group: GroupId, api: &'static str) -> Resource {
        Resource::new(group, ApiPath::new(api), Utc::now())
    }

    #[test]
    fn union_over_member_groups() {
        let editors = GroupId::new();
        let admins = GroupId::new();
        let outsiders = GroupId::new();
        let rows = vec![
            grant(editors, "/posts/publish"),
            grant(admins, "/users/ban"),
            grant(admins, "/posts/publish"),
            grant(outsiders, "/billing"),
        ];

        let grants = Grants::resolve(&[editors, admins], &rows);

        assert!(grants.permits(&ApiPath::new("/posts/publish")));
        assert!(grants.permits(&ApiPath::new("/users/ban")));
        assert!(!grants.permits(&ApiPath::new("/billing")));
        assert_eq!(grants.apis().len(), 2);
    }

    #[test]
    fn empty_membership_grants_nothing() {
        let rows = vec![grant(GroupId::new(), "/anything")];
        assert!(Grants::resolve(&[], &rows).is_empty());
    }

    const APIS: [&str; 6] = ["/a", "/b", "/c", "/d", "/e", "/f"];

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: adding a group never shrinks the granted set and
        /// removing one never grows it.
        #[test]
        fn membership_changes_are_monotonic(
            rows in prop::collection::vec((0usize..4, 0usize..APIS.len()), 0..16),
            member_mask in prop::collection::vec(any::<bool>(), 4),
            toggled in 0usize..4,
        ) {
            let groups: Vec<GroupId> = (0..4).map(|_| GroupId::new()).collect();
            let resources: Vec<Resource> = rows
                .iter()
                .map(|(g, a)| grant(groups[*g], APIS[*a]))
                .collect();

            let base: Vec<GroupId> = groups
                .iter()
                .zip(&member_mask)
                .filter(|(_, m)| **m)
                .map(|(g, _)| *g)
                .collect();
            let mut with: Vec<GroupId> = base.clone();
            if !with.contains(&groups[toggled]) {
                with.push(groups[toggled]);
            }
            let without: Vec<GroupId> = base.iter().copied().filter(|g| *g != groups[toggled]).collect();

            let before = Grants::resolve(&base, &resources);
            let added = Grants::resolve(&with, &resources);
            let removed = Grants::resolve(&without, &resources);

            prop_assert!(before.apis().is_subset(added.apis()));
            prop_assert!(removed.apis().is_subset(before.apis()));
        }
    }
}
