//! Collection bindings for the identity records.

use gatehouse_auth::{Credential, Group, Resource, User};

use super::{Document, UniqueKey, UniqueScope};

impl Document for User {
    const COLLECTION: &'static str = "users";

    // Names stay reserved after a soft delete.
    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey {
            name: "users_name_key",
            fields: &[User::FIELD_NAME],
            scope: UniqueScope::AllRecords,
        }]
    }
}

impl Document for Credential {
    const COLLECTION: &'static str = "credentials";

    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey {
            name: "credentials_login_key",
            fields: &[Credential::FIELD_TYPE, Credential::FIELD_NAME, Credential::FIELD_THIRD],
            scope: UniqueScope::LiveRecords,
        }]
    }
}

impl Document for Group {
    const COLLECTION: &'static str = "groups";

    // A tombstoned group is either restored or purged, so it keeps its name.
    fn unique_keys() -> &'static [UniqueKey] {
        &[UniqueKey {
            name: "groups_name_key",
            fields: &[Group::FIELD_NAME],
            scope: UniqueScope::AllRecords,
        }]
    }
}

// Duplicate grants are harmless, so resources carry no unique key.
impl Document for Resource {
    const COLLECTION: &'static str = "resources";
}
