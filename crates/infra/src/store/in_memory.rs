//! In-memory document collections for tests/dev.
//!
//! Every write takes the collection's write lock for its whole check-and-write
//! step, so unique keys are enforced atomically just like a database index.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use gatehouse_core::Identifier;

use super::{
    Collection, DeleteMode, Document, Filter, FindOptions, Patch, StoreError, StoreResult, UniqueScope,
};

#[derive(Debug, Clone)]
struct Record {
    doc: Value,
    deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// In-memory collection of `D` documents.
#[derive(Debug)]
pub struct InMemoryCollection<D> {
    records: RwLock<BTreeMap<Uuid, Record>>,
    _doc: PhantomData<fn() -> D>,
}

impl<D> InMemoryCollection<D> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            _doc: PhantomData,
        }
    }
}

impl<D> Default for InMemoryCollection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> InMemoryCollection<D> {
    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<Uuid, Record>>> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable(format!("{} lock poisoned", D::COLLECTION)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<Uuid, Record>>> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable(format!("{} lock poisoned", D::COLLECTION)))
    }

    fn decode(doc: &Value) -> StoreResult<D> {
        serde_json::from_value(doc.clone()).map_err(|e| StoreError::Malformed {
            collection: D::COLLECTION,
            message: e.to_string(),
        })
    }

    fn encode(doc: &D) -> StoreResult<Value> {
        serde_json::to_value(doc).map_err(|e| StoreError::Malformed {
            collection: D::COLLECTION,
            message: e.to_string(),
        })
    }

    /// Reject `candidate` (about to be stored under `id`) if it collides with
    /// another record on any declared unique key.
    fn check_unique(
        records: &BTreeMap<Uuid, Record>,
        id: Uuid,
        candidate: &Value,
        candidate_deleted: bool,
    ) -> StoreResult<()> {
        for key in D::unique_keys() {
            if key.scope == UniqueScope::LiveRecords && candidate_deleted {
                continue;
            }
            let wanted: Vec<&Value> = key
                .fields
                .iter()
                .map(|f| candidate.get(*f).unwrap_or(&Value::Null))
                .collect();

            let collides = records.iter().any(|(other_id, other)| {
                if *other_id == id {
                    return false;
                }
                if key.scope == UniqueScope::LiveRecords && other.is_deleted() {
                    return false;
                }
                key.fields
                    .iter()
                    .zip(&wanted)
                    .all(|(f, v)| other.doc.get(*f).unwrap_or(&Value::Null) == *v)
            });

            if collides {
                return Err(StoreError::UniqueViolation {
                    collection: D::COLLECTION,
                    key: key.name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Patch one live record in place, keeping the original on failure.
    fn patch_record(records: &mut BTreeMap<Uuid, Record>, id: Uuid, patch: &Patch) -> StoreResult<bool> {
        let Some(record) = records.get(&id) else {
            return Ok(false);
        };
        if record.is_deleted() {
            return Ok(false);
        }

        let mut updated = record.doc.clone();
        patch.apply(&mut updated)?;
        // Round-trip through the typed document so a patch can never store
        // something the collection cannot read back.
        Self::decode(&updated)?;
        Self::check_unique(records, id, &updated, false)?;

        if let Some(record) = records.get_mut(&id) {
            record.doc = updated;
        }
        Ok(true)
    }
}

#[async_trait]
impl<D: Document> Collection<D> for InMemoryCollection<D> {
    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let records = self.read()?;
        Ok(records
            .values()
            .filter(|r| filter.matches(&r.doc, r.is_deleted()))
            .count() as u64)
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<D>> {
        let records = self.read()?;
        records
            .values()
            .find(|r| filter.matches(&r.doc, r.is_deleted()))
            .map(|r| Self::decode(&r.doc))
            .transpose()
    }

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<D>> {
        let records = self.read()?;
        let mut matched: Vec<&Value> = records
            .values()
            .filter(|r| filter.matches(&r.doc, r.is_deleted()))
            .map(|r| &r.doc)
            .collect();

        // Stable sort keeps id order among equal keys.
        matched.sort_by(|a, b| options.compare(a, b));

        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        matched
            .into_iter()
            .skip(options.skip as usize)
            .take(limit)
            .map(Self::decode)
            .collect()
    }

    async fn insert(&self, doc: &D) -> StoreResult<()> {
        let id = *doc.id().as_uuid();
        let value = Self::encode(doc)?;

        let mut records = self.write()?;
        if records.contains_key(&id) {
            return Err(StoreError::UniqueViolation {
                collection: D::COLLECTION,
                key: "id".to_string(),
            });
        }
        Self::check_unique(&records, id, &value, false)?;
        records.insert(
            id,
            Record {
                doc: value,
                deleted_at: None,
            },
        );
        Ok(())
    }

    async fn update_by_id(&self, id: D::Id, patch: &Patch) -> StoreResult<bool> {
        let mut records = self.write()?;
        Self::patch_record(&mut records, *id.as_uuid(), patch)
    }

    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        let mut records = self.write()?;
        let ids: Vec<Uuid> = records
            .iter()
            .filter(|(_, r)| !r.is_deleted() && filter.matches(&r.doc, false))
            .map(|(id, _)| *id)
            .collect();

        // Validate every patched document before touching any, so a failing
        // batch leaves the collection unchanged.
        let mut staged = records.clone();
        let mut updated = 0;
        for id in ids {
            if Self::patch_record(&mut staged, id, patch)? {
                updated += 1;
            }
        }
        *records = staged;
        Ok(updated)
    }

    async fn remove_by_id(&self, id: D::Id, mode: DeleteMode) -> StoreResult<bool> {
        let mut records = self.write()?;
        let key = *id.as_uuid();
        match mode {
            DeleteMode::Hard => Ok(records.remove(&key).is_some()),
            DeleteMode::Soft => match records.get_mut(&key) {
                Some(record) if !record.is_deleted() => {
                    record.deleted_at = Some(Utc::now());
                    Ok(true)
                }
                _ => Ok(false),
            },
        }
    }

    async fn remove_many(&self, filter: &Filter, mode: DeleteMode) -> StoreResult<u64> {
        let mut records = self.write()?;
        let ids: Vec<Uuid> = records
            .iter()
            .filter(|(_, r)| filter.matches(&r.doc, r.is_deleted()))
            .filter(|(_, r)| mode == DeleteMode::Hard || !r.is_deleted())
            .map(|(id, _)| *id)
            .collect();

        let now = Utc::now();
        for id in &ids {
            match mode {
                DeleteMode::Hard => {
                    records.remove(id);
                }
                DeleteMode::Soft => {
                    if let Some(record) = records.get_mut(id) {
                        record.deleted_at = Some(now);
                    }
                }
            }
        }
        Ok(ids.len() as u64)
    }

    async fn restore_by_id(&self, id: D::Id) -> StoreResult<bool> {
        let mut records = self.write()?;
        let key = *id.as_uuid();
        let Some(record) = records.get(&key) else {
            return Ok(false);
        };
        if !record.is_deleted() {
            return Ok(false);
        }
        let doc = record.doc.clone();
        Self::check_unique(&records, key, &doc, false)?;
        if let Some(record) = records.get_mut(&key) {
            record.deleted_at = None;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use gatehouse_auth::{Credential, CredentialType, NewCredential, NewGroup, NewUser, User};
    use gatehouse_core::{CredentialId, GroupId, UserId};

    use super::*;
    use crate::store::SortOrder;

    fn user(name: &str) -> User {
        NewUser::new(name).into_user(UserId::new(), Utc::now())
    }

    fn credential(name: &str, owner: UserId) -> Credential {
        NewCredential::password(CredentialType::EMAIL, name, "pw").into_credential(
            CredentialId::new(),
            owner,
            "hash".into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_enforces_unique_keys() {
        let users = InMemoryCollection::<User>::new();
        users.insert(&user("alice")).await.unwrap();

        let err = users.insert(&user("alice")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::UniqueViolation {
                collection: "users",
                key: "users_name_key".into()
            }
        );
    }

    #[tokio::test]
    async fn soft_deleted_user_keeps_its_name_reserved() {
        let users = InMemoryCollection::<User>::new();
        let alice = user("alice");
        users.insert(&alice).await.unwrap();
        assert!(users.remove_by_id(alice.id, DeleteMode::Soft).await.unwrap());

        assert!(users.find_by_id(alice.id).await.unwrap().is_none());
        assert!(users.insert(&user("alice")).await.unwrap_err().is_unique_violation());
        assert_eq!(users.count(&Filter::new().include_deleted()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn soft_deleted_credential_releases_its_login() {
        let credentials = InMemoryCollection::<Credential>::new();
        let first = credential("a@x.com", UserId::new());
        credentials.insert(&first).await.unwrap();
        credentials.remove_by_id(first.id, DeleteMode::Soft).await.unwrap();

        credentials.insert(&credential("a@x.com", UserId::new())).await.unwrap();

        // The tombstone cannot come back while the login is taken again.
        let err = credentials.restore_by_id(first.id).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn tombstoned_group_keeps_its_name_until_purged() {
        let groups = InMemoryCollection::<gatehouse_auth::Group>::new();
        let staff = NewGroup::new("staff").into_group(GroupId::new(), Utc::now());
        groups.insert(&staff).await.unwrap();
        groups.remove_by_id(staff.id, DeleteMode::Soft).await.unwrap();

        let again = NewGroup::new("staff").into_group(GroupId::new(), Utc::now());
        assert!(groups.insert(&again).await.unwrap_err().is_unique_violation());

        groups.remove_by_id(staff.id, DeleteMode::Hard).await.unwrap();
        groups.insert(&again).await.unwrap();
    }

    #[tokio::test]
    async fn update_rejects_collisions_and_keeps_original() {
        let users = InMemoryCollection::<User>::new();
        let alice = user("alice");
        let bob = user("bob");
        users.insert(&alice).await.unwrap();
        users.insert(&bob).await.unwrap();

        let err = users
            .update_by_id(bob.id, &Patch::new().set(User::FIELD_NAME, "alice"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(users.find_by_id(bob.id).await.unwrap().unwrap().name, "bob");
    }

    #[tokio::test]
    async fn update_many_patches_only_matching_live_documents() {
        let credentials = InMemoryCollection::<Credential>::new();
        let owner = UserId::new();
        let a = credential("a@x.com", owner);
        let b = credential("b@x.com", owner);
        let other = credential("c@x.com", UserId::new());
        for c in [&a, &b, &other] {
            credentials.insert(c).await.unwrap();
        }
        credentials.remove_by_id(b.id, DeleteMode::Soft).await.unwrap();

        let updated = credentials
            .update_many(
                &Filter::new().eq(Credential::FIELD_USER_ID, owner),
                &Patch::new().set(Credential::FIELD_SECRET, "new-hash"),
            )
            .await
            .unwrap();

        assert_eq!(updated, 1);
        let a = credentials.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.secret, "new-hash");
        let other = credentials.find_by_id(other.id).await.unwrap().unwrap();
        assert_eq!(other.secret, "hash");
    }

    #[tokio::test]
    async fn membership_patches_and_contains_filter() {
        let users = InMemoryCollection::<User>::new();
        let alice = user("alice");
        users.insert(&alice).await.unwrap();
        let editors = GroupId::new();

        let patch = Patch::new().add_to_set(User::FIELD_GROUPS, [editors, editors]);
        assert!(users.update_by_id(alice.id, &patch).await.unwrap());

        let members = Filter::new().contains(User::FIELD_GROUPS, editors);
        assert_eq!(users.count(&members).await.unwrap(), 1);
        assert_eq!(users.find_by_id(alice.id).await.unwrap().unwrap().groups, vec![editors]);

        let pull = Patch::new().pull(User::FIELD_GROUPS, [editors]);
        users.update_by_id(alice.id, &pull).await.unwrap();
        assert_eq!(users.count(&members).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_many_sorts_and_pages() {
        let groups = InMemoryCollection::<gatehouse_auth::Group>::new();
        for name in ["c", "a", "b", "d"] {
            let group = NewGroup::new(name).into_group(GroupId::new(), Utc::now());
            groups.insert(&group).await.unwrap();
        }

        let page = groups
            .find_many(
                &Filter::new(),
                &FindOptions::new()
                    .sort_by(gatehouse_auth::Group::FIELD_NAME, SortOrder::Ascending)
                    .skip(1)
                    .limit(2),
            )
            .await
            .unwrap();

        let names: Vec<_> = page.into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn hard_remove_purges_tombstones() {
        let users = InMemoryCollection::<User>::new();
        let alice = user("alice");
        users.insert(&alice).await.unwrap();
        users.remove_by_id(alice.id, DeleteMode::Soft).await.unwrap();

        assert!(users.remove_by_id(alice.id, DeleteMode::Hard).await.unwrap());
        assert_eq!(users.count(&Filter::new().include_deleted()).await.unwrap(), 0);
        users.insert(&user("alice")).await.unwrap();
    }
}
