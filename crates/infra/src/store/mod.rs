//! Document-store port consumed by the identity service.
//!
//! Each collection (users, credentials, groups, resources) is a [`Collection`]
//! of typed documents. Queries are expressed as field [`Filter`]s and writes as
//! [`Patch`]es so the same request runs unchanged against the in-memory and
//! Postgres backends.
//!
//! Uniqueness is declared per document type ([`Document::unique_keys`]) and
//! enforced by the backend at write time. That rejection is the final arbiter
//! for concurrent writers: callers must treat
//! [`StoreError::UniqueViolation`] like a failed duplicate pre-check.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use gatehouse_core::{Entity, Identifier};

pub mod documents;
pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCollection;
pub use postgres::PgCollection;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write collided with an existing document on a unique key.
    #[error("unique key '{key}' violated in '{collection}'")]
    UniqueViolation { collection: &'static str, key: String },

    /// The backend could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within its configured deadline.
    #[error("store timed out: {0}")]
    Timeout(String),

    /// A stored document could not be decoded.
    #[error("malformed document in '{collection}': {message}")]
    Malformed { collection: &'static str, message: String },

    /// A patch could not be applied to a document.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

/// Whether a record scope applies to every record or only to live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueScope {
    /// Soft-deleted records keep holding their key.
    AllRecords,
    /// Soft-deleted records release their key.
    LiveRecords,
}

/// A declared uniqueness constraint.
///
/// `name` doubles as the Postgres index name so violations map back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub scope: UniqueScope,
}

/// A typed record stored in a collection.
pub trait Document: Entity + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (table) name.
    const COLLECTION: &'static str;

    fn unique_keys() -> &'static [UniqueKey] {
        &[]
    }
}

/// Removal semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Tombstone: the record stays but is hidden from default queries.
    Soft,
    /// Permanent erase.
    Hard,
}

/// Which records a filter sees with respect to soft deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedRecords {
    #[default]
    Exclude,
    Include,
    Only,
}

impl DeletedRecords {
    pub(crate) fn admits(self, deleted: bool) -> bool {
        match self {
            DeletedRecords::Exclude => !deleted,
            DeletedRecords::Include => true,
            DeletedRecords::Only => deleted,
        }
    }
}

/// One field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field == value`
    Eq { field: &'static str, value: Value },
    /// `field` is one of `values`
    In { field: &'static str, values: Vec<Value> },
    /// array `field` contains `value`
    Contains { field: &'static str, value: Value },
}

impl Condition {
    pub fn field(&self) -> &'static str {
        match self {
            Condition::Eq { field, .. }
            | Condition::In { field, .. }
            | Condition::Contains { field, .. } => field,
        }
    }

    fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq { value, .. } => actual == value,
            Condition::In { values, .. } => values.contains(actual),
            Condition::Contains { value, .. } => actual
                .as_array()
                .is_some_and(|items| items.contains(value)),
        }
    }
}

/// Conjunction of field conditions plus a soft-deletion mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    deleted: DeletedRecords,
}

impl Filter {
    /// Matches every live document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id<I: Identifier>(id: I) -> Self {
        Self::new().eq("id", Value::String(id.as_uuid().to_string()))
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field,
            value: value.into(),
        });
        self
    }

    pub fn one_of<V, I>(mut self, field: &'static str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.conditions.push(Condition::In {
            field,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn contains(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains {
            field,
            value: value.into(),
        });
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.deleted = DeletedRecords::Include;
        self
    }

    pub fn only_deleted(mut self) -> Self {
        self.deleted = DeletedRecords::Only;
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn deleted(&self) -> DeletedRecords {
        self.deleted
    }

    /// Evaluate against a serialized document.
    pub fn matches(&self, doc: &Value, deleted: bool) -> bool {
        self.deleted.admits(deleted) && self.conditions.iter().all(|c| c.matches(doc))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PatchOp {
    Set { field: &'static str, value: Value },
    AddToSet { field: &'static str, values: Vec<Value> },
    Pull { field: &'static str, values: Vec<Value> },
}

/// Field-level update applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::Set {
            field,
            value: value.into(),
        });
        self
    }

    /// Append each value to array `field` unless already present.
    pub fn add_to_set<V, I>(mut self, field: &'static str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.ops.push(PatchOp::AddToSet {
            field,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Remove every occurrence of each value from array `field`.
    pub fn pull<V, I>(mut self, field: &'static str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.ops.push(PatchOp::Pull {
            field,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply to a serialized document in place.
    pub fn apply(&self, doc: &mut Value) -> StoreResult<()> {
        let object = doc
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPatch("document is not an object".into()))?;

        for op in &self.ops {
            match op {
                PatchOp::Set { field, .. } | PatchOp::AddToSet { field, .. } | PatchOp::Pull { field, .. }
                    if *field == "id" =>
                {
                    return Err(StoreError::InvalidPatch("the id field is immutable".into()));
                }
                PatchOp::Set { field, value } => {
                    object.insert((*field).to_string(), value.clone());
                }
                PatchOp::AddToSet { field, values } => {
                    let slot = object.entry((*field).to_string()).or_insert(Value::Array(Vec::new()));
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    let items = slot
                        .as_array_mut()
                        .ok_or_else(|| StoreError::InvalidPatch(format!("'{field}' is not an array")))?;
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                }
                PatchOp::Pull { field, values } => {
                    if let Some(slot) = object.get_mut(*field) {
                        let items = slot
                            .as_array_mut()
                            .ok_or_else(|| StoreError::InvalidPatch(format!("'{field}' is not an array")))?;
                        items.retain(|item| !values.contains(item));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Ordering and paging for `find_many`.
///
/// Without an explicit sort, results come back in id order (which is
/// creation order for UUIDv7 ids).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<(&'static str, SortOrder)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: &'static str, order: SortOrder) -> Self {
        self.sort.push((field, order));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compare two serialized documents by the configured sort keys.
    pub(crate) fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, order) in &self.sort {
            let left = a.get(*field).unwrap_or(&Value::Null);
            let right = b.get(*field).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Per-collection persistence operations.
///
/// `update_*` and soft removal only touch live documents. Hard removal by id
/// erases the record whether or not it was tombstoned.
#[async_trait]
pub trait Collection<D: Document>: Send + Sync {
    async fn count(&self, filter: &Filter) -> StoreResult<u64>;

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<D>>;

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<D>>;

    async fn insert(&self, doc: &D) -> StoreResult<()>;

    /// Returns whether a live document matched.
    async fn update_by_id(&self, id: D::Id, patch: &Patch) -> StoreResult<bool>;

    /// Returns the number of documents updated.
    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64>;

    /// Returns whether a document was removed.
    async fn remove_by_id(&self, id: D::Id, mode: DeleteMode) -> StoreResult<bool>;

    async fn remove_many(&self, filter: &Filter, mode: DeleteMode) -> StoreResult<u64>;

    /// Clear a soft-delete tombstone. Returns whether a tombstoned document
    /// matched.
    async fn restore_by_id(&self, id: D::Id) -> StoreResult<bool>;

    async fn find_by_id(&self, id: D::Id) -> StoreResult<Option<D>> {
        self.find_one(&Filter::by_id(id)).await
    }

    async fn exists(&self, filter: &Filter) -> StoreResult<bool> {
        Ok(self.count(filter).await? > 0)
    }
}
