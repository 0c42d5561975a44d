//! Postgres-backed document collections.
//!
//! Each collection is a table of `(id UUID, doc JSONB, deleted_at, ...)`.
//! Filters compile to JSONB predicates with every field name and value bound
//! as a parameter. Unique expression indexes (see `migrations/`) enforce the
//! keys each [`Document`] declares; SQLSTATE 23505 maps back to
//! [`StoreError::UniqueViolation`].
//!
//! ## Thread Safety
//!
//! Uses the SQLx connection pool which is safe to share (`PgPool` is an `Arc`
//! internally). Read-modify-write operations run in a transaction holding a
//! row lock (`SELECT ... FOR UPDATE`).

use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use gatehouse_core::Identifier;

use super::{
    Collection, Condition, DeleteMode, DeletedRecords, Document, Filter, FindOptions, Patch, SortOrder,
    StoreError, StoreResult,
};
use crate::config::DatabaseConfig;

const MIGRATION: &str = include_str!("../../migrations/0001_identity.sql");

/// Open a pool for the configured database.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| StoreError::Unavailable(format!("invalid database url: {e}")))?
        .database(&config.name);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("users", "connect", e))
}

/// Create the identity tables and unique indexes if missing. Idempotent.
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::raw_sql(MIGRATION)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("users", "migrate", e))?;
    tracing::info!("identity schema is up to date");
    Ok(())
}

/// A bound query parameter.
#[derive(Debug, Clone)]
enum Bind {
    Text(String),
    Json(Value),
    BigInt(i64),
}

/// SQL text plus its parameters, numbered from `$1`.
#[derive(Debug, Default)]
struct Statement {
    sql: String,
    binds: Vec<Bind>,
}

impl Statement {
    fn push_bind(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    fn push_where(&mut self, filter: &Filter) {
        let mut clauses = vec![match filter.deleted() {
            DeletedRecords::Exclude => "deleted_at IS NULL".to_string(),
            DeletedRecords::Include => "TRUE".to_string(),
            DeletedRecords::Only => "deleted_at IS NOT NULL".to_string(),
        }];

        for condition in filter.conditions() {
            let field = self.push_bind(Bind::Text(condition.field().to_string()));
            let clause = match condition {
                Condition::Eq { value, .. } => {
                    let value = self.push_bind(Bind::Json(value.clone()));
                    format!("doc -> {field} = {value}")
                }
                Condition::In { values, .. } if values.is_empty() => "FALSE".to_string(),
                Condition::In { values, .. } => {
                    let values = self.push_bind(Bind::Json(Value::Array(values.clone())));
                    format!("{values} @> jsonb_build_array(doc -> {field})")
                }
                Condition::Contains { value, .. } => {
                    let value = self.push_bind(Bind::Json(Value::Array(vec![value.clone()])));
                    format!("doc -> {field} @> {value}")
                }
            };
            clauses.push(clause);
        }

        self.sql.push_str(" WHERE ");
        self.sql.push_str(&clauses.join(" AND "));
    }

    fn push_paging(&mut self, options: &FindOptions) {
        let mut order = Vec::with_capacity(options.sort.len() + 1);
        for (field, direction) in &options.sort {
            let field = self.push_bind(Bind::Text((*field).to_string()));
            let direction = match direction {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            order.push(format!("doc -> {field} {direction}"));
        }
        order.push("id ASC".to_string());
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(&order.join(", "));

        if let Some(limit) = options.limit {
            let limit = self.push_bind(Bind::BigInt(i64::try_from(limit).unwrap_or(i64::MAX)));
            self.sql.push_str(&format!(" LIMIT {limit}"));
        }
        if options.skip > 0 {
            let skip = self.push_bind(Bind::BigInt(i64::try_from(options.skip).unwrap_or(i64::MAX)));
            self.sql.push_str(&format!(" OFFSET {skip}"));
        }
    }

    fn query(&self) -> Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                Bind::Text(text) => query.bind(text.clone()),
                Bind::Json(value) => query.bind(Json(value.clone())),
                Bind::BigInt(n) => query.bind(*n),
            };
        }
        query
    }
}

/// Postgres collection of `D` documents (table `D::COLLECTION`).
#[derive(Debug, Clone)]
pub struct PgCollection<D> {
    pool: PgPool,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Document> PgCollection<D> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _doc: PhantomData,
        }
    }

    fn err(operation: &str, err: sqlx::Error) -> StoreError {
        map_sqlx_error(D::COLLECTION, operation, err)
    }

    fn decode(row: &sqlx::postgres::PgRow) -> StoreResult<D> {
        let Json(doc): Json<Value> = row.try_get("doc").map_err(|e| StoreError::Malformed {
            collection: D::COLLECTION,
            message: e.to_string(),
        })?;
        serde_json::from_value(doc).map_err(|e| StoreError::Malformed {
            collection: D::COLLECTION,
            message: e.to_string(),
        })
    }

    /// Patch the given locked rows inside `tx`.
    async fn patch_rows(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        rows: Vec<sqlx::postgres::PgRow>,
        patch: &Patch,
    ) -> StoreResult<u64> {
        let mut updated = 0;
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| Self::err("patch", e))?;
            let Json(mut doc): Json<Value> = row.try_get("doc").map_err(|e| Self::err("patch", e))?;
            patch.apply(&mut doc)?;
            serde_json::from_value::<D>(doc.clone()).map_err(|e| StoreError::InvalidPatch(e.to_string()))?;

            let sql = format!(
                "UPDATE {} SET doc = $2, updated_at = NOW() WHERE id = $1",
                D::COLLECTION
            );
            sqlx::query(&sql)
                .bind(id)
                .bind(Json(doc))
                .execute(&mut **tx)
                .await
                .map_err(|e| Self::err("patch", e))?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl<D: Document> Collection<D> for PgCollection<D> {
    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let mut stmt = Statement {
            sql: format!("SELECT COUNT(*) AS n FROM {}", D::COLLECTION),
            ..Default::default()
        };
        stmt.push_where(filter);

        let row = stmt
            .query()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::err("count", e))?;
        let n: i64 = row.try_get("n").map_err(|e| Self::err("count", e))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<D>> {
        let mut stmt = Statement {
            sql: format!("SELECT doc FROM {}", D::COLLECTION),
            ..Default::default()
        };
        stmt.push_where(filter);
        stmt.push_paging(&FindOptions::new().limit(1));

        let row = stmt
            .query()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::err("find_one", e))?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<D>> {
        let mut stmt = Statement {
            sql: format!("SELECT doc FROM {}", D::COLLECTION),
            ..Default::default()
        };
        stmt.push_where(filter);
        stmt.push_paging(options);

        let rows = stmt
            .query()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::err("find_many", e))?;
        rows.iter().map(Self::decode).collect()
    }

    async fn insert(&self, doc: &D) -> StoreResult<()> {
        let value = serde_json::to_value(doc).map_err(|e| StoreError::Malformed {
            collection: D::COLLECTION,
            message: e.to_string(),
        })?;
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", D::COLLECTION);
        sqlx::query(&sql)
            .bind(*doc.id().as_uuid())
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(|e| Self::err("insert", e))?;
        Ok(())
    }

    async fn update_by_id(&self, id: D::Id, patch: &Patch) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| Self::err("begin", e))?;
        let sql = format!(
            "SELECT id, doc FROM {} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            D::COLLECTION
        );
        let rows = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| Self::err("update_by_id", e))?;

        let updated = Self::patch_rows(&mut tx, rows, patch).await?;
        tx.commit().await.map_err(|e| Self::err("commit", e))?;
        Ok(updated > 0)
    }

    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(|e| Self::err("begin", e))?;
        // Soft-deleted documents are never patched.
        let live = Filter {
            deleted: DeletedRecords::Exclude,
            ..filter.clone()
        };
        let mut stmt = Statement {
            sql: format!("SELECT id, doc FROM {}", D::COLLECTION),
            ..Default::default()
        };
        stmt.push_where(&live);
        stmt.sql.push_str(" ORDER BY id FOR UPDATE");

        let rows = stmt
            .query()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| Self::err("update_many", e))?;

        let updated = Self::patch_rows(&mut tx, rows, patch).await?;
        tx.commit().await.map_err(|e| Self::err("commit", e))?;
        Ok(updated)
    }

    async fn remove_by_id(&self, id: D::Id, mode: DeleteMode) -> StoreResult<bool> {
        let sql = match mode {
            DeleteMode::Soft => format!(
                "UPDATE {} SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
                D::COLLECTION
            ),
            DeleteMode::Hard => format!("DELETE FROM {} WHERE id = $1", D::COLLECTION),
        };
        let result = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::err("remove_by_id", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_many(&self, filter: &Filter, mode: DeleteMode) -> StoreResult<u64> {
        let mut stmt = Statement {
            sql: match mode {
                DeleteMode::Soft => format!("UPDATE {} SET deleted_at = NOW()", D::COLLECTION),
                DeleteMode::Hard => format!("DELETE FROM {}", D::COLLECTION),
            },
            ..Default::default()
        };
        stmt.push_where(filter);
        if mode == DeleteMode::Soft {
            stmt.sql.push_str(" AND deleted_at IS NULL");
        }

        let result = stmt
            .query()
            .execute(&self.pool)
            .await
            .map_err(|e| Self::err("remove_many", e))?;
        Ok(result.rows_affected())
    }

    async fn restore_by_id(&self, id: D::Id) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET deleted_at = NULL WHERE id = $1 AND deleted_at IS NOT NULL",
            D::COLLECTION
        );
        let result = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::err("restore_by_id", e))?;
        Ok(result.rows_affected() > 0)
    }
}

/// Map SQLx errors to [`StoreError`].
fn map_sqlx_error(collection: &'static str, operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StoreError::UniqueViolation {
                collection,
                key: db_err
                    .constraint()
                    .map(|c| if c.ends_with("_pkey") { "id" } else { c })
                    .unwrap_or("unknown")
                    .to_string(),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout(format!("{operation} on {collection}")),
        other => StoreError::Unavailable(format!("{operation} on {collection}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filters_compile_to_bound_jsonb_predicates() {
        let mut stmt = Statement {
            sql: "SELECT doc FROM credentials".into(),
            ..Default::default()
        };
        stmt.push_where(
            &Filter::new()
                .eq("type", "email")
                .eq("third", false)
                .one_of("group", ["g1", "g2"])
                .contains("groups", "g3"),
        );

        assert_eq!(
            stmt.sql,
            "SELECT doc FROM credentials WHERE deleted_at IS NULL \
             AND doc -> $1 = $2 AND doc -> $3 = $4 \
             AND $6 @> jsonb_build_array(doc -> $5) AND doc -> $7 @> $8"
        );
        assert_eq!(stmt.binds.len(), 8);
        assert!(matches!(&stmt.binds[7], Bind::Json(v) if *v == json!(["g3"])));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut stmt = Statement::default();
        stmt.push_where(&Filter::new().one_of::<&str, _>("group", []).include_deleted());
        assert_eq!(stmt.sql, " WHERE TRUE AND FALSE");
    }

    #[test]
    fn paging_orders_by_id_last() {
        let mut stmt = Statement::default();
        stmt.push_paging(&FindOptions::new().sort_by("name", SortOrder::Descending).skip(5).limit(10));
        assert_eq!(stmt.sql, " ORDER BY doc -> $1 DESC, id ASC LIMIT $2 OFFSET $3");
    }
}
