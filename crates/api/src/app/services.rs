//! Service wiring: stores, hasher, identity service, code issuer.

use std::sync::Arc;

use anyhow::Context;

use gatehouse_auth::{ApiPath, DEFAULT_GROUPS, SecretHasher};
use gatehouse_identity::{IdentityResult, IdentityService, Stores};
use gatehouse_infra::codes::{CodeIssuer, LogDelivery};
use gatehouse_infra::config::AppConfig;
use gatehouse_infra::store::postgres;

use crate::app::routes::admin::ADMIN_APIS;

/// Group granted every admin route at startup.
pub const OWNER_GROUP: &str = DEFAULT_GROUPS[4];

pub struct AppServices {
    pub identity: Arc<IdentityService>,
    pub codes: Arc<CodeIssuer>,
}

/// Build services from configuration: Postgres when a database URL is set,
/// in-memory otherwise. Seeds default groups and admin grants.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let stores = if config.database.is_configured() {
        let pool = postgres::connect(&config.database)
            .await
            .context("failed to connect to the database")?;
        postgres::migrate(&pool).await.context("failed to migrate the database")?;
        tracing::info!(database = %config.database.name, "using postgres store");
        Stores::postgres(pool)
    } else {
        tracing::warn!("no database configured; using in-memory store");
        Stores::in_memory()
    };

    let hasher = SecretHasher::with_params(
        config.hashing.memory_kib,
        config.hashing.iterations,
        config.hashing.parallelism,
    )
    .context("invalid hashing parameters")?;

    let services = AppServices {
        identity: Arc::new(IdentityService::new(stores, hasher)),
        codes: Arc::new(CodeIssuer::new(Arc::new(LogDelivery), config.codes.ttl_secs, config.debug)),
    };

    bootstrap(&services.identity, config.owner.as_deref())
        .await
        .context("failed to seed identity data")?;

    Ok(services)
}

/// Seed default groups, grant admin routes to the owner group and, if named,
/// make `owner` a member of it. Idempotent.
pub async fn bootstrap(identity: &IdentityService, owner: Option<&str>) -> IdentityResult<()> {
    let groups = identity.ensure_default_groups().await?;
    let Some(owner_group) = groups.into_iter().find(|g| g.name == OWNER_GROUP) else {
        return Ok(());
    };

    for api in ADMIN_APIS {
        identity.add_resource(owner_group.id, ApiPath::new(*api)).await?;
    }

    if let Some(name) = owner {
        match identity.find_user_by_name(name).await? {
            Some(user) => {
                identity.add_user_to_groups(user.id, &[owner_group.id]).await?;
                tracing::info!(user_id = %user.id, name, "owner assigned");
            }
            None => tracing::warn!(name, "configured owner does not exist yet"),
        }
    }
    Ok(())
}
