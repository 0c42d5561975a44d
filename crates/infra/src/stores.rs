//! The bundle of collections the identity service owns.

use std::sync::Arc;

use sqlx::PgPool;

use gatehouse_auth::{Credential, Group, Resource, User};

use crate::store::{Collection, InMemoryCollection, PgCollection};

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn Collection<User>>,
    pub credentials: Arc<dyn Collection<Credential>>,
    pub groups: Arc<dyn Collection<Group>>,
    pub resources: Arc<dyn Collection<Resource>>,
}

impl Stores {
    /// Process-local collections, for tests and database-less runs.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryCollection::<User>::new()),
            credentials: Arc::new(InMemoryCollection::<Credential>::new()),
            groups: Arc::new(InMemoryCollection::<Group>::new()),
            resources: Arc::new(InMemoryCollection::<Resource>::new()),
        }
    }

    /// Collections backed by a migrated Postgres database.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgCollection::<User>::new(pool.clone())),
            credentials: Arc::new(PgCollection::<Credential>::new(pool.clone())),
            groups: Arc::new(PgCollection::<Group>::new(pool.clone())),
            resources: Arc::new(PgCollection::<Resource>::new(pool)),
        }
    }
}
