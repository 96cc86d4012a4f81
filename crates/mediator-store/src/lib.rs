//! Endpoint Registry: the Postgres-backed relational store, fronted by a
//! [`mediator_cache::KvCache`] for the hot lookup paths.

pub mod agents;
pub mod backups;
pub mod endpoints;
pub mod error;
pub mod kv;
pub mod models;
pub mod pairwise;
pub mod settings;
pub mod users;

pub use error::StoreError;
pub use kv::KvEntry;
pub use models::{Agent, Backup, Endpoint, Pairwise, RoutingKey, User};

use mediator_cache::KvCache;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    cache: KvCache,
}

impl Store {
    pub fn new(pool: PgPool, cache: KvCache) -> Self {
        Self { pool, cache }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cache(&self) -> &KvCache {
        &self.cache
    }
}

