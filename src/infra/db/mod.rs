//! Postgres-backed repository implementations.

mod assets;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{AssetFilter, RepoError, TagMatch};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Append ` AND ...` predicates for `filter`. Assumes an open `WHERE`.
    fn apply_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q AssetFilter) {
        if !filter.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }

        match &filter.tags {
            TagMatch::Any => {}
            TagMatch::Has(tag) => {
                qb.push(" AND tags @> ARRAY[");
                qb.push_bind(tag);
                qb.push("]::text[]");
            }
            TagMatch::HasSome(tags) => {
                qb.push(" AND tags && ");
                qb.push_bind(tags);
                qb.push("::text[]");
            }
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
