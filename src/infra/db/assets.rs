use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, query};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::PageSpec,
        repos::{AssetFilter, AssetSlice, AssetsRepo, NewAsset, RepoError},
    },
    domain::{entities::AssetRecord, types::AssetKind},
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "id, url, tags, title, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: String,
    url: String,
    tags: Vec<String>,
    title: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl AssetRow {
    fn into_record(self, kind: AssetKind) -> AssetRecord {
        AssetRecord {
            id: self.id,
            kind,
            url: self.url,
            tags: self.tags,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

fn select_from<'q>(kind: AssetKind) -> QueryBuilder<'q, Postgres> {
    QueryBuilder::new(format!(
        "SELECT {COLUMNS} FROM {} WHERE 1=1",
        kind.table()
    ))
}

#[async_trait]
impl AssetsRepo for PostgresRepositories {
    async fn insert_asset(&self, asset: NewAsset) -> Result<AssetRecord, RepoError> {
        let sql = format!(
            "INSERT INTO {} (id, url, tags, title, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {COLUMNS}",
            asset.kind.table()
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(&asset.id)
            .bind(&asset.url)
            .bind(&asset.tags)
            .bind(&asset.title)
            .bind(asset.created_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into_record(asset.kind))
    }

    async fn find_asset(
        &self,
        kind: AssetKind,
        id: &str,
    ) -> Result<Option<AssetRecord>, RepoError> {
        let mut qb = select_from(kind);
        qb.push(" AND id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<AssetRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|row| row.into_record(kind)))
    }

    async fn list_assets(
        &self,
        kind: AssetKind,
        filter: &AssetFilter,
        page: PageSpec,
    ) -> Result<AssetSlice, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        // Items and total must come from the same snapshot.
        query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = select_from(kind);
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some((limit, offset)) = page.limit_offset() {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }

        let rows = qb
            .build_query_as::<AssetRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut count_qb =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1=1", kind.table()));
        Self::apply_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(AssetSlice {
            items: rows.into_iter().map(|row| row.into_record(kind)).collect(),
            total: Self::convert_count(total)?,
        })
    }

    async fn count_assets(&self, kind: AssetKind, filter: &AssetFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1=1", kind.table()));
        Self::apply_filter(&mut qb, filter);
        let total: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(total)
    }

    async fn soft_delete_asset(
        &self,
        kind: AssetKind,
        id: &str,
    ) -> Result<Option<AssetRecord>, RepoError> {
        let sql = format!(
            "UPDATE {} \
             SET deleted_at = COALESCE(deleted_at, now()), updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}",
            kind.table()
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|row| row.into_record(kind)))
    }

    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
