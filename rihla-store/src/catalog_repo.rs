use async_trait::async_trait;
use rihla_core::{CatalogRepository, InventoryItem, ItemKind, StorageError};
use rihla_shared::{ItemId, ProviderId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::map_sqlx;

/// Listings stored as a JSONB document with the columns the queries filter on
/// (`kind`, `provider_id`, `active`) lifted out beside it.
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_item(
        &self,
        kind: ItemKind,
        id: ItemId,
    ) -> Result<Option<InventoryItem>, StorageError> {
        let row: Option<(Json<InventoryItem>,)> =
            sqlx::query_as("SELECT item FROM inventory_items WHERE id = $1 AND kind = $2")
                .bind(id)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(row.map(|(Json(item),)| item))
    }

    async fn get_item_by_id(&self, id: ItemId) -> Result<Option<InventoryItem>, StorageError> {
        let row: Option<(Json<InventoryItem>,)> =
            sqlx::query_as("SELECT item FROM inventory_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(row.map(|(Json(item),)| item))
    }

    async fn upsert_item(&self, item: &InventoryItem) -> Result<bool, StorageError> {
        // Kind and owner of an existing row are never rewritten
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_items (id, kind, provider_id, active, item, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE
            SET active = EXCLUDED.active,
                item = EXCLUDED.item,
                updated_at = NOW()
            WHERE inventory_items.provider_id = EXCLUDED.provider_id
              AND inventory_items.kind = EXCLUDED.kind
            "#,
        )
        .bind(item.id())
        .bind(item.kind().as_str())
        .bind(item.provider_id())
        .bind(item.listing().active)
        .bind(Json(item))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_active(
        &self,
        kind: ItemKind,
        id: ItemId,
        active: bool,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET active = $3,
                item = jsonb_set(item, '{active}', to_jsonb($3::boolean)),
                updated_at = NOW()
            WHERE id = $1 AND kind = $2
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_active(&self, provider_id: Option<ProviderId>) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM inventory_items WHERE active AND ($1::uuid IS NULL OR provider_id = $1)",
        )
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(count.max(0) as u64)
    }
}
