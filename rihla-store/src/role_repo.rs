use async_trait::async_trait;
use rihla_core::{Role, RoleDirectory, RoleGrant, StorageError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::map_sqlx;

/// `get_user_role` backed by the `user_roles` table.
pub struct PgRoleDirectory {
    pool: PgPool,
}

impl PgRoleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleDirectory for PgRoleDirectory {
    async fn get_user_role(&self, user_id: &str) -> Result<Option<RoleGrant>, StorageError> {
        let row: Option<(String, Option<Uuid>)> =
            sqlx::query_as("SELECT role, provider_id FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        let Some((role, provider_id)) = row else {
            return Ok(None);
        };

        // An unreadable role must not fall through to any access.
        let role: Role = role.parse().map_err(|e: String| {
            StorageError::Persistence(format!("user {} has {}", user_id, e))
        })?;

        Ok(Some(RoleGrant { role, provider_id }))
    }
}
