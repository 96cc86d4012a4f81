use sqlx::Row;

use crate::error::StoreError;
use crate::models::Backup;
use crate::Store;

fn row_to_backup(row: &sqlx::postgres::PgRow) -> Backup {
    Backup {
        description: row.get("description"),
        binary_blob: row.get("binary_blob"),
        context: row.get("context"),
        created_at: row.get("created_at"),
    }
}

impl Store {
    pub async fn create_backup(
        &self,
        description: &str,
        binary_blob: &[u8],
        context: Option<serde_json::Value>,
    ) -> Result<Backup, StoreError> {
        let row = sqlx::query(
            "INSERT INTO backups (description, binary_blob, context) VALUES ($1, $2, $3)
             ON CONFLICT (description) DO UPDATE SET binary_blob = EXCLUDED.binary_blob, context = EXCLUDED.context
             RETURNING *",
        )
        .bind(description)
        .bind(binary_blob)
        .bind(context)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_backup(&row))
    }

    pub async fn load_backup(&self, description: &str) -> Result<Option<Backup>, StoreError> {
        let row = sqlx::query("SELECT * FROM backups WHERE description = $1")
            .bind(description)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_backup))
    }

    pub async fn list_backups(&self) -> Result<Vec<Backup>, StoreError> {
        let rows = sqlx::query("SELECT * FROM backups ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_backup).collect())
    }
}
