use sqlx::Row;

use crate::error::StoreError;
use crate::Store;

pub struct KvEntry {
    pub content_type: String,
    pub value: Vec<u8>,
}

impl Store {
    pub async fn kv_put(
        &self,
        namespace: &str,
        key: &str,
        content_type: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_entries (namespace, key, content_type, value, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (namespace, key)
             DO UPDATE SET content_type = EXCLUDED.content_type, value = EXCLUDED.value, updated_at = now()",
        )
        .bind(namespace)
        .bind(key)
        .bind(content_type)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn kv_get(&self, namespace: &str, key: &str) -> Result<Option<KvEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT content_type, value FROM kv_entries WHERE namespace = $1 AND key = $2",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| KvEntry {
            content_type: r.get("content_type"),
            value: r.get("value"),
        }))
    }

    pub async fn kv_delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND key = $2")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
