use mediator_cache::{key, namespace};
use sqlx::Row;

use crate::error::StoreError;
use crate::Store;

const GLOBAL_SETTING_PK: i16 = 1;

impl Store {
    pub async fn get_setting(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let cache_key = key(namespace::GLOBAL_SETTING, name);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE global_settings IN SHARE MODE")
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("SELECT data FROM global_settings WHERE id = $1")
            .bind(GLOBAL_SETTING_PK)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let value = row
            .map(|r| r.get::<serde_json::Value, _>("data"))
            .and_then(|data| data.get(name).cloned());

        if let Some(value) = &value {
            self.cache.set(&cache_key, value.clone()).await;
        }
        Ok(value)
    }

    pub async fn set_setting(&self, name: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE global_settings IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let mut data = sqlx::query("SELECT data FROM global_settings WHERE id = $1")
            .bind(GLOBAL_SETTING_PK)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get::<serde_json::Value, _>("data"))
            .unwrap_or_else(|| serde_json::json!({}));

        data[name] = value.clone();

        sqlx::query(
            "INSERT INTO global_settings (id, data) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(GLOBAL_SETTING_PK)
        .bind(&data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.cache.set(&key(namespace::GLOBAL_SETTING, name), value).await;
        Ok(())
    }
}
