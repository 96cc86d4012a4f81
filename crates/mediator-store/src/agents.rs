use mediator_cache::{key, namespace};
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Agent;
use crate::Store;

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Agent {
    Agent {
        id: row.get("id"),
        did: row.get("did"),
        verkey: row.get("verkey"),
        metadata: row.get("metadata"),
        fcm_device_id: row.get("fcm_device_id"),
        created_at: row.get("created_at"),
    }
}

impl Store {
    /// Upserts an agent by DID. Any other agent squatting on the same
    /// verkey is deleted first, mirroring the single-owner-per-verkey
    /// invariant.
    pub async fn ensure_agent(
        &self,
        did: &str,
        verkey: &str,
        metadata: Option<serde_json::Value>,
        fcm_device_id: Option<&str>,
    ) -> Result<Agent, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM agents WHERE verkey = $1 AND did != $2")
            .bind(verkey)
            .bind(did)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query("SELECT * FROM agents WHERE did = $1")
            .bind(did)
            .fetch_optional(&mut *tx)
            .await?;

        let previous_verkey = existing.as_ref().map(|row| row_to_agent(row).verkey);

        let row = if let Some(existing) = existing {
            let current = row_to_agent(&existing);
            let next_metadata = metadata.unwrap_or(current.metadata.clone());
            let next_fcm = fcm_device_id
                .map(str::to_owned)
                .or(current.fcm_device_id.clone());
            sqlx::query(
                "UPDATE agents SET verkey = $2, metadata = $3, fcm_device_id = $4 WHERE did = $1 RETURNING *",
            )
            .bind(did)
            .bind(verkey)
            .bind(&next_metadata)
            .bind(&next_fcm)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "INSERT INTO agents (did, verkey, metadata, fcm_device_id) VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(did)
            .bind(verkey)
            .bind(metadata.unwrap_or(serde_json::json!({})))
            .bind(fcm_device_id)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        let agent = row_to_agent(&row);

        self.cache
            .invalidate_pair(
                &key(namespace::AGENT_BY_DID, &agent.did),
                &key(namespace::AGENT_BY_VERKEY, &agent.verkey),
            )
            .await;
        // A verkey rotation leaves the old verkey's cache entry stale
        // otherwise: it was never the key just invalidated above.
        if let Some(previous_verkey) = previous_verkey.filter(|vk| vk != &agent.verkey) {
            self.cache
                .invalidate(&key(namespace::AGENT_BY_VERKEY, &previous_verkey))
                .await;
        }

        Ok(agent)
    }

    pub async fn load_agent_by_did(&self, did: &str) -> Result<Option<Agent>, StoreError> {
        let cache_key = key(namespace::AGENT_BY_DID, did);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(serde_json::from_value(cached).ok());
        }

        let row = sqlx::query("SELECT * FROM agents WHERE did = $1")
            .bind(did)
            .fetch_optional(&self.pool)
            .await?;

        let agent = row.as_ref().map(row_to_agent);
        if let Some(agent) = &agent {
            self.cache
                .set(&cache_key, serde_json::to_value(agent).unwrap())
                .await;
        }
        Ok(agent)
    }

    pub async fn load_agent_by_verkey(&self, verkey: &str) -> Result<Option<Agent>, StoreError> {
        let cache_key = key(namespace::AGENT_BY_VERKEY, verkey);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(serde_json::from_value(cached).ok());
        }

        let row = sqlx::query("SELECT * FROM agents WHERE verkey = $1")
            .bind(verkey)
            .fetch_optional(&self.pool)
            .await?;

        let agent = row.as_ref().map(row_to_agent);
        if let Some(agent) = &agent {
            self.cache
                .set(&cache_key, serde_json::to_value(agent).unwrap())
                .await;
        }
        Ok(agent)
    }

    pub async fn agent_id_by_did(&self, did: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.load_agent_by_did(did).await?.map(|a| a.id))
    }

    /// Paginated listing for the admin RPC surface.
    pub async fn list_agents(&self, limit: i64, offset: i64) -> Result<Vec<Agent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at ASC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_agent).collect())
    }
}
