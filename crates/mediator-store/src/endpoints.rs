use mediator_cache::{key, namespace};
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Endpoint, RoutingKey};
use crate::Store;

fn row_to_endpoint(row: &sqlx::postgres::PgRow) -> Endpoint {
    Endpoint {
        uid: row.get("uid"),
        verkey: row.get("verkey"),
        agent_id: row.get("agent_id"),
        forward_stream_address: row.get("forward_stream_address"),
        fcm_device_id: row.get("fcm_device_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_routing_key(row: &sqlx::postgres::PgRow) -> RoutingKey {
    RoutingKey {
        id: row.get("id"),
        endpoint_uid: row.get("endpoint_uid"),
        key: row.get("key"),
        position: row.get("position"),
    }
}

impl Store {
    /// Upserts an endpoint by uid. Any other endpoint squatting on the same
    /// verkey is deleted first.
    pub async fn ensure_endpoint(
        &self,
        uid: &str,
        forward_stream_address: &str,
        agent_id: Option<Uuid>,
        verkey: Option<&str>,
        fcm_device_id: Option<&str>,
    ) -> Result<Endpoint, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(verkey) = verkey {
            sqlx::query("DELETE FROM endpoints WHERE verkey = $1 AND uid != $2")
                .bind(verkey)
                .bind(uid)
                .execute(&mut *tx)
                .await?;
        }

        let existing = sqlx::query("SELECT * FROM endpoints WHERE uid = $1")
            .bind(uid)
            .fetch_optional(&mut *tx)
            .await?;

        let previous_verkey = existing
            .as_ref()
            .and_then(|row| row_to_endpoint(row).verkey);

        let row = if let Some(existing) = existing {
            let current = row_to_endpoint(&existing);
            let next_verkey = verkey.map(str::to_owned).or(current.verkey.clone());
            let next_agent = agent_id.or(current.agent_id);
            let next_fcm = fcm_device_id
                .map(str::to_owned)
                .or(current.fcm_device_id.clone());
            sqlx::query(
                "UPDATE endpoints SET forward_stream_address = $2, agent_id = $3, verkey = $4, fcm_device_id = $5 WHERE uid = $1 RETURNING *",
            )
            .bind(uid)
            .bind(forward_stream_address)
            .bind(next_agent)
            .bind(&next_verkey)
            .bind(&next_fcm)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "INSERT INTO endpoints (uid, forward_stream_address, agent_id, verkey, fcm_device_id) VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(uid)
            .bind(forward_stream_address)
            .bind(agent_id)
            .bind(verkey)
            .bind(fcm_device_id)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        let endpoint = row_to_endpoint(&row);

        let inverse = endpoint
            .verkey
            .as_deref()
            .map(|vk| key(namespace::ENDPOINT_BY_VERKEY, vk))
            .unwrap_or_else(|| key(namespace::ENDPOINT_BY_VERKEY, "-"));
        self.cache
            .invalidate_pair(&key(namespace::ENDPOINT_BY_UID, &endpoint.uid), &inverse)
            .await;
        // A verkey rotation leaves the old verkey's cache entry stale
        // otherwise: it was never the key just invalidated above.
        if let Some(previous_verkey) = previous_verkey.filter(|vk| Some(vk) != endpoint.verkey.as_ref()) {
            self.cache
                .invalidate(&key(namespace::ENDPOINT_BY_VERKEY, &previous_verkey))
                .await;
        }

        Ok(endpoint)
    }

    pub async fn load_endpoint(&self, uid: &str) -> Result<Option<Endpoint>, StoreError> {
        let cache_key = key(namespace::ENDPOINT_BY_UID, uid);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(serde_json::from_value(cached).ok());
        }

        let row = sqlx::query("SELECT * FROM endpoints WHERE uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        let endpoint = row.as_ref().map(row_to_endpoint);
        if let Some(endpoint) = &endpoint {
            self.cache
                .set(&cache_key, serde_json::to_value(endpoint).unwrap())
                .await;
        }
        Ok(endpoint)
    }

    pub async fn load_endpoint_by_verkey(
        &self,
        verkey: &str,
    ) -> Result<Option<Endpoint>, StoreError> {
        let cache_key = key(namespace::ENDPOINT_BY_VERKEY, verkey);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(serde_json::from_value(cached).ok());
        }

        let row = sqlx::query("SELECT * FROM endpoints WHERE verkey = $1")
            .bind(verkey)
            .fetch_optional(&self.pool)
            .await?;

        let endpoint = row.as_ref().map(row_to_endpoint);
        if let Some(endpoint) = &endpoint {
            self.cache
                .set(&cache_key, serde_json::to_value(endpoint).unwrap())
                .await;
        }
        Ok(endpoint)
    }

    /// Resolves an endpoint via one of its routing keys, used by the
    /// Forward Router to find where an onion-wrapped message lands.
    pub async fn load_endpoint_by_routing_key(
        &self,
        routing_key: &str,
    ) -> Result<Option<Endpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT e.* FROM endpoints e
             JOIN routing_keys rk ON rk.endpoint_uid = e.uid
             WHERE rk.key = $1",
        )
        .bind(routing_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_endpoint))
    }

    pub async fn add_routing_key(
        &self,
        endpoint_uid: &str,
        routing_key: &str,
    ) -> Result<RoutingKey, StoreError> {
        let row = sqlx::query(
            "INSERT INTO routing_keys (endpoint_uid, key) VALUES ($1, $2)
             ON CONFLICT (endpoint_uid, key) DO UPDATE SET key = EXCLUDED.key
             RETURNING *",
        )
        .bind(endpoint_uid)
        .bind(routing_key)
        .fetch_one(&self.pool)
        .await?;
        self.cache
            .invalidate(&key(namespace::ROUTING_KEY, routing_key))
            .await;
        Ok(row_to_routing_key(&row))
    }

    pub async fn remove_routing_key(
        &self,
        endpoint_uid: &str,
        routing_key: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM routing_keys WHERE endpoint_uid = $1 AND key = $2")
            .bind(endpoint_uid)
            .bind(routing_key)
            .execute(&self.pool)
            .await?;
        self.cache
            .invalidate(&key(namespace::ROUTING_KEY, routing_key))
            .await;
        Ok(())
    }

    pub async fn list_routing_keys(
        &self,
        endpoint_uid: &str,
    ) -> Result<Vec<RoutingKey>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM routing_keys WHERE endpoint_uid = $1 ORDER BY position ASC",
        )
        .bind(endpoint_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_routing_key).collect())
    }

    /// Paginated listing for the admin RPC surface.
    pub async fn list_endpoints(&self, limit: i64, offset: i64) -> Result<Vec<Endpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM endpoints ORDER BY created_at ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_endpoint).collect())
    }
}
