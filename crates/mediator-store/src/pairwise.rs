use sqlx::Row;

use crate::error::StoreError;
use crate::models::Pairwise;
use crate::Store;

fn row_to_pairwise(row: &sqlx::postgres::PgRow) -> Pairwise {
    Pairwise {
        id: row.get("id"),
        their_did: row.get("their_did"),
        their_verkey: row.get("their_verkey"),
        my_did: row.get("my_did"),
        my_verkey: row.get("my_verkey"),
        metadata: row.get("metadata"),
        their_label: row.get("their_label"),
        created_at: row.get("created_at"),
    }
}

impl Store {
    pub async fn ensure_pairwise(
        &self,
        their_did: &str,
        their_verkey: &str,
        my_did: &str,
        my_verkey: &str,
        their_label: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Pairwise, StoreError> {
        let row = sqlx::query(
            "INSERT INTO pairwises (their_did, their_verkey, my_did, my_verkey, their_label, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (their_did) DO UPDATE SET
                their_verkey = EXCLUDED.their_verkey,
                my_did = EXCLUDED.my_did,
                my_verkey = EXCLUDED.my_verkey,
                their_label = COALESCE(EXCLUDED.their_label, pairwises.their_label),
                metadata = EXCLUDED.metadata
             RETURNING *",
        )
        .bind(their_did)
        .bind(their_verkey)
        .bind(my_did)
        .bind(my_verkey)
        .bind(their_label)
        .bind(metadata.unwrap_or(serde_json::json!({})))
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_pairwise(&row))
    }

    pub async fn load_pairwise_by_did(&self, their_did: &str) -> Result<Option<Pairwise>, StoreError> {
        let row = sqlx::query("SELECT * FROM pairwises WHERE their_did = $1")
            .bind(their_did)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_pairwise))
    }
}
