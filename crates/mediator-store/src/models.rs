use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub did: String,
    pub verkey: String,
    pub metadata: serde_json::Value,
    pub fcm_device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub uid: String,
    pub verkey: Option<String>,
    pub agent_id: Option<Uuid>,
    pub forward_stream_address: String,
    pub fcm_device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingKey {
    pub id: Uuid,
    pub endpoint_uid: String,
    pub key: String,
    pub position: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Pairwise {
    pub id: Uuid,
    pub their_did: String,
    pub their_verkey: String,
    pub my_did: String,
    pub my_verkey: String,
    pub metadata: serde_json::Value,
    pub their_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Backup {
    pub description: String,
    pub binary_blob: Vec<u8>,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
