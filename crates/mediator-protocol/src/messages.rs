//! Session-protocol message types, dispatched by the Session Controller.
//!
//! Re-modeled from the source's dynamic dispatch-by-dictionary-shape into a
//! single tagged union keyed on `kind`, per the re-architecture notes —
//! with sub-unions for Bus and Pickup operations kept as their own enums
//! since each rides in its own subsystem.

use serde::{Deserialize, Serialize};

/// Frozen problem-report codes used across the session protocol.
pub mod problem_codes {
    pub const UNKNOWN_MESSAGE: &str = "unknown_message";
    pub const INVALID_CAST: &str = "invalid_cast";
    pub const EMPTY_PAYLOAD: &str = "empty_payload";
    pub const TIMEOUT_OCCURRED: &str = "timeout_occurred";
    pub const EMPTY_QUEUE: &str = "empty_queue";
    pub const INVALID_REQUEST: &str = "invalid_request";
}

/// `~thread` decoration: copied from request to response when the request
/// set `return_route = thread`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadDecorator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub id: String,
    #[serde(default)]
    pub response_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub ping_id: String,
}

/// Inviter-side handshake: the peer's DID, verkey, and the transports it
/// advertises (checked for `didcomm:transport/queue` to decide whether to
/// start a forward-stream consumer for this session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub did: String,
    pub verkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_device_id: Option<String>,
    #[serde(default)]
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub did: String,
    pub verkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediateRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediateGrant {
    pub endpoint: String,
    pub routing_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeylistAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylistUpdateItem {
    pub recipient_key: String,
    pub action: KeylistAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylistUpdate {
    pub updates: Vec<KeylistUpdateItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylistUpdateResult {
    pub recipient_key: String,
    pub action: KeylistAction,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylistUpdateResponse {
    pub updated: Vec<KeylistUpdateResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Paginate {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeylistQuery {
    #[serde(default)]
    pub paginate: Paginate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylistEntry {
    pub recipient_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keylist {
    pub keys: Vec<KeylistEntry>,
    pub count: usize,
    pub offset: usize,
    pub remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicMessageProblemReport {
    pub code: String,
    pub explain: String,
}

// ---------------------------------------------------------------------------
// Protocol Bus (§4.6)
// ---------------------------------------------------------------------------

/// A `cast` descriptor: participants who compute the same one from the
/// same inputs land on the same binding id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CastDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_vk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_vk: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSubscribe {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<CastDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusBindResponse {
    pub binding_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusUnsubscribe {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub need_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusPublish {
    pub binding_id: Vec<String>,
    /// Base64-encoded opaque payload bytes.
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusPublishResponse {
    pub recipients_num: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Base64-encoded opaque payload bytes.
    pub payload: String,
    pub binding_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
}

/// The three Bus operations a session issues, plus the three a session
/// receives back. Kept as one enum per the re-architecture note's
/// `BusOperation` tagged union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BusOperation {
    Subscribe(BusSubscribe),
    Unsubscribe(BusUnsubscribe),
    Publish(BusPublish),
    BindResponse(BusBindResponse),
    Event(BusEvent),
    PublishResponse(BusPublishResponse),
    ProblemReport(BasicMessageProblemReport),
}

// ---------------------------------------------------------------------------
// Pickup (§4.5)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupStatusRequest {
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupStatusResponse {
    pub message_count: usize,
    pub last_added_time: Option<String>,
    pub duration_limit: u64,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupBatchRequest {
    pub batch_size: usize,
    pub delay_timeout: Option<u64>,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupMessage {
    pub id: String,
    pub message: serde_json::Value,
    pub added_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupBatchResponse {
    pub messages: Vec<PickupMessage>,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupListRequest {
    pub message_ids: Vec<String>,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupListResponse {
    pub messages: Vec<PickupMessage>,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PickupNoop {
    pub delay_timeout: Option<u64>,
    #[serde(default)]
    pub thread: ThreadDecorator,
}

/// All inbound/outbound Pickup shapes, per the re-architecture note's
/// tagged-union treatment of the source's dict-shaped dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PickupOperation {
    StatusRequest(PickupStatusRequest),
    StatusResponse(PickupStatusResponse),
    BatchRequest(PickupBatchRequest),
    BatchResponse(PickupBatchResponse),
    ListRequest(PickupListRequest),
    ListResponse(PickupListResponse),
    Noop(PickupNoop),
    ProblemReport(BasicMessageProblemReport),
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// Every message kind the Session Controller dispatches on, tagged by
/// `kind`.
///
/// ```json
/// { "kind": "ping", "id": "...", "response_requested": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    Ping(Ping),
    Pong(Pong),
    ConnectionRequest(ConnectionRequest),
    ConnectionResponse(ConnectionResponse),
    MediateRequest(MediateRequest),
    MediateGrant(MediateGrant),
    KeylistUpdate(KeylistUpdate),
    KeylistUpdateResponse(KeylistUpdateResponse),
    KeylistQuery(KeylistQuery),
    Keylist(Keylist),
    Bus(BusOperation),
    Pickup(PickupOperation),
    ProblemReport(BasicMessageProblemReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips_through_ws_message() {
        let msg = WsMessage::Ping(Ping {
            id: "1".to_owned(),
            response_requested: true,
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"kind\":\"ping\""));
        let parsed: WsMessage = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn bus_publish_nests_under_bus_kind_and_op_tag() {
        let msg = WsMessage::Bus(BusOperation::Publish(BusPublish {
            binding_id: vec!["b1".to_owned()],
            payload: "aGVsbG8=".to_owned(),
        }));
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"kind\":\"bus\""));
        assert!(json.contains("\"op\":\"publish\""));
        let parsed: WsMessage = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn pickup_batch_request_round_trips_with_thread_decoration() {
        let msg = WsMessage::Pickup(PickupOperation::BatchRequest(PickupBatchRequest {
            batch_size: 2,
            delay_timeout: Some(5),
            thread: ThreadDecorator {
                thid: Some("thread-1".to_owned()),
            },
        }));
        let json = serde_json::to_string(&msg).expect("serialize");
        let parsed: WsMessage = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn connection_request_defaults_transports_when_absent() {
        let json = r#"{"kind":"connection_request","did":"did:key:abc","verkey":"VK"}"#;
        let parsed: WsMessage = serde_json::from_str(json).expect("parse");
        assert_eq!(
            parsed,
            WsMessage::ConnectionRequest(ConnectionRequest {
                did: "did:key:abc".to_owned(),
                verkey: "VK".to_owned(),
                label: None,
                fcm_device_id: None,
                transports: vec![],
            })
        );
    }

    #[test]
    fn keylist_query_defaults_paginate_when_absent() {
        let json = r#"{"kind":"keylist_query"}"#;
        let parsed: WsMessage = serde_json::from_str(json).expect("parse");
        assert_eq!(
            parsed,
            WsMessage::KeylistQuery(KeylistQuery {
                paginate: Paginate::default()
            })
        );
    }
}
