//! Ingress HTTP Surface (§4.8): the public envelope-delivery endpoints.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::forward::{push_with_failover, route, ForwardError};
use crate::http::response::{self, HttpResponse};
use crate::state::AppState;

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/ssi-agent-wire",
    "application/json",
    "application/didcomm-envelope-enc",
    "application/didcomm-encrypted+json",
];

fn content_type_allowed(headers: &HeaderMap) -> bool {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .is_some_and(|essence| ALLOWED_CONTENT_TYPES.contains(&essence))
}

/// `POST /e/{uid}`: the endpoint's own delivery address.
pub async fn deliver(
    State(state): State<AppState>,
    axum::extract::Path(uid): axum::extract::Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    if !content_type_allowed(&headers) {
        return response::unsupported_media_type("unsupported content type");
    }

    let Ok(envelope) = serde_json::from_slice::<mediator_protocol::Envelope>(&body) else {
        return response::bad_request("body is not a valid envelope");
    };

    let Ok(Some(endpoint)) = state.store.load_endpoint(&uid).await else {
        return response::not_found("unknown endpoint");
    };

    let payload = serde_json::to_value(&envelope).expect("Envelope always serializes");
    match push_with_failover(&state, &endpoint, payload).await {
        Ok(true) => StatusCode::ACCEPTED.into_response(),
        Ok(false) => match (&state.fcm, &endpoint.fcm_device_id) {
            (Some(fcm), Some(device_id)) => match fcm.notify(&state.http, device_id).await {
                Ok(true) => StatusCode::ACCEPTED.into_response(),
                Ok(false) => response::gone("recipient has no active transport"),
                Err(err) => response::internal_error(err),
            },
            (None, Some(_)) => response::misdirected("recipient needs FCM but none is configured"),
            _ => response::gone("recipient has no active transport"),
        },
        Err(err) => response::internal_error(err),
    }
}

/// `POST /endpoint`: the forward router's public address.
pub async fn forward_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    if !content_type_allowed(&headers) {
        return response::unsupported_media_type("unsupported content type");
    }

    let Ok(envelope) = serde_json::from_slice::<mediator_protocol::Envelope>(&body) else {
        return response::bad_request("body is not a valid envelope");
    };

    match route(&state, &envelope).await {
        Ok(true) => StatusCode::ACCEPTED.into_response(),
        Ok(false) => response::gone("recipient has no active transport"),
        Err(ForwardError::NoMatch) => response::bad_request("no recipient resolves to a registered endpoint"),
        Err(err) => response::internal_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PollingQuery {
    endpoint: String,
    group_id: Option<String>,
}

/// `GET /polling?endpoint={uid}&group_id=?`: long-poll delivery as one SSE
/// event per acked message. An unknown endpoint yields a single
/// problem-report line rather than an error status, matching the wire
/// contract of every other delivery surface.
pub async fn polling(
    State(state): State<AppState>,
    Query(query): Query<PollingQuery>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        let endpoint = match state.store.load_endpoint(&query.endpoint).await {
            Ok(Some(endpoint)) => endpoint,
            _ => {
                let report = serde_json::json!({
                    "code": mediator_protocol::problem_codes::INVALID_REQUEST,
                    "explain": "unknown endpoint",
                });
                let _ = tx
                    .send(Event::default().event("problem_report").data(report.to_string()))
                    .await;
                return;
            }
        };

        let group_id = query.group_id.as_deref();
        if group_id == Some("off") {
            return;
        }
        let (group, consumer_id) = match group_id {
            None => ("default".to_owned(), query.endpoint.clone()),
            Some(named) => (named.to_owned(), uuid::Uuid::new_v4().to_string()),
        };
        let group_name = format!("{}/{group}", query.endpoint);

        let Ok(listener) = mediator_push::PushListener::new(
            &endpoint.forward_stream_address,
            &group_name,
            &consumer_id,
        ) else {
            return;
        };

        loop {
            match listener.next().await {
                Ok(Some(received)) => {
                    if listener.ack(&received).await.is_ok() {
                        let event = Event::default().event("message").data(received.message.to_string());
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => continue,
                Err(_) => break,
            }
        }
        let _ = listener.close().await;
    });

    let stream = ReceiverStream::new(rx).map(Ok);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}

#[derive(Debug, serde::Serialize)]
struct Invitation {
    #[serde(rename = "@type")]
    type_: &'static str,
    #[serde(rename = "@id")]
    id: String,
    label: &'static str,
    #[serde(rename = "recipientKeys")]
    recipient_keys: Vec<String>,
    #[serde(rename = "serviceEndpoint")]
    service_endpoint: String,
    #[serde(rename = "routingKeys")]
    routing_keys: Vec<String>,
}

/// `GET /invitation`.
pub async fn invitation(State(state): State<AppState>) -> HttpResponse {
    let invitation = Invitation {
        type_: "https://didcomm.org/connections/1.0/invitation",
        id: uuid::Uuid::new_v4().to_string(),
        label: "didcomm-mediator",
        recipient_keys: vec![state.keypair.verkey()],
        service_endpoint: format!("{}/ws", state.webroot).replacen("http", "ws", 1),
        routing_keys: vec![],
    };
    axum::Json(invitation).into_response()
}

/// `GET /maintenance/health_check`: liveness of the process only.
pub async fn health_check() -> HttpResponse {
    StatusCode::OK.into_response()
}

/// `GET /maintenance/liveness_check`: liveness of dependencies.
pub async fn liveness_check(State(state): State<AppState>) -> HttpResponse {
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .is_ok();

    let cache_key = "liveness-probe";
    state
        .store
        .cache()
        .set(cache_key, serde_json::json!(true))
        .await;
    let cache_ok = state.store.cache().get(cache_key).await.is_some();

    let mut shards = serde_json::Map::new();
    let mut all_shards_ok = true;
    for shard in &state.shards {
        let ok = mediator_stream::check_address(shard).await;
        all_shards_ok &= ok;
        shards.insert(shard.clone(), serde_json::json!(ok));
    }

    let body = serde_json::json!({
        "database": db_ok,
        "cache": cache_ok,
        "shards": shards,
    });

    let status = if db_ok && cache_ok && all_shards_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_allowed_accepts_whitelisted_essences_ignoring_params() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            axum::http::HeaderValue::from_static("application/didcomm-envelope-enc; charset=utf-8"),
        );
        assert!(content_type_allowed(&headers));
    }

    #[test]
    fn content_type_allowed_rejects_unknown_types() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", axum::http::HeaderValue::from_static("text/plain"));
        assert!(!content_type_allowed(&headers));
    }

    #[test]
    fn content_type_allowed_rejects_missing_header() {
        assert!(!content_type_allowed(&HeaderMap::new()));
    }
}
