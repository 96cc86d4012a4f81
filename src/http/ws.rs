//! WebSocket upgrade handlers (§4.8, §6): the full Session Controller, the
//! passive inbound-only mode, and the admin event relay.

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::authenticate_admin;
use crate::http::response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    endpoint: Option<String>,
    group_id: Option<String>,
}

/// `WS /ws` and `WS /ws?endpoint={uid}[&group_id=?]`.
pub async fn session_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match query.endpoint {
        Some(endpoint_uid) => ws.on_upgrade(move |socket| async move {
            crate::session::run_passive(socket, state, endpoint_uid, query.group_id).await;
        }),
        None => ws.on_upgrade(move |socket| async move {
            crate::session::run(socket, state).await;
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    stream: String,
}

/// `WS /ws/events?stream={addr}`: relays a named control-plane fanout
/// channel to the admin UI, verbatim. Gated behind admin credentials like
/// every other route under the admin RPC surface.
pub async fn events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(authorization) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return response::unauthorized("missing Authorization header");
    };
    if authenticate_admin(&state.store, authorization).await.is_none() {
        return response::unauthorized("invalid admin credentials");
    }

    ws.on_upgrade(move |socket| relay_events(socket, query.stream))
}

async fn relay_events(mut socket: axum::extract::ws::WebSocket, stream_addr: String) {
    use axum::extract::ws::Message;
    use mediator_stream::{FanoutChannel, ShardAddr};

    let Ok(addr) = ShardAddr::parse(&stream_addr) else {
        let _ = socket
            .send(Message::Text("{\"error\":\"bad stream address\"}".into()))
            .await;
        return;
    };
    let Ok(channel) = FanoutChannel::new(&addr) else {
        return;
    };
    let Ok(mut subscription) = channel.subscribe().await else {
        return;
    };

    loop {
        tokio::select! {
            frame = socket.recv() => {
                if frame.is_none() {
                    break;
                }
            }
            read = subscription.read(None) => {
                match read {
                    Ok((true, value)) => {
                        let Ok(text) = serde_json::to_string(&value) else { continue };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok((false, _)) | Err(_) => break,
                }
            }
        }
    }
}
