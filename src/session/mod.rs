//! Session Controller (§4.4): dispatches the tagged-union session protocol
//! over one WebSocket connection, multiplexing queue-mode forward-stream
//! delivery and protocol-bus events onto the same socket through a single
//! writer task.

mod bus_ops;
mod pickup_ops;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use mediator_bus::SubscriptionRegistry;
use mediator_protocol::{
    problem_codes, BasicMessageProblemReport, BusEvent, ConnectionResponse, Keylist, KeylistAction,
    KeylistEntry, KeylistUpdate, KeylistUpdateResponse, KeylistUpdateResult, MediateGrant, Ping,
    Pong, WsMessage,
};
use mediator_push::PushListener;
use mediator_stream::{HashRing, ShardAddr};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::state::AppState;

const QUEUE_TRANSPORT: &str = "didcomm:transport/queue";
const DEFAULT_GROUP: &str = "default";

/// What the writer task should put on the wire: a typed protocol message,
/// or an opaque payload (a forwarded/pushed envelope) written as-is.
pub(crate) enum Outbound {
    Typed(Box<WsMessage>),
    Raw(serde_json::Value),
}

/// Per-connection state. Lives only as long as the socket does, except for
/// the pickup mailbox (keyed by endpoint uid in [`AppState`]) which
/// outlives any one connection.
struct Session {
    state: AppState,
    endpoint_uid: Option<String>,
    their_did: Option<String>,
    their_verkey: Option<String>,
    pickup_mode: Arc<AtomicBool>,
    outbound_tx: mpsc::Sender<Outbound>,
    subscriptions: SubscriptionRegistry,
    bus_events_tx: mpsc::Sender<BusEvent>,
    forward_listener: Option<ForwardListenerHandle>,
}

struct ForwardListenerHandle {
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

fn endpoint_uid_for_did(did: &str) -> String {
    hex::encode(Sha256::digest(did.as_bytes()))
}

fn mediator_did(verkey: &str) -> String {
    format!("did:key:{verkey}")
}

fn problem_report(code: &str, explain: impl Into<String>) -> WsMessage {
    WsMessage::ProblemReport(BasicMessageProblemReport {
        code: code.to_owned(),
        explain: explain.into(),
    })
}

/// Runs the full Session Controller over an already-upgraded socket.
pub async fn run(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (bus_events_tx, mut bus_events_rx) = mpsc::channel(64);

    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    let mut session = Session {
        subscriptions: SubscriptionRegistry::new(state.bus.clone()),
        state,
        endpoint_uid: None,
        their_did: None,
        their_verkey: None,
        pickup_mode: Arc::new(AtomicBool::new(false)),
        outbound_tx,
        bus_events_tx,
        forward_listener: None,
    };

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(Message::Text(text))) = frame else {
                    break;
                };
                let reply = match serde_json::from_str::<WsMessage>(&text) {
                    Ok(message) => dispatch(&mut session, message).await,
                    Err(_) => Some(problem_report(
                        problem_codes::UNKNOWN_MESSAGE,
                        "could not parse message",
                    )),
                };
                if let Some(reply) = reply {
                    if session
                        .outbound_tx
                        .send(Outbound::Typed(Box::new(reply)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
            event = bus_events_rx.recv() => {
                let Some(event) = event else { continue };
                if !deliver_bus_event(&mut session, event).await {
                    break;
                }
            }
        }
    }

    shutdown(session).await;
    let _ = writer.await;
}

/// Routes one published bus event to its destination: the pickup mailbox
/// once the session has entered pickup mode (§4.4, §4.6), or straight to
/// the wire otherwise. Returns `false` if the socket write failed and the
/// session should close.
async fn deliver_bus_event(session: &mut Session, event: BusEvent) -> bool {
    if session.pickup_mode.load(Ordering::Relaxed) {
        if let Some(uid) = session.endpoint_uid.clone() {
            let queue = session.state.pickup_queue(&uid).await;
            let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            queue.put(payload, None).await;
            return true;
        }
    }

    let message = WsMessage::Bus(mediator_protocol::BusOperation::Event(event));
    session
        .outbound_tx
        .send(Outbound::Typed(Box::new(message)))
        .await
        .is_ok()
}

/// `WS /ws?endpoint={uid}[&group_id=?]`: a passive inbound-only session.
/// Same forward-stream consumer as the full controller, but the socket
/// never gets authenticated for a handshake — incoming frames are ignored,
/// the connection just relays queue-mode deliveries until it closes.
pub async fn run_passive(
    socket: WebSocket,
    state: AppState,
    endpoint_uid: String,
    group_id: Option<String>,
) {
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    let mut session = Session {
        subscriptions: SubscriptionRegistry::new(state.bus.clone()),
        state,
        endpoint_uid: Some(endpoint_uid.clone()),
        their_did: None,
        their_verkey: None,
        pickup_mode: Arc::new(AtomicBool::new(false)),
        outbound_tx,
        bus_events_tx: mpsc::channel(1).0,
        forward_listener: None,
    };

    start_forward_listener(&mut session, &endpoint_uid, group_id.as_deref()).await;

    while let Some(frame) = stream.next().await {
        if frame.is_err() {
            break;
        }
    }

    shutdown(session).await;
    let _ = writer.await;
}

async fn shutdown(session: Session) {
    if let Some(listener) = session.forward_listener {
        let _ = listener.shutdown.send(());
        let _ = listener.task.await;
    }
    session.subscriptions.unsubscribe_all().await;
}

async fn dispatch(session: &mut Session, message: WsMessage) -> Option<WsMessage> {
    match message {
        WsMessage::Ping(ping) => handle_ping(ping),
        WsMessage::Pong(_) => None,
        WsMessage::ConnectionRequest(req) => Some(handle_connection_request(session, req).await),
        WsMessage::ConnectionResponse(_) => None,
        WsMessage::MediateRequest(_) => Some(handle_mediate_request(session).await),
        WsMessage::MediateGrant(_) => None,
        WsMessage::KeylistUpdate(update) => Some(handle_keylist_update(session, update).await),
        WsMessage::KeylistUpdateResponse(_) => None,
        WsMessage::KeylistQuery(query) => Some(handle_keylist_query(session, query).await),
        WsMessage::Keylist(_) => None,
        WsMessage::Bus(op) => Some(WsMessage::Bus(bus_ops::handle(session, op).await)),
        WsMessage::Pickup(op) => Some(WsMessage::Pickup(pickup_ops::handle(session, op).await)),
        WsMessage::ProblemReport(report) => {
            tracing::debug!(code = %report.code, explain = %report.explain, "peer problem report");
            None
        }
    }
}

fn handle_ping(ping: Ping) -> Option<WsMessage> {
    if ping.response_requested {
        Some(WsMessage::Pong(Pong { ping_id: ping.id }))
    } else {
        None
    }
}

async fn handle_connection_request(
    session: &mut Session,
    req: mediator_protocol::ConnectionRequest,
) -> WsMessage {
    let uid = endpoint_uid_for_did(&req.did);

    let agent = match session
        .state
        .store
        .ensure_agent(&req.did, &req.verkey, None, req.fcm_device_id.as_deref())
        .await
    {
        Ok(agent) => agent,
        Err(err) => return problem_report(problem_codes::INVALID_REQUEST, err.to_string()),
    };

    let ring = HashRing::new(&session.state.shards);
    let Some(shard) = ring.get_node(&uid) else {
        return problem_report(problem_codes::INVALID_REQUEST, "no stream shard configured");
    };
    let forward_stream_address = match ShardAddr::parse(shard) {
        Ok(addr) => addr.with_channel(uid.clone()).full(),
        Err(err) => return problem_report(problem_codes::INVALID_REQUEST, err.to_string()),
    };

    let endpoint = match session
        .state
        .store
        .ensure_endpoint(
            &uid,
            &forward_stream_address,
            Some(agent.id),
            Some(&req.verkey),
            req.fcm_device_id.as_deref(),
        )
        .await
    {
        Ok(endpoint) => endpoint,
        Err(err) => return problem_report(problem_codes::INVALID_REQUEST, err.to_string()),
    };

    session.endpoint_uid = Some(uid.clone());
    session.their_did = Some(req.did.clone());
    session.their_verkey = Some(req.verkey.clone());

    if req.transports.iter().any(|t| t == QUEUE_TRANSPORT) {
        start_forward_listener(session, &endpoint.uid, None).await;
    }

    WsMessage::ConnectionResponse(ConnectionResponse {
        did: mediator_did(&session.state.keypair.verkey()),
        verkey: session.state.keypair.verkey(),
    })
}

async fn handle_mediate_request(session: &Session) -> WsMessage {
    let Some(uid) = &session.endpoint_uid else {
        return problem_report(problem_codes::INVALID_REQUEST, "no connection established yet");
    };

    let routing_keys = match session.state.store.list_routing_keys(uid).await {
        Ok(keys) => keys.into_iter().map(|rk| rk.key).collect::<Vec<_>>(),
        Err(err) => return problem_report(problem_codes::INVALID_REQUEST, err.to_string()),
    };

    if routing_keys.is_empty() {
        WsMessage::MediateGrant(MediateGrant {
            endpoint: format!("{}/e/{uid}", session.state.webroot),
            routing_keys: vec![],
        })
    } else {
        let mut keys = routing_keys;
        keys.push(session.state.keypair.verkey());
        WsMessage::MediateGrant(MediateGrant {
            endpoint: format!("{}/endpoint", session.state.webroot),
            routing_keys: keys,
        })
    }
}

async fn handle_keylist_update(session: &Session, update: KeylistUpdate) -> WsMessage {
    let Some(uid) = &session.endpoint_uid else {
        return problem_report(problem_codes::INVALID_REQUEST, "no connection established yet");
    };

    let mut updated = Vec::with_capacity(update.updates.len());
    for item in update.updates {
        let outcome = match item.action {
            KeylistAction::Add => session.state.store.add_routing_key(uid, &item.recipient_key).await.map(|_| ()),
            KeylistAction::Remove => session
                .state
                .store
                .remove_routing_key(uid, &item.recipient_key)
                .await,
        };
        updated.push(KeylistUpdateResult {
            recipient_key: item.recipient_key,
            action: item.action,
            result: if outcome.is_ok() { "success" } else { "client_error" }.to_owned(),
        });
    }
    WsMessage::KeylistUpdateResponse(KeylistUpdateResponse { updated })
}

async fn handle_keylist_query(
    session: &Session,
    query: mediator_protocol::KeylistQuery,
) -> WsMessage {
    let Some(uid) = &session.endpoint_uid else {
        return problem_report(problem_codes::INVALID_REQUEST, "no connection established yet");
    };

    let all = session.state.store.list_routing_keys(uid).await.unwrap_or_default();
    let offset = query.paginate.offset.unwrap_or(0);
    let limit = query.paginate.limit.unwrap_or(all.len());

    let page: Vec<KeylistEntry> = all
        .iter()
        .skip(offset)
        .take(limit)
        .map(|rk| KeylistEntry {
            recipient_key: rk.key.clone(),
        })
        .collect();

    let remaining = (all.len() as i64 - offset as i64 - page.len() as i64).max(0);
    WsMessage::Keylist(Keylist {
        count: page.len(),
        offset,
        remaining,
        keys: page,
    })
}

/// Starts the queue-mode forward-stream consumer: joins the group named
/// `{endpoint_uid}/{group_id or default}` and relays each claimed entry to
/// the wire (or the pickup mailbox, in pickup mode), acking the reverse
/// channel only once delivery succeeds.
async fn start_forward_listener(session: &mut Session, endpoint_uid: &str, group_id: Option<&str>) {
    if group_id == Some("off") {
        return;
    }

    let endpoint = match session.state.store.load_endpoint(endpoint_uid).await {
        Ok(Some(endpoint)) => endpoint,
        _ => return,
    };

    let (group, consumer_id) = match group_id {
        None => (DEFAULT_GROUP.to_owned(), endpoint_uid.to_owned()),
        Some(named) => (named.to_owned(), Uuid::new_v4().to_string()),
    };
    let group_name = format!("{endpoint_uid}/{group}");

    let listener = match PushListener::new(&endpoint.forward_stream_address, &group_name, &consumer_id) {
        Ok(listener) => Arc::new(listener),
        Err(err) => {
            tracing::warn!(%err, endpoint_uid, "failed to start forward-stream listener");
            return;
        }
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(run_forward_listener(
        listener,
        session.outbound_tx.clone(),
        session.state.clone(),
        endpoint_uid.to_owned(),
        session.pickup_mode.clone(),
        shutdown_rx,
    ));
    session.forward_listener = Some(ForwardListenerHandle {
        shutdown: shutdown_tx,
        task,
    });
}

/// Relays claimed forward-stream entries to the wire, or — once the session
/// has entered pickup mode — into the recipient's pickup mailbox instead
/// (§4.4, §4.6). `pickup_mode` is checked on every delivery rather than
/// once at listener start, since a recipient can switch into pickup mode
/// mid-connection, after this listener is already running.
async fn run_forward_listener(
    listener: Arc<PushListener>,
    outbound_tx: mpsc::Sender<Outbound>,
    state: AppState,
    endpoint_uid: String,
    pickup_mode: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            _ = &mut shutdown_rx => break,
            next = listener.next() => next,
        };
        let received = match next {
            Ok(Some(received)) => received,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(%err, "forward-stream listener read failed");
                break;
            }
        };

        let delivered = if pickup_mode.load(Ordering::Relaxed) {
            let queue = state.pickup_queue(&endpoint_uid).await;
            queue.put(received.message.clone(), None).await;
            true
        } else {
            outbound_tx
                .send(Outbound::Raw(received.message.clone()))
                .await
                .is_ok()
        };

        if delivered {
            if let Err(err) = listener.ack(&received).await {
                tracing::warn!(%err, "failed to ack delivered push");
            }
        }
    }
    let _ = listener.close().await;
}

async fn run_writer(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = rx.recv().await {
        let text = match frame {
            Outbound::Typed(message) => serde_json::to_string(&message),
            Outbound::Raw(value) => serde_json::to_string(&value),
        };
        let Ok(text) = text else { continue };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uid_is_deterministic_sha256_of_did() {
        let a = endpoint_uid_for_did("did:key:abc");
        let b = endpoint_uid_for_did("did:key:abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn mediator_did_wraps_verkey_as_did_key() {
        assert_eq!(mediator_did("VK1"), "did:key:VK1");
    }

    #[test]
    fn ping_without_response_requested_gets_no_reply() {
        let ping = Ping {
            id: "1".to_owned(),
            response_requested: false,
        };
        assert!(handle_ping(ping).is_none());
    }

    #[test]
    fn ping_with_response_requested_gets_a_matching_pong() {
        let ping = Ping {
            id: "ping-9".to_owned(),
            response_requested: true,
        };
        match handle_ping(ping) {
            Some(WsMessage::Pong(pong)) => assert_eq!(pong.ping_id, "ping-9"),
            other => panic!("expected pong, got {other:?}"),
        }
    }
}
