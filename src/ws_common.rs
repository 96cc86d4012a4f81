use axum::{
    extract::ws::{Message, WebSocket},
    http::HeaderMap,
};
use mediator_protocol::{problem_codes, BasicMessageProblemReport, WsMessage};
use std::time::Duration;

use crate::auth::extract_bearer;

pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .map(ToOwned::to_owned)
}

fn problem_report_json(code: &str, explain: &str) -> Option<String> {
    serde_json::to_string(&WsMessage::ProblemReport(BasicMessageProblemReport {
        code: code.to_owned(),
        explain: explain.to_owned(),
    }))
    .ok()
}

pub async fn send_problem_report(socket: &mut WebSocket, code: &str, explain: &str) {
    if let Some(json) = problem_report_json(code, explain) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
}

pub async fn send_unknown_message(socket: &mut WebSocket) {
    send_problem_report(socket, problem_codes::UNKNOWN_MESSAGE, "unrecognized message kind").await;
}

pub async fn send_message(socket: &mut WebSocket, message: &WsMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

fn parse_text_message(msg: Option<Result<Message, axum::Error>>) -> Result<String, ()> {
    match msg {
        Some(Ok(Message::Text(text))) => Ok(text.to_string()),
        _ => Err(()),
    }
}

pub async fn recv_text_with_timeout(
    socket: &mut WebSocket,
    timeout: Duration,
) -> Result<String, ()> {
    match tokio::time::timeout(timeout, socket.recv()).await {
        Ok(msg) => parse_text_message(msg),
        Err(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_from_headers_handles_missing_malformed_and_valid_bearer() {
        let missing = HeaderMap::new();
        assert_eq!(extract_token_from_headers(&missing), None);

        let mut malformed = HeaderMap::new();
        malformed.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(extract_token_from_headers(&malformed), None);

        let mut valid = HeaderMap::new();
        valid.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Bearer admin:hunter2"),
        );
        assert_eq!(
            extract_token_from_headers(&valid),
            Some("admin:hunter2".to_owned())
        );
    }

    #[test]
    fn problem_report_payload_serialization_matches_contract() {
        let text = problem_report_json(problem_codes::UNKNOWN_MESSAGE, "unrecognized message kind")
            .expect("problem report should serialize");
        let msg: WsMessage = serde_json::from_str(&text).expect("problem report should parse");
        assert_eq!(
            msg,
            WsMessage::ProblemReport(BasicMessageProblemReport {
                code: problem_codes::UNKNOWN_MESSAGE.to_owned(),
                explain: "unrecognized message kind".to_owned(),
            })
        );
    }

    #[test]
    fn parse_text_message_rejects_non_text_and_closed_frames() {
        assert_eq!(parse_text_message(None), Err(()));
        assert_eq!(
            parse_text_message(Some(Ok(Message::Ping(vec![1, 2].into())))),
            Err(())
        );
        let ok = parse_text_message(Some(Ok(Message::Text("{\"kind\":\"ping\"}".into()))))
            .expect("text frame should be returned");
        assert!(serde_json::from_str::<WsMessage>(&ok).is_ok());
    }
}
