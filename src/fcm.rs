//! FCM HTTP v1 fallback: invoked by the Push Engine's caller when no session
//! acks a push before its TTL. Configured optionally; absent configuration
//! means pushes to offline recipients simply return "gone".

use serde::Serialize;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/v1/projects";

#[derive(Debug, thiserror::Error)]
pub enum FcmError {
    #[error("fcm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("fcm rejected the push: {status}")]
    Rejected { status: u16 },
}

#[derive(Clone)]
pub struct FcmClient {
    api_key: String,
    sender_id: String,
}

#[derive(Serialize)]
struct FcmEnvelope<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    data: FcmData<'a>,
}

#[derive(Serialize)]
struct FcmData<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

impl FcmClient {
    pub fn new(api_key: String, sender_id: String) -> Self {
        Self { api_key, sender_id }
    }

    /// Sends a content-free "you have a message waiting" push to `device_id`.
    /// Returns `Ok(true)` on FCM acceptance, `Ok(false)` if FCM itself
    /// rejected the token (e.g. unregistered device) rather than a
    /// transport-level failure.
    pub async fn notify(&self, client: &reqwest::Client, device_id: &str) -> Result<bool, FcmError> {
        let url = format!("{FCM_SEND_URL}/{}/messages:send", self.sender_id);
        let body = FcmEnvelope {
            message: FcmMessage {
                token: device_id,
                data: FcmData { kind: "didcomm" },
            },
        };

        let response = client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(true)
        } else if response.status().as_u16() == 404 || response.status().as_u16() == 400 {
            Ok(false)
        } else {
            Err(FcmError::Rejected {
                status: response.status().as_u16(),
            })
        }
    }
}
