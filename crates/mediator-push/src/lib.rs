//! Push Engine: publish a request onto an endpoint's forward stream and
//! block on its reverse fanout channel for an ack, bootstrapping the
//! subscribe before the write to avoid a lost wakeup.

pub mod error;
pub mod messages;
mod pull;

pub use error::PushError;
pub use messages::{PushAck, PushRequest, ACK_MSG_TYPE, PUSH_MSG_TYPE};
pub use pull::{PushListener, ReceivedPush};

use std::time::Duration;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use mediator_stream::{choose_shard, FanoutChannel, GroupStream, ShardAddr, StreamError};

/// How the reverse (ack) channel's address is derived from the forward one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseChannelMode {
    /// Reverse channel is the same address as the forward one. The mode
    /// actually run in practice — no extra shard hop per push.
    SameAddress,
    /// Reverse channel lives on a freshly chosen shard, named by the
    /// SHA-256 hex digest of the forward address.
    NewShard,
}

pub struct PushEngine {
    mode: ReverseChannelMode,
    shards: Vec<String>,
}

impl PushEngine {
    pub fn new(mode: ReverseChannelMode, shards: Vec<String>) -> Self {
        Self { mode, shards }
    }

    /// Publishes `message` to `forward_address` and blocks for an ack up to
    /// `ttl`. `Ok(false)` means no ack arrived (timeout, close sentinel, or
    /// explicit negative status) — callers fall through to FCM. A
    /// `StreamError::ConnectionFailure` propagates so the caller can evict
    /// its cached shard and retry against a rotated one.
    pub async fn push(
        &self,
        forward_address: &str,
        message: serde_json::Value,
        ttl: Duration,
    ) -> Result<bool, PushError> {
        let forward_addr = ShardAddr::parse(forward_address)?;
        let reverse_addr = self.reverse_address(&forward_addr).await?;

        let reverse = FanoutChannel::new(&reverse_addr)?;
        // Bootstrap: subscribe before writing, or a fast reply is lost.
        let mut subscription = reverse.subscribe().await?;

        let request_id = Uuid::new_v4().to_string();
        let expire_at = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let request = PushRequest {
            id: request_id.clone(),
            type_: PUSH_MSG_TYPE.to_owned(),
            reverse_channel: reverse_addr.full(),
            expire_at: expire_at.timestamp() as f64,
            message,
        };

        let forward = GroupStream::new(&forward_addr, "push-engine", Uuid::new_v4().to_string())?;
        forward
            .write(&serde_json::to_value(&request).expect("PushRequest always serializes"))
            .await?;

        loop {
            let remaining = expire_at - chrono::Utc::now();
            let Ok(timeout) = remaining.to_std() else {
                return Ok(false);
            };
            match subscription.read(Some(timeout)).await {
                Ok((true, value)) => {
                    let Ok(ack) = serde_json::from_value::<PushAck>(value) else {
                        continue;
                    };
                    if ack.type_ == ACK_MSG_TYPE && ack.id == request_id {
                        return Ok(ack.status);
                    }
                    tracing::warn!(
                        expected = %request_id,
                        got = %ack.id,
                        "push ack id mismatch, still waiting"
                    );
                }
                Ok((false, _)) => return Ok(false),
                Err(StreamError::ReadTimeout) => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn reverse_address(&self, forward_addr: &ShardAddr) -> Result<ShardAddr, PushError> {
        match self.mode {
            ReverseChannelMode::SameAddress => Ok(forward_addr.clone()),
            ReverseChannelMode::NewShard => {
                let name = hex::encode(Sha256::digest(forward_addr.full().as_bytes()));
                let shard = choose_shard(&self.shards, None).await?;
                let addr = ShardAddr::parse(&shard)?;
                Ok(addr.with_channel(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_address_mode_reuses_the_forward_address() {
        let engine = PushEngine::new(ReverseChannelMode::SameAddress, vec![]);
        let forward = ShardAddr::parse("redis://shard-a:6379/endpoint-1").unwrap();
        let reverse = engine.reverse_address(&forward).await.unwrap();
        assert_eq!(reverse, forward);
    }

    #[tokio::test]
    async fn new_shard_mode_fails_without_any_configured_shards() {
        let engine = PushEngine::new(ReverseChannelMode::NewShard, vec![]);
        let forward = ShardAddr::parse("redis://shard-a:6379/endpoint-1").unwrap();
        assert!(engine.reverse_address(&forward).await.is_err());
    }
}
