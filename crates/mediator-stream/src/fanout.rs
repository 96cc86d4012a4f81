//! `FanoutChannel`: one message, delivered once to every live subscriber.

use crate::address::ShardAddr;
use crate::error::StreamError;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEnvelope {
    Data { value: serde_json::Value },
    Close,
}

pub struct FanoutChannel {
    client: redis::Client,
    channel: String,
}

/// A live subscription to a `FanoutChannel`. Dropping it closes the
/// underlying pub/sub connection.
pub struct FanoutSubscription {
    pubsub: redis::aio::PubSub,
}

impl FanoutChannel {
    pub fn new(addr: &ShardAddr) -> Result<Self, StreamError> {
        let channel = addr
            .channel
            .clone()
            .ok_or_else(|| StreamError::BadAddress("FanoutChannel requires a channel".into()))?;
        let client = redis::Client::open(addr.shard_url())?;
        Ok(Self { client, channel })
    }

    /// Subscribes to the channel. Callers must subscribe *before* writing
    /// any request that expects a reply on this channel — otherwise an
    /// immediate reply can be published and lost.
    pub async fn subscribe(&self) -> Result<FanoutSubscription, StreamError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        Ok(FanoutSubscription { pubsub })
    }

    /// Publishes `value` and returns how many subscribers received it.
    pub async fn write(&self, value: &serde_json::Value) -> Result<usize, StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&WireEnvelope::Data {
            value: value.clone(),
        })
        .map_err(|e| StreamError::BadPayload(e.to_string()))?;
        let count: usize = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut con)
            .await?;
        Ok(count)
    }

    /// Broadcasts a close sentinel; every subscriber's next `read` returns
    /// `Ok((false, Value::Null))`.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&WireEnvelope::Close)
            .expect("WireEnvelope::Close always serializes");
        let _: usize = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}

impl FanoutSubscription {
    /// Waits for the next message. `None` timeout blocks until a message
    /// arrives or the connection drops; `ok = false` means a close sentinel
    /// was received.
    pub async fn read(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(bool, serde_json::Value), StreamError> {
        let mut stream = self.pubsub.on_message();
        let msg = match timeout {
            Some(d) => tokio::time::timeout(d, stream.next())
                .await
                .map_err(|_| StreamError::ReadTimeout)?,
            None => stream.next().await,
        };
        let msg = msg.ok_or_else(|| {
            StreamError::ConnectionFailure("pub/sub connection closed".into())
        })?;
        let payload: String = msg
            .get_payload()
            .map_err(|e| StreamError::BadPayload(e.to_string()))?;
        match serde_json::from_str::<WireEnvelope>(&payload)
            .map_err(|e| StreamError::BadPayload(e.to_string()))?
        {
            WireEnvelope::Data { value } => Ok((true, value)),
            WireEnvelope::Close => Ok((false, serde_json::Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_requires_a_channel_on_the_address() {
        let addr = ShardAddr::parse("redis://shard-a:6379").unwrap();
        assert!(FanoutChannel::new(&addr).is_err());
    }

    #[test]
    fn wire_envelope_round_trips_data_and_close() {
        let data = WireEnvelope::Data {
            value: serde_json::json!({"k": "v"}),
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(matches!(
            serde_json::from_str::<WireEnvelope>(&json).unwrap(),
            WireEnvelope::Data { .. }
        ));

        let close_json = serde_json::to_string(&WireEnvelope::Close).unwrap();
        assert!(matches!(
            serde_json::from_str::<WireEnvelope>(&close_json).unwrap(),
            WireEnvelope::Close
        ));
    }
}
