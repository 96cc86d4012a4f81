//! `GroupStream`: an append-only stream with consumer-group semantics — a
//! given entry is delivered to at most one member of a named group.

use crate::address::ShardAddr;
use crate::error::StreamError;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;

pub struct GroupStream {
    client: redis::Client,
    stream: String,
    group_id: String,
    consumer_id: String,
}

/// One delivered entry, pending acknowledgement.
pub struct ClaimedEntry {
    pub id: String,
    pub value: serde_json::Value,
}

impl GroupStream {
    pub fn new(
        addr: &ShardAddr,
        group_id: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Result<Self, StreamError> {
        let stream = addr
            .channel
            .clone()
            .ok_or_else(|| StreamError::BadAddress("GroupStream requires a channel".into()))?;
        let client = redis::Client::open(addr.shard_url())?;
        Ok(Self {
            client,
            stream,
            group_id: group_id.into(),
            consumer_id: consumer_id.into(),
        })
    }

    async fn ensure_group_exists(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), StreamError> {
        let result: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group_id)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(con)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(StreamError::from(e)),
        }
    }

    /// Appends `value` to the stream.
    pub async fn write(&self, value: &serde_json::Value) -> Result<String, StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(value)
            .map_err(|e| StreamError::BadPayload(e.to_string()))?;
        let id: String = con.xadd(&self.stream, "*", &[("value", payload)]).await?;
        Ok(id)
    }

    /// Claims up to `count` pending entries for this consumer, blocking for
    /// `timeout` (or indefinitely when `None`) if none are immediately
    /// available. Creates the group lazily on first use.
    pub async fn read(
        &self,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<ClaimedEntry>, StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        self.ensure_group_exists(&mut con).await?;

        let block_ms = timeout.map_or(0, |d| d.as_millis().max(1) as usize);
        let opts = StreamReadOptions::default()
            .group(&self.group_id, &self.consumer_id)
            .count(count)
            .block(block_ms);

        // A `BLOCK`ed read that times out server-side comes back as an empty
        // reply, not an error — distinguished below from a `None` timeout
        // (block forever).
        let reply: StreamReadReply = con.xread_options(&[&self.stream], &[">"], &opts).await?;

        let mut entries = Vec::new();
        for stream_key in reply.keys {
            for id in stream_key.ids {
                let raw = id
                    .map
                    .get("value")
                    .and_then(|v| match v {
                        redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
                        redis::Value::SimpleString(s) => Some(s.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| StreamError::BadPayload(e.to_string()))?;
                entries.push(ClaimedEntry { id: id.id, value });
            }
        }
        if entries.is_empty() && timeout.is_some() {
            return Err(StreamError::ReadTimeout);
        }
        Ok(entries)
    }

    pub async fn ack(&self, id: &str) -> Result<(), StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: usize = con.xack(&self.stream, &self.group_id, &[id]).await?;
        Ok(())
    }

    /// Deregisters this consumer from the group. Must run on session
    /// termination even under cancellation, or the group accumulates idle
    /// consumer metadata.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: usize = redis::cmd("XGROUP")
            .arg("DELCONSUMER")
            .arg(&self.stream)
            .arg(&self.group_id)
            .arg(&self.consumer_id)
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_stream_requires_a_channel_on_the_address() {
        let addr = ShardAddr::parse("redis://shard-a:6379").unwrap();
        assert!(GroupStream::new(&addr, "g", "c1").is_err());
    }
}
