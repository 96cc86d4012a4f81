use std::collections::HashMap;

use tokio::sync::Mutex;

use mediator_stream::{FanoutChannel, GroupStream, ShardAddr};

use crate::error::PushError;
use crate::messages::{PushAck, PushRequest, ACK_MSG_TYPE, PUSH_MSG_TYPE};

/// A push request claimed off a forward stream's consumer group, carrying
/// everything needed to ack it back to the publisher.
pub struct ReceivedPush {
    id: String,
    reverse_channel: String,
    pub message: serde_json::Value,
    pub expire_at: f64,
}

impl ReceivedPush {
    async fn ack_over(&self, channel: &FanoutChannel) -> Result<bool, PushError> {
        let ack = PushAck {
            id: self.id.clone(),
            type_: ACK_MSG_TYPE.to_owned(),
            status: true,
        };
        let count = channel
            .write(&serde_json::to_value(&ack).expect("PushAck always serializes"))
            .await?;
        Ok(count > 0)
    }
}

/// Listens on one forward address's consumer group for push requests,
/// acking each entry off the group as it's claimed and caching reverse
/// fanout channels so replying doesn't reopen a pub/sub connection per ack.
pub struct PushListener {
    stream: GroupStream,
    reverse_channels: Mutex<HashMap<String, FanoutChannel>>,
}

impl PushListener {
    pub fn new(forward_address: &str, group_id: &str, consumer_id: &str) -> Result<Self, PushError> {
        let addr = ShardAddr::parse(forward_address)?;
        let stream = GroupStream::new(&addr, group_id, consumer_id)?;
        Ok(Self {
            stream,
            reverse_channels: Mutex::new(HashMap::new()),
        })
    }

    /// Blocks until the next push request arrives, or returns `None` if the
    /// stream has nothing of the expected shape (malformed payload, or a
    /// non-push entry sharing the stream).
    pub async fn next(&self) -> Result<Option<ReceivedPush>, PushError> {
        let mut entries = self.stream.read(1, None).await?;
        let Some(entry) = entries.pop() else {
            return Ok(None);
        };
        self.stream.ack(&entry.id).await?;

        let Ok(request) = serde_json::from_value::<PushRequest>(entry.value) else {
            return Ok(None);
        };
        if request.type_ != PUSH_MSG_TYPE {
            return Ok(None);
        }
        Ok(Some(ReceivedPush {
            id: request.id,
            reverse_channel: request.reverse_channel,
            message: request.message,
            expire_at: request.expire_at,
        }))
    }

    /// Publishes a positive ack for `received` back over its reverse
    /// channel, reusing a cached connection when one is open.
    pub async fn ack(&self, received: &ReceivedPush) -> Result<bool, PushError> {
        let mut cache = self.reverse_channels.lock().await;
        if let Some(channel) = cache.get(&received.reverse_channel) {
            return received.ack_over(channel).await;
        }
        let addr = ShardAddr::parse(&received.reverse_channel)?;
        let channel = FanoutChannel::new(&addr)?;
        let result = received.ack_over(&channel).await;
        cache.insert(received.reverse_channel.clone(), channel);
        result
    }

    /// Deregisters this listener's consumer from the group. Must run on
    /// session end or the group accumulates idle consumer metadata.
    pub async fn close(&self) -> Result<(), PushError> {
        Ok(self.stream.close().await?)
    }
}
