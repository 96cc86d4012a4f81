//! Protocol Bus: topic-hashed pub/sub, binding ids computed from a `cast`
//! descriptor, one topic listener task per session per binding id.

pub mod binding;
pub mod error;
pub mod subscription;
pub mod topic;

pub use binding::compute_binding_id;
pub use error::BusError;
pub use subscription::SubscriptionRegistry;
pub use topic::{build_topic, parse_topic};

use mediator_stream::{FanoutChannel, HashRing, ShardAddr};

#[derive(Clone)]
pub struct Bus {
    ring: HashRing,
}

impl Bus {
    pub fn new(shards: Vec<String>) -> Self {
        Self {
            ring: HashRing::new(&shards),
        }
    }

    /// Resolves the shard address carrying `topic`, ketama-routed.
    pub fn topic_address(&self, topic: &str) -> Result<ShardAddr, BusError> {
        let shard = self.ring.get_node(topic).ok_or(BusError::NoShard)?;
        let addr = ShardAddr::parse(shard)?;
        Ok(addr.with_channel(topic))
    }

    /// Publishes an already-base64-encoded payload to every topic in
    /// `topics`, returning the total number of subscribers reached.
    pub async fn publish(&self, topics: &[String], payload_b64: &str) -> Result<usize, BusError> {
        let mut total = 0;
        for topic in topics {
            let addr = self.topic_address(topic)?;
            let channel = FanoutChannel::new(&addr)?;
            total += channel
                .write(&serde_json::json!({ "payload": payload_b64 }))
                .await?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_address_carries_the_topic_as_channel() {
        let bus = Bus::new(vec!["redis://a:6379".to_owned()]);
        let addr = bus.topic_address("did:peer:abc/binding-1").unwrap();
        assert_eq!(addr.channel.as_deref(), Some("did:peer:abc/binding-1"));
    }

    #[test]
    fn empty_ring_has_no_topic_address() {
        let bus = Bus::new(vec![]);
        assert!(matches!(
            bus.topic_address("anything"),
            Err(BusError::NoShard)
        ));
    }
}
