//! Consistent-hash ring (ketama-style) mapping a topic name to one of a
//! fixed set of shard addresses.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const VNODES_PER_SHARD: u32 = 160;

#[derive(Debug, Clone)]
pub struct HashRing {
    points: BTreeMap<u64, String>,
}

impl HashRing {
    pub fn new(shards: &[String]) -> Self {
        let mut points = BTreeMap::new();
        for shard in shards {
            for v in 0..VNODES_PER_SHARD {
                let key = format!("{shard}-{v}");
                points.insert(point_hash(&key), shard.clone());
            }
        }
        Self { points }
    }

    /// Returns the shard assigned to `topic`, or `None` if the ring is empty.
    pub fn get_node(&self, topic: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let h = point_hash(topic);
        self.points
            .range(h..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, shard)| shard.as_str())
    }
}

fn point_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_topic_always_maps_to_same_shard() {
        let shards = vec!["redis://a:6379".to_owned(), "redis://b:6379".to_owned()];
        let ring = HashRing::new(&shards);
        let first = ring.get_node("topic-1").unwrap().to_owned();
        for _ in 0..10 {
            assert_eq!(ring.get_node("topic-1").unwrap(), first);
        }
    }

    #[test]
    fn distributes_topics_across_all_shards() {
        let shards = vec![
            "redis://a:6379".to_owned(),
            "redis://b:6379".to_owned(),
            "redis://c:6379".to_owned(),
        ];
        let ring = HashRing::new(&shards);
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(ring.get_node(&format!("topic-{i}")).unwrap().to_owned());
        }
        assert_eq!(seen.len(), 3, "expected all three shards to be used: {seen:?}");
    }

    #[test]
    fn empty_ring_returns_none() {
        let ring = HashRing::new(&[]);
        assert_eq!(ring.get_node("anything"), None);
    }
}
