//! Shard liveness probing and selection.

use crate::error::StreamError;
use rand::seq::SliceRandom;
use redis::AsyncCommands;

/// Pings `addr` and returns whether it answered within a short deadline.
pub async fn check_address(addr: &str) -> bool {
    let Ok(client) = redis::Client::open(addr) else {
        return false;
    };
    let Ok(mut con) = client.get_multiplexed_async_connection().await else {
        return false;
    };
    let pong: Result<String, _> = con.ping().await;
    pong.is_ok()
}

/// Probes every shard in random order, moving `excluding` to the back of
/// the probe list so it is only chosen if nothing else answers. Returns the
/// first reachable shard address.
pub async fn choose_shard(shards: &[String], excluding: Option<&str>) -> Result<String, StreamError> {
    if shards.is_empty() {
        return Err(StreamError::NoReachableShard);
    }
    let mut candidates: Vec<&String> = shards.iter().collect();
    candidates.shuffle(&mut rand::thread_rng());
    if let Some(unwanted) = excluding {
        if let Some(pos) = candidates.iter().position(|s| s.as_str() == unwanted) {
            let moved = candidates.remove(pos);
            candidates.push(moved);
        }
    }
    for candidate in candidates {
        if check_address(candidate).await {
            return Ok(candidate.clone());
        }
    }
    Err(StreamError::NoReachableShard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn choose_shard_fails_fast_with_no_shards_configured() {
        let err = choose_shard(&[], None).await.unwrap_err();
        assert!(matches!(err, StreamError::NoReachableShard));
    }

    #[tokio::test]
    async fn check_address_returns_false_for_unparseable_url() {
        assert!(!check_address("not-a-redis-url").await);
    }
}
