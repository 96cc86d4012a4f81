#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("read timed out")]
    ReadTimeout,
    #[error("connection to stream backend failed: {0}")]
    ConnectionFailure(String),
    #[error("no configured shard is reachable")]
    NoReachableShard,
    #[error("malformed shard address: {0}")]
    BadAddress(String),
    #[error("payload was not valid JSON: {0}")]
    BadPayload(String),
}

impl From<redis::RedisError> for StreamError {
    fn from(err: redis::RedisError) -> Self {
        StreamError::ConnectionFailure(err.to_string())
    }
}
