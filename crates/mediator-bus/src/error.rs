#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid cast: recipient_vk/sender_vk given without protocols")]
    InvalidCast,
    #[error("no shard available for this topic")]
    NoShard,
    #[error("stream error: {0}")]
    Stream(#[from] mediator_stream::StreamError),
}
