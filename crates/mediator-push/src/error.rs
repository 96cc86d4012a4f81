#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error(transparent)]
    Stream(#[from] mediator_stream::StreamError),
}
