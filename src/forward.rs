//! Forward Router (§4.7): unwraps one onion layer when the mediator is the
//! outer recipient, or falls through to routing-key resolution when it
//! isn't, then re-injects the result into the Push Engine.

use mediator_protocol::{forward::unwrap_forward, recipient_kids, Envelope, EnvelopeError};
use mediator_push::PushError;
use mediator_store::{Endpoint, StoreError};
use mediator_stream::{choose_shard, ShardAddr, StreamError};

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no recipient key resolves to a registered endpoint")]
    NoMatch,
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Push(#[from] PushError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Pushes to `endpoint`'s current forward-stream shard. On a
/// `ConnectionFailure` (the shard is down), rotates to a reachable shard
/// via `choose_shard(excluding=old)`, rewrites the endpoint's stored
/// address to the new shard, and retries once (§4.3 step 6).
pub async fn push_with_failover(
    state: &AppState,
    endpoint: &Endpoint,
    payload: serde_json::Value,
) -> Result<bool, ForwardError> {
    match state
        .push
        .push(
            &endpoint.forward_stream_address,
            payload.clone(),
            AppState::push_ttl_default(),
        )
        .await
    {
        Ok(acked) => Ok(acked),
        Err(PushError::Stream(StreamError::ConnectionFailure(_))) => {
            let old_addr = ShardAddr::parse(&endpoint.forward_stream_address).ok();
            let excluded = old_addr.as_ref().map(ShardAddr::shard_url);
            let new_shard = choose_shard(&state.shards, excluded.as_deref()).await?;
            let channel = old_addr
                .and_then(|addr| addr.channel)
                .unwrap_or_else(|| endpoint.uid.clone());
            let new_address = ShardAddr::parse(&new_shard)?.with_channel(channel).full();

            state
                .store
                .ensure_endpoint(&endpoint.uid, &new_address, None, None, None)
                .await?;

            Ok(state
                .push
                .push(&new_address, payload, AppState::push_ttl_default())
                .await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Routes one forward-wrapped envelope, returning whether a session acked
/// the push (mirroring `PushEngine::push`'s own `Ok(false)` = "no active
/// recipient" contract).
pub async fn route(state: &AppState, envelope: &Envelope) -> Result<bool, ForwardError> {
    let kids = recipient_kids(envelope)?;
    let mediator_verkey = state.keypair.verkey();

    if kids.iter().any(|kid| kid == &mediator_verkey) {
        let forward = unwrap_forward(envelope, &state.keypair)?;
        let endpoint = state
            .store
            .load_endpoint_by_routing_key(&forward.to)
            .await?
            .ok_or(ForwardError::NoMatch)?;
        return push_with_failover(state, &endpoint, forward.msg).await;
    }

    for kid in &kids {
        if let Some(endpoint) = state.store.load_endpoint_by_routing_key(kid).await? {
            let payload = serde_json::to_value(envelope)
                .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
            return push_with_failover(state, &endpoint, payload).await;
        }
    }

    Err(ForwardError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_is_a_distinct_variant_from_envelope_errors() {
        let err = ForwardError::NoMatch;
        assert!(matches!(err, ForwardError::NoMatch));
    }
}
