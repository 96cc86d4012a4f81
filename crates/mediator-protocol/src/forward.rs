//! Onion-wrapping for DIDComm routing/1.0 forward messages.

use crate::envelope::{self, EnvelopeError, KeyPair};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FORWARD_MSG_TYPE: &str = "https://didcomm.org/routing/1.0/forward";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardMessage {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub type_: String,
    pub to: String,
    pub msg: serde_json::Value,
}

/// Builds the nested onion for `routing_keys = [k1, k2, ..., kN]`: `payload`
/// (already packed to `their_vk`) is wrapped first to `k1` addressed to
/// `their_vk`, then to `k2` addressed to `k1`, and so on, so that each hop
/// unwraps one layer and learns only the next hop's key.
///
/// Mirrors the traversal order used by Sirius-style mediators: build the
/// `outer -> inner` map by walking `routing_keys` from the end, then wrap
/// starting from `routing_keys[0]`.
pub fn forward_wired(
    payload: &[u8],
    their_vk: Option<&str>,
    routing_keys: &[String],
) -> Result<envelope::Envelope, EnvelopeError> {
    if routing_keys.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let mut keys_map: std::collections::HashMap<&str, String> = std::collections::HashMap::new();
    for n in (1..routing_keys.len()).rev() {
        let outer_key = routing_keys[n].as_str();
        let inner_key = routing_keys[n - 1].clone();
        keys_map.insert(outer_key, inner_key);
    }
    if let Some(vk) = their_vk {
        keys_map.insert(routing_keys[0].as_str(), vk.to_owned());
    }

    let mut current: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    let mut last_envelope: Option<envelope::Envelope> = None;

    for outer_key in routing_keys {
        let inner_key = keys_map
            .get(outer_key.as_str())
            .cloned()
            .ok_or_else(|| EnvelopeError::Malformed("routing key chain is incomplete".into()))?;
        let forwarded = ForwardMessage {
            id: Uuid::new_v4().to_string(),
            type_: FORWARD_MSG_TYPE.to_owned(),
            to: inner_key,
            msg: current,
        };
        let wire = serde_json::to_vec(&forwarded)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let wrapped = envelope::pack(&wire, &[outer_key.as_str()], None)?;
        current = serde_json::to_value(&wrapped).expect("Envelope always serializes");
        last_envelope = Some(wrapped);
    }

    last_envelope.ok_or(EnvelopeError::NoRecipients)
}

/// Unwraps one forward layer. `my_keys` must be the keypair for the `to`
/// value the envelope was addressed to.
pub fn unwrap_forward(
    wrapped: &envelope::Envelope,
    my_keys: &KeyPair,
) -> Result<ForwardMessage, EnvelopeError> {
    let (plaintext, _sender) = envelope::unpack(wrapped, my_keys)?;
    let parsed: ForwardMessage =
        serde_json::from_slice(&plaintext).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    if parsed.type_ != FORWARD_MSG_TYPE {
        return Err(EnvelopeError::Malformed(format!(
            "expected forward message, got {}",
            parsed.type_
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onion_inverts_through_every_hop() {
        let recipient = KeyPair::generate();
        let hop1 = KeyPair::generate();
        let hop2 = KeyPair::generate();
        let inner_payload = envelope::pack(b"secret payload", &[&recipient.verkey()], None)
            .expect("pack inner");
        let inner_json = serde_json::to_vec(&inner_payload).expect("serialize inner");

        let routing_keys = vec![hop1.verkey(), hop2.verkey()];
        let onion = forward_wired(&inner_json, Some(&recipient.verkey()), &routing_keys)
            .expect("forward_wired");

        let hop2_layer = unwrap_forward(&onion, &hop2).expect("hop2 unwrap");
        assert_eq!(hop2_layer.to, hop1.verkey());

        let hop1_envelope: envelope::Envelope =
            serde_json::from_value(hop2_layer.msg).expect("hop1 envelope shape");
        let hop1_layer = unwrap_forward(&hop1_envelope, &hop1).expect("hop1 unwrap");
        assert_eq!(hop1_layer.to, recipient.verkey());

        let innermost: envelope::Envelope =
            serde_json::from_value(hop1_layer.msg).expect("innermost envelope shape");
        let (plaintext, _) = envelope::unpack(&innermost, &recipient).expect("innermost unpack");
        assert_eq!(plaintext, b"secret payload");
    }

    #[test]
    fn forward_wired_rejects_empty_routing_keys() {
        let err = forward_wired(b"{}", None, &[]).unwrap_err();
        assert!(matches!(err, EnvelopeError::NoRecipients));
    }
}
