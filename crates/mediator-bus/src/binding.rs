use md5::{Digest, Md5};
use mediator_protocol::CastDescriptor;

use crate::error::BusError;

/// Computes a subscribe operation's binding id: the explicit thread id
/// when `cast.thid` is given, otherwise the md5 hex digest of the cast's
/// canonical JSON (sorted keys, sorted protocol list) — so every party
/// that builds the same cast lands on the same binding id.
pub fn compute_binding_id(cast: &CastDescriptor) -> Result<String, BusError> {
    if let Some(thid) = &cast.thid {
        return Ok(thid.clone());
    }

    if (cast.recipient_vk.is_some() || cast.sender_vk.is_some()) && cast.protocols.is_empty() {
        return Err(BusError::InvalidCast);
    }

    let mut protocols = cast.protocols.clone();
    protocols.sort();

    let mut canonical = serde_json::Map::new();
    if !protocols.is_empty() {
        canonical.insert("protocols".to_owned(), serde_json::json!(protocols));
    }
    if let Some(recipient_vk) = &cast.recipient_vk {
        canonical.insert("recipient_vk".to_owned(), serde_json::json!(recipient_vk));
    }
    if let Some(sender_vk) = &cast.sender_vk {
        canonical.insert("sender_vk".to_owned(), serde_json::json!(sender_vk));
    }

    // serde_json's default Map is BTreeMap-backed, so this serializes with
    // keys in sorted order without needing to sort them by hand.
    let canonical_json = serde_json::to_string(&serde_json::Value::Object(canonical))
        .expect("canonical cast map always serializes");
    let digest = Md5::digest(canonical_json.as_bytes());
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_thid_is_returned_verbatim() {
        let cast = CastDescriptor {
            thid: Some("thread-1".to_owned()),
            ..Default::default()
        };
        assert_eq!(compute_binding_id(&cast).unwrap(), "thread-1");
    }

    #[test]
    fn recipient_without_protocols_is_invalid() {
        let cast = CastDescriptor {
            recipient_vk: Some("VK1".to_owned()),
            ..Default::default()
        };
        assert!(matches!(compute_binding_id(&cast), Err(BusError::InvalidCast)));
    }

    #[test]
    fn same_cast_always_computes_the_same_binding_id() {
        let cast = CastDescriptor {
            recipient_vk: Some("VK1".to_owned()),
            sender_vk: Some("VK2".to_owned()),
            protocols: vec!["proto-a".to_owned()],
            ..Default::default()
        };
        let a = compute_binding_id(&cast).unwrap();
        let b = compute_binding_id(&cast).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn protocol_order_does_not_affect_binding_id() {
        let cast1 = CastDescriptor {
            sender_vk: Some("VK2".to_owned()),
            protocols: vec!["a".to_owned(), "b".to_owned()],
            ..Default::default()
        };
        let cast2 = CastDescriptor {
            sender_vk: Some("VK2".to_owned()),
            protocols: vec!["b".to_owned(), "a".to_owned()],
            ..Default::default()
        };
        assert_eq!(
            compute_binding_id(&cast1).unwrap(),
            compute_binding_id(&cast2).unwrap()
        );
    }
}
