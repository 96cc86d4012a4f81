/// Builds the fanout topic for a pairwise DID and binding id.
pub fn build_topic(their_did: &str, binding_id: &str) -> String {
    format!("{their_did}/{binding_id}")
}

/// Splits a topic back into its pairwise DID (absent for the `*` wildcard
/// used by pairwise-less sessions) and binding id.
pub fn parse_topic(topic: &str) -> (Option<&str>, &str) {
    match topic.split_once('/') {
        Some((did, binding_id)) => (Some(did), binding_id),
        None => (None, topic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_round_trip() {
        let topic = build_topic("did:peer:abc", "binding-1");
        assert_eq!(topic, "did:peer:abc/binding-1");
        assert_eq!(parse_topic(&topic), (Some("did:peer:abc"), "binding-1"));
    }

    #[test]
    fn topic_without_did_has_no_did_part() {
        assert_eq!(parse_topic("binding-1"), (None, "binding-1"));
    }
}
