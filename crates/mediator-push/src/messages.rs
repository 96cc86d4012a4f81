use serde::{Deserialize, Serialize};

pub const PUSH_MSG_TYPE: &str = "https://didcomm.org/redis/1.0/push";
pub const ACK_MSG_TYPE: &str = "https://didcomm.org/redis/1.0/ack";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub type_: String,
    pub reverse_channel: String,
    pub expire_at: f64,
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub type_: String,
    pub status: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_request_uses_at_prefixed_field_names_on_the_wire() {
        let request = PushRequest {
            id: "req-1".to_owned(),
            type_: PUSH_MSG_TYPE.to_owned(),
            reverse_channel: "redis://a:6379/reverse".to_owned(),
            expire_at: 123.0,
            message: serde_json::json!({"k": "v"}),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["@id"], "req-1");
        assert_eq!(value["@type"], PUSH_MSG_TYPE);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn push_ack_round_trips() {
        let ack = PushAck {
            id: "req-1".to_owned(),
            type_: ACK_MSG_TYPE.to_owned(),
            status: true,
        };
        let json = serde_json::to_string(&ack).unwrap();
        let parsed: PushAck = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "req-1");
        assert!(parsed.status);
    }
}
