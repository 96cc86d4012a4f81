//! Address grammar: `redis://{host}[/{channel}]`.

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAddr {
    pub host: String,
    pub channel: Option<String>,
}

impl ShardAddr {
    pub fn parse(addr: &str) -> Result<Self, StreamError> {
        let rest = addr
            .strip_prefix("redis://")
            .ok_or_else(|| StreamError::BadAddress(addr.to_owned()))?;
        match rest.split_once('/') {
            Some((host, channel)) if !channel.is_empty() => Ok(Self {
                host: host.to_owned(),
                channel: Some(channel.to_owned()),
            }),
            _ => {
                let host = rest.trim_end_matches('/');
                if host.is_empty() {
                    return Err(StreamError::BadAddress(addr.to_owned()));
                }
                Ok(Self {
                    host: host.to_owned(),
                    channel: None,
                })
            }
        }
    }

    /// The shard-only address, with no channel component.
    pub fn shard_url(&self) -> String {
        format!("redis://{}", self.host)
    }

    pub fn with_channel(&self, channel: impl Into<String>) -> Self {
        Self {
            host: self.host.clone(),
            channel: Some(channel.into()),
        }
    }

    pub fn full(&self) -> String {
        match &self.channel {
            Some(channel) => format!("redis://{}/{channel}", self.host),
            None => self.shard_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shard_only_address() {
        let addr = ShardAddr::parse("redis://shard-a:6379").unwrap();
        assert_eq!(addr.host, "shard-a:6379");
        assert_eq!(addr.channel, None);
        assert_eq!(addr.shard_url(), "redis://shard-a:6379");
    }

    #[test]
    fn parses_address_with_channel() {
        let addr = ShardAddr::parse("redis://shard-a:6379/endpoint-uid").unwrap();
        assert_eq!(addr.host, "shard-a:6379");
        assert_eq!(addr.channel.as_deref(), Some("endpoint-uid"));
        assert_eq!(addr.full(), "redis://shard-a:6379/endpoint-uid");
    }

    #[test]
    fn rejects_addresses_without_redis_scheme() {
        assert!(ShardAddr::parse("http://shard-a:6379").is_err());
    }

    #[test]
    fn with_channel_replaces_channel_keeping_host() {
        let addr = ShardAddr::parse("redis://shard-a:6379").unwrap();
        let rechanneled = addr.with_channel("new-channel");
        assert_eq!(rechanneled.full(), "redis://shard-a:6379/new-channel");
    }
}
