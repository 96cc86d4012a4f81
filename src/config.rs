use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("MEDIATOR_SEED must decode to exactly 32 bytes (hex or base64)")]
    BadSeed,
    #[error("STREAM_SHARDS must list at least one redis://host shard")]
    EmptyShardList,
}

/// Optional FCM HTTP v1 credentials. Absent unless both env vars are set;
/// the mediator runs without a push fallback in that case.
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_key: String,
    pub sender_id: String,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub stream_shards: Vec<String>,
    pub webroot: String,
    pub mediator_seed: [u8; 32],
    pub fcm: Option<FcmConfig>,
    pub tls: Option<TlsConfig>,
    pub log_level: String,
}

fn decode_seed(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = if let Ok(b) = hex::decode(raw) {
        b
    } else {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|_| ConfigError::BadSeed)?
    };
    bytes.try_into().map_err(|_| ConfigError::BadSeed)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
        let webroot = env::var("WEBROOT").map_err(|_| ConfigError::MissingVar("WEBROOT"))?;

        let stream_shards: Vec<String> = env::var("STREAM_SHARDS")
            .map_err(|_| ConfigError::MissingVar("STREAM_SHARDS"))?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if stream_shards.is_empty() {
            return Err(ConfigError::EmptyShardList);
        }

        let seed_raw =
            env::var("MEDIATOR_SEED").map_err(|_| ConfigError::MissingVar("MEDIATOR_SEED"))?;
        let mediator_seed = decode_seed(&seed_raw)?;

        let fcm = match (env::var("FCM_API_KEY"), env::var("FCM_SENDER_ID")) {
            (Ok(api_key), Ok(sender_id)) => Some(FcmConfig { api_key, sender_id }),
            _ => None,
        };

        let tls = match (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH")) {
            (Ok(cert_path), Ok(key_path)) => Some(TlsConfig { cert_path, key_path }),
            _ => None,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Ok(Self {
            database_url,
            bind_addr,
            stream_shards,
            webroot,
            mediator_seed,
            fcm,
            tls,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_seed_accepts_hex() {
        let hex_seed = "00".repeat(32);
        assert_eq!(decode_seed(&hex_seed).unwrap(), [0u8; 32]);
    }

    #[test]
    fn decode_seed_accepts_base64() {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        assert_eq!(decode_seed(&b64).unwrap(), [7u8; 32]);
    }

    #[test]
    fn decode_seed_rejects_wrong_length() {
        assert!(matches!(decode_seed("00"), Err(ConfigError::BadSeed)));
    }
}
