//! API key authentication for agent clients.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity behind a valid API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyInfo {
    pub key_id: String,
    pub name: String,
    /// Recorded as the client id on every exchange.
    pub client_id: String,
}

/// API key validator.
///
/// Keys are loaded once from configuration and kept only as SHA-256 digests.
#[derive(Clone, Default)]
pub struct ApiKeyValidator {
    keys: Arc<HashMap<String, ApiKeyInfo>>,
}

impl ApiKeyValidator {
    pub fn new(configured_keys: Vec<ConfiguredApiKey>) -> Self {
        let keys = configured_keys
            .into_iter()
            .map(|key| {
                (
                    Self::hash_key(&key.key),
                    ApiKeyInfo {
                        key_id: key.id,
                        name: key.name,
                        client_id: key.client_id,
                    },
                )
            })
            .collect();

        Self {
            keys: Arc::new(keys),
        }
    }

    /// Hash an API key for comparison.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validate an API key and return its info if valid.
    pub fn validate(&self, key: &str) -> Option<ApiKeyInfo> {
        self.keys.get(&Self::hash_key(key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// API key configuration from config file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ConfiguredApiKey {
    pub id: String,
    /// The key as presented by the agent.
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub client_id: String,
}
