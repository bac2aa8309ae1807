use log::warn;
use serde::{Deserialize, Serialize};

use crate::backend::is_portable_name;

/// ESP-IDF limits namespace names to 15 characters plus terminator.
pub const MAX_NAMESPACE_LEN: usize = 15;
pub const DEFAULT_NAMESPACE: &str = "greenhouse";
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 512;
pub const DEFAULT_INIT_RETRIES: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub namespace: String,
    #[serde(rename = "maxEntrySize")]
    pub max_entry_size: usize,
    #[serde(rename = "initRetries")]
    pub init_retries: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            init_retries: DEFAULT_INIT_RETRIES,
        }
    }
}

impl StoreConfig {
    pub fn sanitize(&mut self) {
        let valid_namespace =
            self.namespace.len() <= MAX_NAMESPACE_LEN && is_portable_name(&self.namespace);
        if !valid_namespace {
            warn!(
                "invalid storage namespace `{}`; using `{}`",
                self.namespace, DEFAULT_NAMESPACE
            );
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }

        self.max_entry_size = self.max_entry_size.clamp(4, 4000);
        self.init_retries = self.init_retries.clamp(1, 10);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(rename = "persistIntervalMs", default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
}

fn default_persist_interval_ms() -> u64 {
    30_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            persist_interval_ms: default_persist_interval_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.store.sanitize();
        self.persist_interval_ms = self.persist_interval_ms.max(1_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = RuntimeConfig::from_json(br#"{"persistIntervalMs": 5000}"#).unwrap();
        assert_eq!(
            config,
            RuntimeConfig {
                store: StoreConfig::default(),
                persist_interval_ms: 5_000,
            }
        );
    }

    #[test]
    fn sanitize_replaces_oversized_namespace() {
        let mut config = StoreConfig {
            namespace: "a-namespace-that-is-too-long".to_string(),
            max_entry_size: 1_000_000,
            init_retries: 0,
        };
        config.sanitize();

        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.max_entry_size, 4000);
        assert_eq!(config.init_retries, 1);
    }

    #[test]
    fn sanitize_rejects_path_like_namespaces() {
        for namespace in ["..", "/tmp", ".hidden", "a/b", "a\\b", "nvs.bak"] {
            let mut config = StoreConfig {
                namespace: namespace.to_string(),
                ..StoreConfig::default()
            };
            config.sanitize();
            assert_eq!(config.namespace, DEFAULT_NAMESPACE, "namespace `{namespace}`");
        }

        let mut config = StoreConfig {
            namespace: "bench_2-a".to_string(),
            ..StoreConfig::default()
        };
        config.sanitize();
        assert_eq!(config.namespace, "bench_2-a");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RuntimeConfig::from_json(b"{not json").is_err());
    }
}
