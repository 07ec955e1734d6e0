//! Configuration types for the sync engine
//!
//! The core only consumes a fully resolved [`SyncConfig`]. Reading
//! environment variables, files or defaults happens once, at startup, in the
//! daemon; nothing here performs fallback lookups.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Client source configuration
    pub source: ClientSourceConfig,

    /// DNS record store configuration
    pub store: DnsStoreConfig,

    /// Upstream organization identifier
    pub org_id: String,

    /// Networks to sync; empty means every network of the organization
    #[serde(default)]
    pub network_ids: Vec<String>,

    /// Suffix appended to every managed hostname (e.g. ".lan")
    ///
    /// Appended verbatim; it also scopes which DNS records the engine owns.
    pub hostname_suffix: String,

    /// Look-back window for client listing, in seconds
    #[serde(default = "default_client_timespan_secs")]
    pub client_timespan_secs: u64,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with default engine settings
    pub fn new(
        source: ClientSourceConfig,
        store: DnsStoreConfig,
        org_id: impl Into<String>,
        hostname_suffix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            org_id: org_id.into(),
            network_ids: Vec::new(),
            hostname_suffix: hostname_suffix.into(),
            client_timespan_secs: default_client_timespan_secs(),
            engine: EngineConfig::default(),
        }
    }

    /// Restrict the sync to the given networks
    pub fn with_network_ids(mut self, ids: Vec<String>) -> Self {
        self.network_ids = ids;
        self
    }

    /// Replace the engine settings
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.org_id.trim().is_empty() {
            return Err(crate::Error::config("Organization ID cannot be empty"));
        }

        if self.hostname_suffix.trim().is_empty() {
            return Err(crate::Error::config("Hostname suffix cannot be empty"));
        }

        if self.client_timespan_secs == 0 {
            return Err(crate::Error::config("Client timespan must be > 0"));
        }

        self.source.validate()?;
        self.store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Client source configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSourceConfig {
    /// Meraki Dashboard API
    Meraki {
        /// Dashboard API key
        api_key: String,
        /// API base URL override (defaults to the public v1 endpoint)
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Custom client source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ClientSourceConfig {
    /// Validate the client source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ClientSourceConfig::Meraki { api_key, .. } => {
                if api_key.is_empty() {
                    return Err(crate::Error::config("Meraki API key cannot be empty"));
                }
                Ok(())
            }
            ClientSourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom client source factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            ClientSourceConfig::Meraki { .. } => "meraki",
            ClientSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// DNS record store configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnsStoreConfig {
    /// Pi-hole v6 REST API
    Pihole {
        /// Pi-hole base URL (e.g. "http://pi.hole")
        url: String,
        /// Web/app password; `None` when the API is unauthenticated
        #[serde(default)]
        password: Option<String>,
        /// Log mutations instead of performing them
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom record store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DnsStoreConfig {
    /// Validate the record store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DnsStoreConfig::Pihole { url, .. } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Pi-hole URL cannot be empty"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Pi-hole URL must use http or https: {}",
                        url
                    )));
                }
                Ok(())
            }
            DnsStoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom record store factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            DnsStoreConfig::Pihole { .. } => "pihole",
            DnsStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

impl std::fmt::Debug for ClientSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientSourceConfig::Meraki { base_url, .. } => f
                .debug_struct("Meraki")
                .field("api_key", &"<REDACTED>")
                .field("base_url", base_url)
                .finish(),
            ClientSourceConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

impl std::fmt::Debug for DnsStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsStoreConfig::Pihole { url, password, dry_run } => f
                .debug_struct("Pihole")
                .field("url", url)
                .field("password", &password.as_ref().map(|_| "<REDACTED>"))
                .field("dry_run", dry_run)
                .finish(),
            DnsStoreConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum attempts for a fetch call (first try included)
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    /// First backoff delay after a transient failure (in milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay (in seconds)
    ///
    /// Also caps `Retry-After` hints sent by upstream APIs.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Interval between scheduled passes (in seconds)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Number of pass outcomes kept for the dashboard history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Allow a pass with zero eligible clients to delete every managed record
    ///
    /// When false, a pass that finds no eligible client skips stale deletions.
    #[serde(default)]
    pub purge_on_empty: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_fetch_attempts == 0 {
            return Err(crate::Error::config("max_fetch_attempts must be >= 1"));
        }
        if self.sync_interval_secs == 0 {
            return Err(crate::Error::config("sync_interval_secs must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(crate::Error::config("history_capacity must be > 0"));
        }
        Ok(())
    }

    /// Retry policy for fetch calls
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_fetch_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_secs(self.max_backoff_secs),
        )
    }

    /// Interval between scheduled passes
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: default_max_fetch_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            history_capacity: default_history_capacity(),
            purge_on_empty: false,
        }
    }
}

fn default_client_timespan_secs() -> u64 {
    86_400
}

fn default_max_fetch_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SyncConfig {
        SyncConfig::new(
            ClientSourceConfig::Meraki {
                api_key: "key".to_string(),
                base_url: None,
            },
            DnsStoreConfig::Pihole {
                url: "http://pi.hole".to_string(),
                password: Some("secret".to_string()),
                dry_run: false,
            },
            "123456",
            ".lan",
        )
    }

    #[test]
    fn sample_config_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_suffix_is_rejected() {
        let mut config = sample();
        config.hostname_suffix = "  ".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn empty_org_is_rejected() {
        let mut config = sample();
        config.org_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_capacity_is_rejected() {
        let config = sample().with_engine(EngineConfig {
            history_capacity: 0,
            ..EngineConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn pihole_url_needs_scheme() {
        let store = DnsStoreConfig::Pihole {
            url: "pi.hole".to_string(),
            password: None,
            dry_run: false,
        };
        assert!(store.validate().is_err());
    }

    #[test]
    fn engine_defaults_from_empty_json() {
        let engine: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(engine.max_fetch_attempts, 4);
        assert_eq!(engine.sync_interval_secs, 300);
        assert_eq!(engine.history_capacity, 50);
        assert!(!engine.purge_on_empty);
    }

    #[test]
    fn tagged_source_config_deserializes() {
        let json = r#"{"type":"meraki","api_key":"abc"}"#;
        let source: ClientSourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(source.type_name(), "meraki");
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = SyncConfig::new(
            ClientSourceConfig::Meraki {
                api_key: "meraki-secret".to_string(),
                base_url: None,
            },
            DnsStoreConfig::Pihole {
                url: "http://pi.hole".to_string(),
                password: Some("pihole-secret".to_string()),
                dry_run: false,
            },
            "123456",
            ".lan",
        );

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("meraki-secret"));
        assert!(!debug_str.contains("pihole-secret"));
        assert!(debug_str.contains("http://pi.hole"));
    }
}
