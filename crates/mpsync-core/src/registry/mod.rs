//! Plugin-based collaborator registry
//!
//! Client sources and DNS record stores are registered by type name at
//! startup and instantiated from configuration, so the daemon never matches
//! on concrete implementations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mpsync_core::registry::Registry;
//!
//! let registry = Registry::new();
//! mpsync_source_meraki::register(&registry);
//! mpsync_sink_pihole::register(&registry);
//!
//! let source = registry.create_source(&config.source)?;
//! let store = registry.create_store(&config.store)?;
//! ```

use crate::config::{ClientSourceConfig, DnsStoreConfig};
use crate::error::{Error, Result};
use crate::traits::{ClientSource, ClientSourceFactory, DnsRecordStore, DnsRecordStoreFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry of collaborator factories
///
/// Interior mutability through `RwLock` lets plugin crates register against a
/// shared reference.
#[derive(Default)]
pub struct Registry {
    sources: RwLock<HashMap<String, Box<dyn ClientSourceFactory>>>,
    stores: RwLock<HashMap<String, Box<dyn DnsRecordStoreFactory>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client source factory under `name`
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn ClientSourceFactory>) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Register a DNS record store factory under `name`
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn DnsRecordStoreFactory>) {
        write(&self.stores).insert(name.into(), factory);
    }

    /// Create a client source from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when no factory is registered for the type, or
    /// whatever the factory reports.
    pub fn create_source(&self, config: &ClientSourceConfig) -> Result<Box<dyn ClientSource>> {
        let name = config.type_name();
        let sources = read(&self.sources);
        let factory = sources
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown client source type: {}", name)))?;

        factory.create(config)
    }

    /// Create a DNS record store from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when no factory is registered for the type, or
    /// whatever the factory reports.
    pub fn create_store(&self, config: &DnsStoreConfig) -> Result<Box<dyn DnsRecordStore>> {
        let name = config.type_name();
        let stores = read(&self.stores);
        let factory = stores
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown DNS store type: {}", name)))?;

        factory.create(config)
    }

    /// Registered client source types
    pub fn list_sources(&self) -> Vec<String> {
        read(&self.sources).keys().cloned().collect()
    }

    /// Registered DNS store types
    pub fn list_stores(&self) -> Vec<String> {
        read(&self.stores).keys().cloned().collect()
    }

    /// Whether a client source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }

    /// Whether a DNS store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        read(&self.stores).contains_key(name)
    }
}

// A panic while holding the lock cannot leave the map half-written.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingStoreFactory;

    impl DnsRecordStoreFactory for RejectingStoreFactory {
        fn create(&self, _config: &DnsStoreConfig) -> Result<Box<dyn DnsRecordStore>> {
            Err(Error::not_found("store not available in tests"))
        }
    }

    fn pihole() -> DnsStoreConfig {
        DnsStoreConfig::Pihole {
            url: "http://pi.hole".to_string(),
            password: None,
            dry_run: false,
        }
    }

    #[test]
    fn registration_is_visible() {
        let registry = Registry::new();
        assert!(!registry.has_store("pihole"));

        registry.register_store("pihole", Box::new(RejectingStoreFactory));

        assert!(registry.has_store("pihole"));
        assert_eq!(registry.list_stores(), vec!["pihole".to_string()]);
        assert!(registry.list_sources().is_empty());
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let registry = Registry::new();
        assert!(matches!(registry.create_store(&pihole()), Err(Error::Config(_))));
    }

    #[test]
    fn factory_errors_are_returned() {
        let registry = Registry::new();
        registry.register_store("pihole", Box::new(RejectingStoreFactory));
        assert!(matches!(registry.create_store(&pihole()), Err(Error::NotFound(_))));
    }
}
