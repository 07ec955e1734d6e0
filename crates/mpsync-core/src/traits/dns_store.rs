// # DNS Record Store Trait
//
// Defines the interface to the sink-hole DNS service holding the custom
// hostname → IP records.
//
// ## Implementations
//
// - Pi-hole v6: `mpsync-sink-pihole` crate
//
// ## Usage
//
// ```rust,ignore
// use mpsync_core::DnsRecordStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* DnsRecordStore implementation */;
//
//     store.add_record("printer.lan", "10.0.0.2".parse()?).await?;
//     let records = store.list_records().await?;
//     assert_eq!(records.get("printer.lan"), Some(&"10.0.0.2".parse()?));
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Domain → IP mapping, ordered by domain
///
/// Ordering keeps plans, logs and tests reproducible.
pub type RecordSet = BTreeMap<String, IpAddr>;

/// Trait for DNS record store implementations
///
/// # Trust Level: Untrusted
///
/// Stores execute single API calls and report the result. They never decide
/// which records should exist, never retry and never filter by suffix: scoping
/// is enforced by the core so that unrelated records stay untouched no matter
/// what a store returns.
#[async_trait]
pub trait DnsRecordStore: Send + Sync {
    /// List every custom record the service holds
    ///
    /// Domains are returned lowercased.
    async fn list_records(&self) -> Result<RecordSet, crate::Error>;

    /// Create a record
    ///
    /// # Parameters
    ///
    /// - `domain`: Fully-qualified domain name
    /// - `ip`: Address the name should resolve to
    async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<(), crate::Error>;

    /// Delete a record
    ///
    /// # Idempotency
    ///
    /// Deleting a record that does not exist MUST succeed, so that a pass
    /// retried after a partial failure converges instead of failing again.
    async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing record stores from configuration
pub trait DnsRecordStoreFactory: Send + Sync {
    /// Create a DnsRecordStore instance from configuration
    fn create(
        &self,
        config: &crate::config::DnsStoreConfig,
    ) -> Result<Box<dyn DnsRecordStore>, crate::Error>;
}
