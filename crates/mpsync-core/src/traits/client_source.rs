// # Client Source Trait
//
// Defines the interface for fetching network clients from the upstream
// network-management platform.
//
// ## Implementations
//
// - Meraki Dashboard API: `mpsync-source-meraki` crate
//
// ## Usage
//
// ```rust,ignore
// use mpsync_core::ClientSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ClientSource implementation */;
//
//     for network in source.list_networks("123456").await? {
//         let clients = source.list_clients(&network.id, 86_400).await?;
//         println!("{}: {} clients", network.name, clients.len());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A network partition of the upstream organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network identifier
    pub id: String,
    /// Human-readable network name
    pub name: String,
}

impl Network {
    /// Create a network entry
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A client as reported by the upstream platform
///
/// All attributes are optional because the upstream API omits them freely.
/// Records are re-fetched every pass and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Upstream client identifier
    pub id: Option<String>,
    /// Display name configured by an operator
    pub description: Option<String>,
    /// Hostname reported by the client itself (e.g. via DHCP)
    pub hostname_hint: Option<String>,
    /// Hardware address
    pub mac: Option<String>,
    /// IP address the client is currently using
    pub observed_ip: Option<String>,
    /// Reserved IP address, if a fixed assignment exists
    pub fixed_ip: Option<String>,
    /// Network the client was fetched from (filled in by the session)
    pub network_id: Option<String>,
}

impl ClientRecord {
    /// Create a client record with the given identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Set the display name
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the hostname hint
    pub fn with_hostname_hint(mut self, hint: impl Into<String>) -> Self {
        self.hostname_hint = Some(hint.into());
        self
    }

    /// Set the hardware address
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Set the currently observed IP
    pub fn with_observed_ip(mut self, ip: impl Into<String>) -> Self {
        self.observed_ip = Some(ip.into());
        self
    }

    /// Set the fixed IP assignment
    pub fn with_fixed_ip(mut self, ip: impl Into<String>) -> Self {
        self.fixed_ip = Some(ip.into());
        self
    }

    /// Set both the fixed and observed IP to the same address
    pub fn with_reserved_ip(self, ip: impl Into<String>) -> Self {
        let ip = ip.into();
        self.with_fixed_ip(ip.clone()).with_observed_ip(ip)
    }
}

/// Trait for client source implementations
///
/// Implementations wrap a single upstream API and must be thread-safe.
///
/// # Error Contract
///
/// Rate limiting and temporary unavailability MUST be reported as
/// [`crate::Error::TransientUpstream`]; authentication failures as
/// [`crate::Error::Authentication`]. The retry decorator only retries the
/// transient variant, so misclassifying an error either hides a permanent
/// failure behind retries or gives up on a recoverable one.
///
/// Implementations must not retry on their own; see
/// [`crate::retry::RetryingClientSource`].
#[async_trait]
pub trait ClientSource: Send + Sync {
    /// List all networks of an organization
    ///
    /// # Parameters
    ///
    /// - `org_id`: Organization identifier
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Network>)`: Every network of the organization (may be empty)
    /// - `Err(Error)`: If the request failed
    async fn list_networks(&self, org_id: &str) -> Result<Vec<Network>, crate::Error>;

    /// List clients seen on a network within a time window
    ///
    /// # Parameters
    ///
    /// - `network_id`: Network identifier
    /// - `timespan_secs`: Look-back window in seconds
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ClientRecord>)`: The complete client list (all pages)
    /// - `Err(Error)`: If any request failed; partial lists are never returned
    async fn list_clients(
        &self,
        network_id: &str,
        timespan_secs: u64,
    ) -> Result<Vec<ClientRecord>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing client sources from configuration
pub trait ClientSourceFactory: Send + Sync {
    /// Create a ClientSource instance from configuration
    fn create(
        &self,
        config: &crate::config::ClientSourceConfig,
    ) -> Result<Box<dyn ClientSource>, crate::Error>;
}
