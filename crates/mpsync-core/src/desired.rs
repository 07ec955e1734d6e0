//! Desired-state builder
//!
//! Maps eligible clients onto fully-qualified domain names. The result is a
//! function FQDN → IP: when two clients normalize to the same name, the one
//! that comes later in iteration order wins and the overwrite is recorded as
//! a [`Collision`].

use crate::eligibility::EligibleClient;
use crate::traits::RecordSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::warn;

/// Two eligible clients mapped to the same domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    /// Contested domain
    pub domain: String,
    /// Client that owns the record after the build
    pub kept_client_id: String,
    /// Address the record resolves to
    pub kept_ip: Ipv4Addr,
    /// Client that lost the domain
    pub displaced_client_id: String,
    /// Address of the losing client
    pub displaced_ip: Ipv4Addr,
}

/// Target DNS state for one pass
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    records: RecordSet,
    owners: BTreeMap<String, EligibleClient>,
    collisions: Vec<Collision>,
}

impl DesiredState {
    /// Domain → IP mapping to reconcile against
    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Client that owns a domain
    pub fn owner(&self, domain: &str) -> Option<&EligibleClient> {
        self.owners.get(domain)
    }

    /// Owned domains with their clients, ordered by domain
    pub fn owners(&self) -> impl Iterator<Item = (&String, &EligibleClient)> {
        self.owners.iter()
    }

    /// Overwrites that happened during the build
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Number of desired records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is desired
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build the fully-qualified domain name for a canonical hostname
///
/// The suffix is appended verbatim; it is operator-supplied and expected to
/// start with `.`. [`SyncSession`](crate::SyncSession) lowercases it first.
pub fn fqdn(hostname: &str, suffix: &str) -> String {
    format!("{}{}", hostname, suffix)
}

/// Build the desired state from eligible clients
///
/// # Parameters
///
/// - `eligible`: Clients in iteration order (later entries win collisions)
/// - `suffix`: Managed hostname suffix, e.g. ".lan"
pub fn build(eligible: &[EligibleClient], suffix: &str) -> DesiredState {
    let mut state = DesiredState::default();

    for client in eligible {
        let domain = fqdn(&client.hostname, suffix);

        if let Some(previous) = state.owners.insert(domain.clone(), client.clone()) {
            warn!(
                domain = %domain,
                kept_client = %client.id,
                kept_ip = %client.ip,
                displaced_client = %previous.id,
                displaced_ip = %previous.ip,
                "Hostname collision, later client wins"
            );
            state.collisions.push(Collision {
                domain: domain.clone(),
                kept_client_id: client.id.clone(),
                kept_ip: client.ip,
                displaced_client_id: previous.id,
                displaced_ip: previous.ip,
            });
        }

        state.records.insert(domain, IpAddr::V4(client.ip));
    }

    state
}
