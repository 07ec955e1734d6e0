//! Eligibility filter
//!
//! Decides which upstream clients get a DNS record. A client qualifies only
//! when it holds a fixed IP assignment AND is currently using that address;
//! a client whose reservation is configured but not honoured right now is
//! left alone until it is.

use crate::hostname::normalize_hostname;
use crate::traits::ClientRecord;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use tracing::debug;

/// A client that qualifies for a DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleClient {
    /// Upstream client identifier (diagnostics only)
    pub id: String,
    /// Name the hostname was derived from
    pub name: String,
    /// Canonical DNS label derived from `name`
    pub hostname: String,
    /// Reserved and currently observed address
    pub ip: Ipv4Addr,
    /// Hardware address, when known
    pub mac: Option<String>,
    /// Network the client was fetched from
    pub network_id: Option<String>,
}

/// Why a client was not selected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// No fixed IP assignment
    #[error("no fixed IP assignment")]
    NoFixedIp,

    /// No currently observed IP
    #[error("no observed IP")]
    NoObservedIp,

    /// An address could not be parsed
    #[error("malformed IP address '{0}'")]
    MalformedIp(String),

    /// Reservation exists but the client is on another address
    #[error("fixed IP {fixed} differs from observed IP {observed}")]
    ReservationMismatch {
        /// Reserved address
        fixed: IpAddr,
        /// Address in use
        observed: IpAddr,
    },

    /// Only A records are managed
    #[error("address {0} is not IPv4")]
    NotIpv4(IpAddr),

    /// Neither a display name nor a hostname hint
    #[error("no usable name")]
    NoName,

    /// The name does not survive hostname normalization
    #[error("{0}")]
    InvalidHostname(String),

    /// Missing upstream identifier
    #[error("no client identifier")]
    NoIdentifier,
}

impl SkipReason {
    /// Short, stable tag for log filtering
    pub fn tag(&self) -> &'static str {
        match self {
            SkipReason::NoFixedIp => "no_fixed_ip",
            SkipReason::NoObservedIp => "no_observed_ip",
            SkipReason::MalformedIp(_) => "malformed_ip",
            SkipReason::ReservationMismatch { .. } => "reservation_mismatch",
            SkipReason::NotIpv4(_) => "not_ipv4",
            SkipReason::NoName => "no_name",
            SkipReason::InvalidHostname(_) => "invalid_hostname",
            SkipReason::NoIdentifier => "no_identifier",
        }
    }
}

/// Evaluate a single client against the inclusion rules
///
/// Rules are checked in order: fixed IP present, observed IP present,
/// addresses equal (and IPv4), usable name, identifier present. The first
/// failing rule is reported.
pub fn evaluate(client: &ClientRecord) -> Result<EligibleClient, SkipReason> {
    let fixed = non_empty(client.fixed_ip.as_deref()).ok_or(SkipReason::NoFixedIp)?;
    let observed = non_empty(client.observed_ip.as_deref()).ok_or(SkipReason::NoObservedIp)?;

    let fixed = parse_ip(fixed)?;
    let observed = parse_ip(observed)?;
    if fixed != observed {
        return Err(SkipReason::ReservationMismatch { fixed, observed });
    }
    let ip = match observed {
        IpAddr::V4(v4) => v4,
        other => return Err(SkipReason::NotIpv4(other)),
    };

    let name = non_empty(client.description.as_deref())
        .or_else(|| non_empty(client.hostname_hint.as_deref()))
        .ok_or(SkipReason::NoName)?;
    let hostname = normalize_hostname(Some(name))
        .map_err(|e| SkipReason::InvalidHostname(e.to_string()))?;

    let id = non_empty(client.id.as_deref()).ok_or(SkipReason::NoIdentifier)?;

    Ok(EligibleClient {
        id: id.to_string(),
        name: name.to_string(),
        hostname,
        ip,
        mac: client.mac.clone(),
        network_id: client.network_id.clone(),
    })
}

/// Select the clients that qualify for a DNS record
///
/// Input order is preserved and duplicates are kept; collision handling
/// belongs to [`crate::desired::build`]. Skipped clients are only reported
/// at debug level.
pub fn filter(clients: &[ClientRecord]) -> Vec<EligibleClient> {
    let mut eligible = Vec::with_capacity(clients.len());

    for client in clients {
        match evaluate(client) {
            Ok(found) => {
                debug!(
                    client_id = %found.id,
                    name = %found.name,
                    ip = %found.ip,
                    "Client has a matching fixed IP assignment"
                );
                eligible.push(found);
            }
            Err(reason) => {
                debug!(
                    client_id = client.id.as_deref().unwrap_or("-"),
                    mac = client.mac.as_deref().unwrap_or("-"),
                    network_id = client.network_id.as_deref().unwrap_or("-"),
                    reason = reason.tag(),
                    detail = %reason,
                    "Skipping client"
                );
            }
        }
    }

    eligible
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_ip(raw: &str) -> Result<IpAddr, SkipReason> {
    raw.parse()
        .map_err(|_| SkipReason::MalformedIp(raw.to_string()))
}
