//! Current-state snapshot
//!
//! Point-in-time read of the records this tool owns. Every pass performs a
//! full read; nothing is cached between passes.

use crate::error::Result;
use crate::traits::{DnsRecordStore, RecordSet};
use tracing::debug;

/// Whether a domain falls under the managed suffix
///
/// Comparison is case-insensitive. The bare suffix itself is not a managed
/// name.
pub fn is_managed(domain: &str, suffix: &str) -> bool {
    if suffix.is_empty() || domain.len() <= suffix.len() {
        return false;
    }
    let tail = domain.len() - suffix.len();
    domain.is_char_boundary(tail) && domain[tail..].eq_ignore_ascii_case(suffix)
}

/// Restrict a record set to managed domains
pub fn scope_to_suffix(records: RecordSet, suffix: &str) -> RecordSet {
    records
        .into_iter()
        .filter(|(domain, _)| is_managed(domain, suffix))
        .collect()
}

/// Read the managed records from the store
pub async fn capture(store: &dyn DnsRecordStore, suffix: &str) -> Result<RecordSet> {
    let all = store.list_records().await?;
    let total = all.len();
    let managed = scope_to_suffix(all, suffix);

    debug!(
        store = store.store_name(),
        total,
        managed = managed.len(),
        suffix,
        "Captured current DNS state"
    );

    Ok(managed)
}
