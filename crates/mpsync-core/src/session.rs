//! Sync session
//!
//! One [`SyncSession::run`] call is one pass:
//!
//! ```text
//! networks ─► clients ─► filter ─► build ─► snapshot ─► plan ─► execute ─► publish
//! ```
//!
//! Upstream reads go through the retry decorators. A read that still fails
//! aborts the pass before any mutation; the aborted outcome is published so
//! the failure is visible without touching DNS.

use crate::config::SyncConfig;
use crate::desired;
use crate::eligibility;
use crate::error::{Error, Result};
use crate::outcome::SyncOutcome;
use crate::reconcile::{self, Reconciler};
use crate::retry::{RetryingClientSource, RetryingRecordStore};
use crate::snapshot;
use crate::state::{StatePublisher, SyncSnapshot};
use crate::traits::{ClientRecord, ClientSource, DnsRecordStore, Network};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs reconciliation passes against one source and one store
pub struct SyncSession {
    source: RetryingClientSource,
    store: RetryingRecordStore,
    org_id: String,
    network_ids: Vec<String>,
    suffix: String,
    client_timespan_secs: u64,
    purge_on_empty: bool,
    publisher: Arc<StatePublisher>,
}

impl SyncSession {
    /// Create a session
    ///
    /// The configuration is validated here; both collaborators are wrapped in
    /// retry decorators built from `config.engine`. The suffix is lowercased
    /// to match the domains stores report.
    pub fn new(
        source: Box<dyn ClientSource>,
        store: Box<dyn DnsRecordStore>,
        config: &SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let policy = config.engine.retry_policy();

        Ok(Self {
            source: RetryingClientSource::new(source, policy.clone()),
            store: RetryingRecordStore::new(store, policy),
            org_id: config.org_id.clone(),
            network_ids: config.network_ids.clone(),
            suffix: config.hostname_suffix.to_lowercase(),
            client_timespan_secs: config.client_timespan_secs,
            purge_on_empty: config.engine.purge_on_empty,
            publisher: Arc::new(StatePublisher::new(config.engine.history_capacity)),
        })
    }

    /// Shared handle to the published state
    pub fn publisher(&self) -> Arc<StatePublisher> {
        Arc::clone(&self.publisher)
    }

    /// Managed hostname suffix
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Run one pass and publish its result
    pub async fn run(&self) -> SyncOutcome {
        let started_at = Utc::now();
        info!(
            source = self.source.source_name(),
            store = self.store.store_name(),
            suffix = %self.suffix,
            "Starting sync pass"
        );

        let clients = match self.fetch_clients().await {
            Ok(clients) => clients,
            Err(e) => return self.abort(started_at, "client fetch", e),
        };

        let eligible = eligibility::filter(&clients);
        if eligible.is_empty() {
            info!(
                fetched = clients.len(),
                "No client has a fixed IP assignment matching its current address"
            );
        } else {
            info!(fetched = clients.len(), eligible = eligible.len(), "Selected eligible clients");
        }

        let desired = desired::build(&eligible, &self.suffix);

        let current = match snapshot::capture(&self.store, &self.suffix).await {
            Ok(current) => current,
            Err(e) => return self.abort(started_at, "DNS snapshot", e),
        };

        let mut plan = reconcile::plan(desired.records(), &current, &self.suffix);
        if !plan.deletions.is_empty() && desired.is_empty() {
            if self.purge_on_empty {
                warn!(
                    count = plan.deletions.len(),
                    suffix = %self.suffix,
                    "No eligible clients, deleting every managed record"
                );
            } else {
                warn!(
                    count = plan.deletions.len(),
                    suffix = %self.suffix,
                    "No eligible clients, keeping existing managed records"
                );
                plan = plan.without_deletions();
            }
        }

        let mut outcome = Reconciler::new(&self.store).execute(&plan).await;
        outcome.started_at = started_at;

        let after = plan.project(&current, &outcome);
        let (mapped, unsynced) = SyncSnapshot::map_devices(&eligible, &after);

        info!(
            added = outcome.added,
            updated = outcome.updated,
            deleted = outcome.deleted,
            unchanged = outcome.unchanged,
            failed = outcome.failed,
            "Sync pass finished"
        );

        self.publisher.publish(SyncSnapshot {
            outcome: outcome.clone(),
            desired: desired.records().clone(),
            current_before: current,
            eligible,
            mapped,
            unsynced,
            collisions: desired.collisions().to_vec(),
        });

        outcome
    }

    fn abort(&self, started_at: chrono::DateTime<Utc>, stage: &str, e: Error) -> SyncOutcome {
        error!(stage, error = %e, "Sync pass aborted before any DNS change");
        let outcome = SyncOutcome::aborted(started_at, format!("{} failed: {}", stage, e));
        self.publisher.record_abort(outcome.clone());
        outcome
    }

    /// Networks to query this pass
    ///
    /// With configured ids, each id is checked against the organization's
    /// network list and unknown ids are skipped. If that list cannot be read,
    /// the configured ids are used as-is.
    async fn resolve_networks(&self) -> Result<Vec<Network>> {
        if self.network_ids.is_empty() {
            let networks = self.source.list_networks(&self.org_id).await?;
            if networks.is_empty() {
                info!(org_id = %self.org_id, "Organization has no networks");
            }
            return Ok(networks);
        }

        let known = match self.source.list_networks(&self.org_id).await {
            Ok(networks) => networks,
            Err(e) => {
                warn!(
                    org_id = %self.org_id,
                    error = %e,
                    "Could not read network list, using configured network ids unvalidated"
                );
                return Ok(self
                    .network_ids
                    .iter()
                    .map(|id| Network::new(id.clone(), format!("Unknown (ID: {})", id)))
                    .collect());
            }
        };

        let by_id: HashMap<&str, &Network> = known.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut selected = Vec::with_capacity(self.network_ids.len());
        for id in &self.network_ids {
            match by_id.get(id.as_str()) {
                Some(network) => selected.push((*network).clone()),
                None => warn!(network_id = %id, org_id = %self.org_id, "Configured network not found, skipping"),
            }
        }
        if selected.is_empty() {
            warn!(org_id = %self.org_id, "None of the configured networks exist in the organization");
        }

        Ok(selected)
    }

    /// Fetch clients from every network, deduplicated by client id
    ///
    /// A client seen in several networks keeps its first position and the
    /// most recently fetched data.
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>> {
        let networks = self.resolve_networks().await?;

        let mut clients: Vec<ClientRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for network in &networks {
            let fetched = self
                .source
                .list_clients(&network.id, self.client_timespan_secs)
                .await?;
            debug!(
                network_id = %network.id,
                network = %network.name,
                count = fetched.len(),
                "Fetched clients"
            );

            for mut client in fetched {
                client.network_id.get_or_insert_with(|| network.id.clone());
                let id = client.id.clone().filter(|id| !id.is_empty());
                let existing = id.as_ref().and_then(|id| positions.get(id).copied());
                match existing {
                    Some(position) => clients[position] = client,
                    None => {
                        if let Some(id) = id {
                            positions.insert(id, clients.len());
                        }
                        clients.push(client);
                    }
                }
            }
        }

        Ok(clients)
    }
}
