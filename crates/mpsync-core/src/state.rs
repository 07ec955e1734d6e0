//! Published pass results
//!
//! The session publishes one immutable [`PublishedState`] at the end of each
//! pass. Readers load it through [`StatePublisher::latest`] without locking
//! and never see a half-updated value.

use crate::desired::Collision;
use crate::eligibility::EligibleClient;
use crate::outcome::SyncOutcome;
use crate::traits::RecordSet;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;

/// An eligible client with a record pointing at its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedDevice {
    /// Upstream client identifier
    pub client_id: String,
    /// Name the hostname was derived from
    pub client_name: String,
    /// Domain resolving to the client
    pub domain: String,
    /// Client address
    pub ip: IpAddr,
}

/// Everything a pass saw and produced
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    /// Summary of the pass
    pub outcome: SyncOutcome,
    /// Records the pass aimed for
    pub desired: RecordSet,
    /// Managed records before any mutation
    pub current_before: RecordSet,
    /// Clients that passed the eligibility filter
    pub eligible: Vec<EligibleClient>,
    /// Eligible clients with a matching record after the pass
    pub mapped: Vec<MappedDevice>,
    /// Eligible clients left without a record
    pub unsynced: Vec<EligibleClient>,
    /// Domain collisions resolved during the build
    pub collisions: Vec<Collision>,
}

impl SyncSnapshot {
    /// Pair eligible clients with the records that resolve to their address
    ///
    /// A client with several records at its address is listed once per
    /// domain. A client with none ends up in `unsynced`.
    pub fn map_devices(
        eligible: &[EligibleClient],
        records: &RecordSet,
    ) -> (Vec<MappedDevice>, Vec<EligibleClient>) {
        let mut mapped = Vec::new();
        let mut unsynced = Vec::new();

        for client in eligible {
            let ip = IpAddr::V4(client.ip);
            let before = mapped.len();
            for (domain, record_ip) in records {
                if *record_ip == ip {
                    mapped.push(MappedDevice {
                        client_id: client.id.clone(),
                        client_name: client.name.clone(),
                        domain: domain.clone(),
                        ip,
                    });
                }
            }
            if mapped.len() == before {
                unsynced.push(client.clone());
            }
        }

        (mapped, unsynced)
    }
}

/// Bounded, oldest-first list of recent outcomes
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeHistory {
    capacity: usize,
    entries: VecDeque<SyncOutcome>,
}

impl OutcomeHistory {
    /// Create an empty history holding at most `capacity` outcomes
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an outcome, evicting the oldest when full
    pub fn push(&mut self, outcome: SyncOutcome) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(outcome);
    }

    /// Outcomes, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.entries.iter()
    }

    /// Number of stored outcomes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored outcomes
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The value readers observe
#[derive(Debug, Clone, Serialize)]
pub struct PublishedState {
    /// Outcome of the most recent pass, aborted ones included
    pub last_outcome: Option<SyncOutcome>,
    /// Snapshot of the most recent completed pass
    pub last_snapshot: Option<Arc<SyncSnapshot>>,
    /// Recent outcomes
    pub history: OutcomeHistory,
}

/// Copy-on-publish holder for [`PublishedState`]
pub struct StatePublisher {
    current: ArcSwap<PublishedState>,
}

impl StatePublisher {
    /// Create a publisher with an empty history of the given capacity
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(PublishedState {
                last_outcome: None,
                last_snapshot: None,
                history: OutcomeHistory::new(history_capacity),
            }),
        }
    }

    /// Publish a completed pass
    pub fn publish(&self, snapshot: SyncSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.current.rcu(|state| {
            let mut next = PublishedState::clone(state);
            next.last_outcome = Some(snapshot.outcome.clone());
            next.history.push(snapshot.outcome.clone());
            next.last_snapshot = Some(Arc::clone(&snapshot));
            next
        });
    }

    /// Publish a pass that stopped before reconciling
    ///
    /// The previous snapshot stays visible.
    pub fn record_abort(&self, outcome: SyncOutcome) {
        self.current.rcu(|state| {
            let mut next = PublishedState::clone(state);
            next.last_outcome = Some(outcome.clone());
            next.history.push(outcome.clone());
            next
        });
    }

    /// Latest published state
    pub fn latest(&self) -> Arc<PublishedState> {
        self.current.load_full()
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().history_capacity)
    }
}
