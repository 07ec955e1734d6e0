// # mpsync-core
//
// Core library for syncing fixed-IP network clients into sink-hole DNS
// records.
//
// ## Architecture Overview
//
// - **ClientSource**: Trait for reading networks and clients from the upstream platform
// - **DnsRecordStore**: Trait for reading and mutating custom DNS records
// - **SyncSession**: One reconciliation pass, from client fetch to publication
// - **SyncScheduler**: Periodic and manual passes, serialized through one gate
// - **Registry**: Plugin-based registry for collaborator factories
//
// ## Pass
//
// 1. Fetch clients from every configured network
// 2. Keep clients whose fixed IP assignment matches their current address
// 3. Map them to `<hostname><suffix>` records
// 4. Diff against the managed records in the store and apply the difference
// 5. Publish the outcome and snapshot for readers

pub mod config;
pub mod desired;
pub mod eligibility;
pub mod error;
pub mod hostname;
pub mod outcome;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ClientSourceConfig, DnsStoreConfig, EngineConfig, SyncConfig};
pub use error::{Error, Result};
pub use outcome::{AppliedChange, ChangeAction, SyncFailure, SyncOutcome};
pub use registry::Registry;
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use session::SyncSession;
pub use state::{PublishedState, StatePublisher, SyncSnapshot};
pub use traits::{ClientRecord, ClientSource, DnsRecordStore, Network, RecordSet};
