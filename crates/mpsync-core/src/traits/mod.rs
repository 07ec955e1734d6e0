//! Collaborator traits for the sync engine
//!
//! This module defines the abstract interfaces the core drives.
//!
//! - [`ClientSource`]: Fetch networks and clients from the upstream platform
//! - [`DnsRecordStore`]: Read and mutate custom DNS records in the sink-hole

pub mod client_source;
pub mod dns_store;

pub use client_source::{ClientRecord, ClientSource, ClientSourceFactory, Network};
pub use dns_store::{DnsRecordStore, DnsRecordStoreFactory, RecordSet};
