//! Test doubles and common utilities for contract tests
//!
//! The doubles keep their observable state behind `Arc`s so a test can hand
//! one instance to the session and keep a twin (see `sharing_state_with`)
//! for assertions.

#![allow(dead_code)]

use mpsync_core::config::{ClientSourceConfig, DnsStoreConfig, EngineConfig, SyncConfig};
use mpsync_core::error::{Error, Result};
use mpsync_core::traits::{ClientRecord, ClientSource, DnsRecordStore, Network, RecordSet};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SUFFIX: &str = ".lan";

/// A ClientSource serving canned networks and clients
pub struct MockClientSource {
    networks: Vec<Network>,
    clients: Arc<Mutex<HashMap<String, Vec<ClientRecord>>>>,
    /// list_clients() calls that fail transiently before succeeding
    transient_failures: Arc<AtomicUsize>,
    /// Network ids whose client listing fails permanently
    broken_networks: HashSet<String>,
    /// Whether list_networks() fails
    network_listing_fails: bool,
    list_clients_calls: Arc<AtomicUsize>,
}

impl MockClientSource {
    /// A source with one network, "N_1"
    pub fn new() -> Self {
        Self::with_networks(vec![Network::new("N_1", "Office")])
    }

    pub fn with_networks(networks: Vec<Network>) -> Self {
        Self {
            networks,
            clients: Arc::new(Mutex::new(HashMap::new())),
            transient_failures: Arc::new(AtomicUsize::new(0)),
            broken_networks: HashSet::new(),
            network_listing_fails: false,
            list_clients_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the clients of a network
    pub fn set_clients(&self, network_id: &str, clients: Vec<ClientRecord>) {
        self.clients
            .lock()
            .unwrap()
            .insert(network_id.to_string(), clients);
    }

    /// Fail the next `count` list_clients() calls with a transient error
    pub fn fail_transiently(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    pub fn with_broken_network(mut self, network_id: &str) -> Self {
        self.broken_networks.insert(network_id.to_string());
        self
    }

    pub fn with_failing_network_listing(mut self) -> Self {
        self.network_listing_fails = true;
        self
    }

    pub fn list_clients_calls(&self) -> usize {
        self.list_clients_calls.load(Ordering::SeqCst)
    }

    /// Create a twin that shares clients and counters with `other`
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            networks: other.networks.clone(),
            clients: Arc::clone(&other.clients),
            transient_failures: Arc::clone(&other.transient_failures),
            broken_networks: other.broken_networks.clone(),
            network_listing_fails: other.network_listing_fails,
            list_clients_calls: Arc::clone(&other.list_clients_calls),
        }
    }
}

#[async_trait::async_trait]
impl ClientSource for MockClientSource {
    async fn list_networks(&self, _org_id: &str) -> Result<Vec<Network>> {
        if self.network_listing_fails {
            return Err(Error::upstream("mock", "network listing unavailable"));
        }
        Ok(self.networks.clone())
    }

    async fn list_clients(&self, network_id: &str, _timespan_secs: u64) -> Result<Vec<ClientRecord>> {
        self.list_clients_calls.fetch_add(1, Ordering::SeqCst);

        if self.broken_networks.contains(network_id) {
            return Err(Error::upstream("mock", format!("network {} unavailable", network_id)));
        }
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(Error::rate_limited("mock", "429 Too Many Requests", None));
        }

        Ok(self
            .clients
            .lock()
            .unwrap()
            .get(network_id)
            .cloned()
            .unwrap_or_default())
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

/// An in-memory DnsRecordStore that logs every mutation
pub struct MockRecordStore {
    records: Arc<Mutex<RecordSet>>,
    mutations: Arc<Mutex<Vec<String>>>,
    failing_domains: Arc<Mutex<HashSet<String>>>,
    failing_adds: Arc<Mutex<HashSet<String>>>,
    list_delay: Duration,
    list_fails: Arc<Mutex<bool>>,
    /// Store domains lowercased, the way Pi-hole reports them
    lowercase: bool,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(RecordSet::new())),
            mutations: Arc::new(Mutex::new(Vec::new())),
            failing_domains: Arc::new(Mutex::new(HashSet::new())),
            failing_adds: Arc::new(Mutex::new(HashSet::new())),
            list_delay: Duration::ZERO,
            list_fails: Arc::new(Mutex::new(false)),
            lowercase: false,
        }
    }

    /// Seed the store with records
    pub fn with_records(self, records: &[(&str, &str)]) -> Self {
        {
            let mut stored = self.records.lock().unwrap();
            for (domain, addr) in records {
                stored.insert(domain.to_string(), ip(addr));
            }
        }
        self
    }

    /// Delay list_records() to keep a pass in flight
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn lowercasing(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Make add/delete fail for one domain
    pub fn fail_domain(&self, domain: &str) {
        self.failing_domains.lock().unwrap().insert(domain.to_string());
    }

    /// Make only add fail for one domain
    pub fn fail_adds(&self, domain: &str) {
        self.failing_adds.lock().unwrap().insert(domain.to_string());
    }

    pub fn set_list_fails(&self, fails: bool) {
        *self.list_fails.lock().unwrap() = fails;
    }

    pub fn records(&self) -> RecordSet {
        self.records.lock().unwrap().clone()
    }

    /// Mutations in call order, formatted as "add|delete <domain> <ip>"
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn clear_mutations(&self) {
        self.mutations.lock().unwrap().clear();
    }

    /// Create a twin that shares records and the mutation log with `other`
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            records: Arc::clone(&other.records),
            mutations: Arc::clone(&other.mutations),
            failing_domains: Arc::clone(&other.failing_domains),
            failing_adds: Arc::clone(&other.failing_adds),
            list_delay: other.list_delay,
            list_fails: Arc::clone(&other.list_fails),
            lowercase: other.lowercase,
        }
    }

    fn check(&self, domain: &str) -> Result<()> {
        if self.failing_domains.lock().unwrap().contains(domain) {
            return Err(Error::mutation(domain, "rejected by mock store"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsRecordStore for MockRecordStore {
    async fn list_records(&self) -> Result<RecordSet> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if *self.list_fails.lock().unwrap() {
            return Err(Error::transient("mock", "503 Service Unavailable"));
        }
        Ok(self.records())
    }

    async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        self.mutations.lock().unwrap().push(format!("add {} {}", domain, ip));
        self.check(domain)?;
        if self.failing_adds.lock().unwrap().contains(domain) {
            return Err(Error::mutation(domain, "add rejected by mock store"));
        }
        let domain = if self.lowercase {
            domain.to_lowercase()
        } else {
            domain.to_string()
        };
        self.records.lock().unwrap().insert(domain, ip);
        Ok(())
    }

    async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        self.mutations.lock().unwrap().push(format!("delete {} {}", domain, ip));
        self.check(domain)?;
        let mut records = self.records.lock().unwrap();
        if records.get(domain) == Some(&ip) {
            records.remove(domain);
        }
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "mock"
    }
}

pub fn ip(addr: &str) -> IpAddr {
    addr.parse().expect("valid test address")
}

/// A client whose reservation is honoured
pub fn reserved(id: &str, name: &str, addr: &str) -> ClientRecord {
    ClientRecord::new(id).with_description(name).with_reserved_ip(addr)
}

/// Config with millisecond backoffs so retry tests stay fast
pub fn test_config() -> SyncConfig {
    SyncConfig::new(
        ClientSourceConfig::Meraki {
            api_key: "test-key".to_string(),
            base_url: None,
        },
        DnsStoreConfig::Pihole {
            url: "http://pi.hole".to_string(),
            password: None,
            dry_run: false,
        },
        "org-1",
        SUFFIX,
    )
    .with_engine(EngineConfig {
        max_fetch_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_secs: 1,
        ..EngineConfig::default()
    })
}
