//! Minimal embedding example for mpsync-core
//!
//! The application supplies its own client source and record store, runs a
//! pass directly, then drives further passes through a scheduler handle.

use mpsync_core::traits::{ClientRecord, ClientSource, DnsRecordStore, Network, RecordSet};
use mpsync_core::{ClientSourceConfig, DnsStoreConfig, Result, SyncConfig, SyncScheduler, SyncSession};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Inventory kept by the application itself
struct InventorySource {
    clients: Arc<Mutex<Vec<ClientRecord>>>,
}

#[async_trait::async_trait]
impl ClientSource for InventorySource {
    async fn list_networks(&self, _org_id: &str) -> Result<Vec<Network>> {
        Ok(vec![Network::new("lab", "Lab")])
    }

    async fn list_clients(&self, _network_id: &str, _timespan_secs: u64) -> Result<Vec<ClientRecord>> {
        Ok(self.clients.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "inventory"
    }
}

/// Record store printing every mutation
#[derive(Default)]
struct PrintingStore {
    records: Mutex<RecordSet>,
}

#[async_trait::async_trait]
impl DnsRecordStore for PrintingStore {
    async fn list_records(&self) -> Result<RecordSet> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        println!("[Embedded] add {} -> {}", domain, ip);
        self.records.lock().unwrap().insert(domain.to_string(), ip);
        Ok(())
    }

    async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        println!("[Embedded] delete {} -> {}", domain, ip);
        self.records.lock().unwrap().remove(domain);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "printing"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded mpsync-core Example ===\n");

    let clients = Arc::new(Mutex::new(vec![
        ClientRecord::new("c1")
            .with_description("Lab Printer")
            .with_reserved_ip("10.0.0.2"),
        ClientRecord::new("c2")
            .with_hostname_hint("build-box")
            .with_reserved_ip("10.0.0.3"),
        ClientRecord::new("c3")
            .with_description("Laptop")
            .with_observed_ip("10.0.0.99"),
    ]));

    let source = InventorySource {
        clients: Arc::clone(&clients),
    };
    let store = PrintingStore::default();
    store
        .records
        .lock()
        .unwrap()
        .insert("router.home".to_string(), IpAddr::from([10, 0, 0, 1]));

    // The collaborator configs are only validated; the session uses the
    // instances passed in.
    let config = SyncConfig::new(
        ClientSourceConfig::Custom {
            factory: "inventory".to_string(),
            config: serde_json::json!({}),
        },
        DnsStoreConfig::Custom {
            factory: "printing".to_string(),
            config: serde_json::json!({}),
        },
        "embedded",
        ".lab",
    );

    println!("1. Running a pass directly...");
    let session = Arc::new(SyncSession::new(Box::new(source), Box::new(store), &config)?);
    let outcome = session.run().await;
    println!(
        "   added={} updated={} deleted={} unchanged={}\n",
        outcome.added, outcome.updated, outcome.deleted, outcome.unchanged
    );

    println!("2. Moving the printer and triggering a pass...");
    clients.lock().unwrap()[0] = ClientRecord::new("c1")
        .with_description("Lab Printer")
        .with_reserved_ip("10.0.0.20");

    let scheduler = SyncScheduler::new(Arc::clone(&session), Duration::from_secs(3600));
    let handle = scheduler.handle();
    let outcome = handle.trigger()?.await.map_err(|e| mpsync_core::Error::Other(e.to_string()))?;
    println!("   updated={} failed={}\n", outcome.updated, outcome.failed);

    println!("3. Published mappings:");
    if let Some(snapshot) = handle.state().last_snapshot.as_ref() {
        for device in &snapshot.mapped {
            println!("   {} ({}) -> {}", device.domain, device.client_name, device.ip);
        }
        for client in &snapshot.unsynced {
            println!("   unsynced: {:?}", client);
        }
    }

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Passes are run by the application, no daemon involved");
    println!("- Records outside the suffix (router.home) are never touched");
    println!("- Laptop has no fixed IP and is skipped");

    Ok(())
}
