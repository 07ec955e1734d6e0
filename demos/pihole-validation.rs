// # Pi-hole Record Store Real Environment Validation Tool
//
// Exercises the Pi-hole record store against a real Pi-hole v6 instance.
//
// ## Usage
//
// ```bash
// # Dry-run mode (default - safe)
// PIHOLE_API_URL=http://pi.hole \
// PIHOLE_API_KEY=app_password \
// MPSYNC_TEST_DOMAIN=mpsync-test.lan \
// MPSYNC_TEST_IP=10.0.0.250 \
// cargo run --bin pihole_validation
//
// # Live mode (adds, then removes the test record)
// MPSYNC_MODE=live ... cargo run --bin pihole_validation
// ```
//
// ## Environment Variables
//
// Required:
// - `PIHOLE_API_URL`: Pi-hole base URL
// - `MPSYNC_TEST_DOMAIN`: Record to create and remove
// - `MPSYNC_TEST_IP`: Address for the test record
//
// Optional:
// - `PIHOLE_API_KEY`: Web or application password
// - `MPSYNC_MODE`: "dry-run" or "live" (default: dry-run)

use mpsync_core::traits::DnsRecordStore;
use mpsync_sink_pihole::PiholeRecordStore;
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;

fn required(name: &str) -> Option<String> {
    let value = env::var(name).ok().filter(|v| !v.is_empty());
    if value.is_none() {
        tracing::error!("{} environment variable is required", name);
    }
    value
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("=== Pi-hole Record Store Validation ===");

    let (Some(url), Some(domain), Some(ip)) = (
        required("PIHOLE_API_URL"),
        required("MPSYNC_TEST_DOMAIN"),
        required("MPSYNC_TEST_IP"),
    ) else {
        return ExitCode::FAILURE;
    };
    let password = env::var("PIHOLE_API_KEY").ok();
    let domain = domain.to_lowercase();

    let test_ip: IpAddr = match ip.parse() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::error!("Invalid MPSYNC_TEST_IP '{}': {}", ip, e);
            return ExitCode::FAILURE;
        }
    };

    let dry_run = env::var("MPSYNC_MODE")
        .map(|m| m.to_lowercase() != "live")
        .unwrap_or(true);
    if dry_run {
        tracing::warn!("Running in DRY-RUN mode - no changes will be made");
    } else {
        tracing::warn!("Running in LIVE mode - will make actual DNS changes!");
    }

    tracing::info!("--- Step 1: Creating Pi-hole store ---");
    let store = match PiholeRecordStore::new(&url, password, dry_run) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to create store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Store created: {:?}", store);

    tracing::info!("--- Step 2: Listing records ---");
    let before = match store.list_records().await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("Listing records failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Pi-hole holds {} custom record(s)", before.len());
    if let Some(existing) = before.get(&domain) {
        tracing::error!("{} already exists ({}); pick an unused test domain", domain, existing);
        return ExitCode::FAILURE;
    }

    tracing::info!("--- Step 3: Adding {} -> {} ---", domain, test_ip);
    if let Err(e) = store.add_record(&domain, test_ip).await {
        tracing::error!("Add failed: {}", e);
        return ExitCode::FAILURE;
    }

    if !dry_run {
        match store.list_records().await {
            Ok(records) if records.get(&domain) == Some(&test_ip) => {
                tracing::info!("Record visible after add");
            }
            Ok(_) => tracing::warn!("Record not visible after add"),
            Err(e) => tracing::warn!("Re-listing failed: {}", e),
        }
    }

    tracing::info!("--- Step 4: Deleting {} ---", domain);
    if let Err(e) = store.delete_record(&domain, test_ip).await {
        tracing::error!("Delete failed: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!("--- Step 5: Deleting again (already absent) ---");
    if let Err(e) = store.delete_record(&domain, test_ip).await {
        tracing::error!("Second delete should succeed: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!("=== Validation Summary ===");
    tracing::info!("Login and listing: OK");
    tracing::info!("Add and delete: OK");
    tracing::info!("Password not logged");
    if dry_run {
        tracing::info!("No changes were made. Set MPSYNC_MODE=live to apply them.");
    }

    ExitCode::SUCCESS
}
