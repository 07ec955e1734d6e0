// # mpsyncd - Meraki to Pi-hole Sync Daemon
//
// Thin integration layer: reads configuration from the environment, wires
// the registered collaborators into a sync session, then either runs one
// pass or keeps the scheduler and the status API alive until a shutdown
// signal arrives. All sync logic lives in mpsync-core.
//
// ## Configuration
//
// ### Meraki
// - `MERAKI_API_KEY`: Dashboard API key (required)
// - `MERAKI_ORG_ID`: Organization ID (required)
// - `MERAKI_NETWORK_IDS`: Comma-separated network IDs (default: all networks)
// - `MERAKI_CLIENT_TIMESPAN_SECONDS`: Client look-back window (default: 86400)
// - `MERAKI_API_BASE_URL`: API base URL override
//
// ### Pi-hole
// - `PIHOLE_API_URL`: Pi-hole base URL (required)
// - `PIHOLE_API_KEY`: Web or application password
//
// ### Sync
// - `HOSTNAME_SUFFIX`: Suffix of every managed record, e.g. `.lan` (required)
// - `SYNC_INTERVAL_SECONDS`: Delay between passes (default: 300)
// - `MPSYNC_MODE`: `live` (default) or `dry-run`
// - `MPSYNC_RUN_ONCE`: Run a single pass and exit
// - `MPSYNC_PURGE_ON_EMPTY`: Let a pass with no eligible client delete every managed record
// - `MPSYNC_MAX_FETCH_ATTEMPTS`: Attempts per upstream read (default: 4)
// - `MPSYNC_HISTORY_CAPACITY`: Outcomes kept for `/api/history` (default: 50)
//
// ### Daemon
// - `MPSYNC_HTTP_ADDR`: Status API address (default: `0.0.0.0:8080`, `off` disables)
// - `LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export MERAKI_API_KEY=your_key
// export MERAKI_ORG_ID=123456
// export PIHOLE_API_URL=http://pi.hole
// export PIHOLE_API_KEY=app_password
// export HOSTNAME_SUFFIX=.lan
//
// mpsyncd
// ```

mod api;
mod settings;

use anyhow::{Context, Result};
use mpsync_core::{Registry, SyncScheduler, SyncSession};
use settings::DaemonConfig;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown, or a completed single pass
/// - 1: Configuration or startup error
/// - 2: Runtime error, or an aborted single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<MpsyncExitCode> for ExitCode {
    fn from(code: MpsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return MpsyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MpsyncExitCode::ConfigError.into();
    }

    for warning in &config.warnings {
        warn!("{}", warning);
    }

    info!("Starting mpsyncd daemon");
    info!(
        org_id = %config.sync.org_id,
        suffix = %config.sync.hostname_suffix,
        networks = config.sync.network_ids.len(),
        "Configuration loaded"
    );

    let session = match build_session(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return MpsyncExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MpsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config, session).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                MpsyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Create the collaborators from the registry and wrap them in a session
fn build_session(config: &DaemonConfig) -> Result<Arc<SyncSession>> {
    let registry = Registry::new();

    #[cfg(feature = "meraki")]
    mpsync_source_meraki::register(&registry);

    #[cfg(feature = "pihole")]
    mpsync_sink_pihole::register(&registry);

    let source = registry
        .create_source(&config.sync.source)
        .context("Failed to create client source")?;
    let store = registry
        .create_store(&config.sync.store)
        .context("Failed to create DNS record store")?;

    info!(
        source = source.source_name(),
        store = store.store_name(),
        "Collaborators created"
    );

    Ok(Arc::new(SyncSession::new(source, store, &config.sync)?))
}

/// Run one pass, or the scheduler and API until shutdown
async fn run_daemon(config: DaemonConfig, session: Arc<SyncSession>) -> Result<MpsyncExitCode> {
    if config.run_once {
        info!("Running a single sync pass");
        let outcome = session.run().await;
        return Ok(if outcome.is_completed() {
            MpsyncExitCode::CleanShutdown
        } else {
            MpsyncExitCode::RuntimeError
        });
    }

    let scheduler = SyncScheduler::new(session, config.sync.engine.sync_interval());
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal error: {}", e),
        }
        stop_tx.send_replace(true);
    });

    let server = match config.http_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind status API on {}", addr))?;
            info!("Status API listening on {}", addr);

            let app = api::router(scheduler.handle());
            let stop = stopped(stop_rx.clone());
            Some(tokio::spawn(async move {
                axum::serve(listener, app).with_graceful_shutdown(stop).await
            }))
        }
        None => None,
    };

    scheduler.run(stopped(stop_rx)).await;

    if let Some(server) = server {
        server
            .await
            .context("Status API task failed")?
            .context("Status API server error")?;
    }

    info!("Shutting down daemon");
    Ok(MpsyncExitCode::CleanShutdown)
}

/// Resolve once the shutdown flag is raised
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
