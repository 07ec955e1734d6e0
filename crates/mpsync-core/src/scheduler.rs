//! Pass scheduling
//!
//! Passes are serialized through a single async gate. Scheduled passes wait
//! for the gate; manual triggers are rejected while it is held. Shutdown is
//! only observed between passes.

use crate::error::{Error, Result};
use crate::outcome::SyncOutcome;
use crate::session::SyncSession;
use crate::state::PublishedState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Runs a session periodically
pub struct SyncScheduler {
    handle: SchedulerHandle,
}

/// Cloneable control surface for a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    session: Arc<SyncSession>,
    gate: Arc<Mutex<()>>,
    interval: Arc<watch::Sender<Duration>>,
}

impl SyncScheduler {
    /// Create a scheduler running `session` every `interval`
    pub fn new(session: Arc<SyncSession>, interval: Duration) -> Self {
        let (interval, _) = watch::channel(interval);
        Self {
            handle: SchedulerHandle {
                session,
                gate: Arc::new(Mutex::new(())),
                interval: Arc::new(interval),
            },
        }
    }

    /// Control handle
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run passes until `shutdown` resolves
    ///
    /// The first pass starts immediately. The next one is due one interval
    /// after the previous pass finished; changing the interval moves the
    /// pending deadline.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval_rx = self.handle.interval.subscribe();
        tokio::pin!(shutdown);

        info!(interval = ?*interval_rx.borrow(), "Scheduler started");

        loop {
            self.handle.run_queued().await;
            let finished = Instant::now();

            let wait = *interval_rx.borrow_and_update();
            let sleep = tokio::time::sleep_until(finished + wait);
            tokio::pin!(sleep);
            debug!(next_in = ?wait, "Waiting for next pass");

            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown signal received, scheduler stopped");
                        return;
                    }
                    _ = &mut sleep => break,
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            continue;
                        }
                        let wait = *interval_rx.borrow_and_update();
                        info!(interval = ?wait, "Sync interval changed");
                        sleep.as_mut().reset(finished + wait);
                    }
                }
            }
        }
    }
}

impl SchedulerHandle {
    /// Start a pass now
    ///
    /// # Errors
    ///
    /// [`Error::SyncInProgress`] when a pass currently holds the gate.
    pub fn trigger(&self) -> Result<JoinHandle<SyncOutcome>> {
        let guard = Arc::clone(&self.gate)
            .try_lock_owned()
            .map_err(|_| Error::SyncInProgress)?;
        let session = Arc::clone(&self.session);

        info!("Manual sync triggered");
        Ok(tokio::spawn(async move {
            let _guard = guard;
            session.run().await
        }))
    }

    /// Change the delay between passes
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a zero interval.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::config("sync interval must be greater than zero"));
        }
        self.interval.send_replace(interval);
        Ok(())
    }

    /// Current delay between passes
    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Whether a pass is in flight
    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Latest published state
    pub fn state(&self) -> Arc<PublishedState> {
        self.session.publisher().latest()
    }

    async fn run_queued(&self) -> SyncOutcome {
        let _guard = self.gate.lock().await;
        self.session.run().await
    }
}
