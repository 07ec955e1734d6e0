//! Bounded retry for transient upstream failures
//!
//! Retry lives at the collaborator boundary: [`RetryingClientSource`] and
//! [`RetryingRecordStore`] wrap the real collaborators so the diff logic
//! never sees a transient error it could have outlived. Only reads are
//! retried. Mutations are passed through once; the reconciler isolates their
//! failures instead.

use crate::error::Result;
use crate::traits::{ClientRecord, ClientSource, DnsRecordStore, Network, RecordSet};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Backoff multiplier between attempts
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter applied to each delay (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// How often and how patiently to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay, `Retry-After` included
    pub max_backoff: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Relative jitter, 0.0 disables it
    pub jitter: f64,
}

impl RetryPolicy {
    /// Create a policy with the default multiplier and jitter
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            multiplier: BACKOFF_MULTIPLIER,
            jitter: RANDOMIZATION_FACTOR,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Start a backoff sequence for one operation
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: self.multiplier,
            randomization_factor: self.jitter,
        }
    }
}

/// Exponential backoff with randomized jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl ExponentialBackoff {
    /// Next delay, then grow the interval up to the cap
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval.min(self.max_interval);
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 || interval.is_zero() {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;

        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range((secs - delta)..=(secs + delta));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// Only errors for which [`crate::Error::is_transient`] holds are retried. A
/// `Retry-After` hint replaces the computed delay, capped at
/// `policy.max_backoff`.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                error!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "Retries exhausted, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let computed = backoff.next_backoff();
                let delay = e
                    .retry_after()
                    .map(|hint| hint.min(policy.max_backoff))
                    .unwrap_or(computed);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    retry_in = ?delay,
                    error = %e,
                    "Transient upstream error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// [`ClientSource`] decorator retrying both reads
pub struct RetryingClientSource {
    inner: Box<dyn ClientSource>,
    policy: RetryPolicy,
}

impl RetryingClientSource {
    /// Wrap a source
    pub fn new(inner: Box<dyn ClientSource>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ClientSource for RetryingClientSource {
    async fn list_networks(&self, org_id: &str) -> Result<Vec<Network>> {
        retry_transient(&self.policy, "list_networks", || {
            self.inner.list_networks(org_id)
        })
        .await
    }

    async fn list_clients(&self, network_id: &str, timespan_secs: u64) -> Result<Vec<ClientRecord>> {
        retry_transient(&self.policy, "list_clients", || {
            self.inner.list_clients(network_id, timespan_secs)
        })
        .await
    }

    fn source_name(&self) -> &'static str {
        self.inner.source_name()
    }
}

/// [`DnsRecordStore`] decorator retrying `list_records`
pub struct RetryingRecordStore {
    inner: Box<dyn DnsRecordStore>,
    policy: RetryPolicy,
}

impl RetryingRecordStore {
    /// Wrap a store
    pub fn new(inner: Box<dyn DnsRecordStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl DnsRecordStore for RetryingRecordStore {
    async fn list_records(&self) -> Result<RecordSet> {
        retry_transient(&self.policy, "list_records", || self.inner.list_records()).await
    }

    async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        self.inner.add_record(domain, ip).await
    }

    async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
        self.inner.delete_record(domain, ip).await
    }

    fn store_name(&self) -> &'static str {
        self.inner.store_name()
    }
}
