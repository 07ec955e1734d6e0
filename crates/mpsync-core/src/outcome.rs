//! Per-pass summary

use crate::traits::RecordSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Kind of a store mutation that took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Updated,
    Deleted,
}

/// One store mutation that took effect during a pass
///
/// The old record of a replacement whose add failed is reported as
/// `Deleted`, since it is gone from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub action: ChangeAction,
    pub domain: String,
    /// Address the domain pointed at before the change
    pub old_ip: Option<IpAddr>,
    /// Address the domain points at after the change
    pub new_ip: Option<IpAddr>,
}

/// A record the pass could not bring into the desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Domain the operation targeted
    pub domain: String,
    /// Human-readable cause
    pub reason: String,
}

/// Aggregate result of one pass
///
/// This is the user-visible contract of a pass: counts, the changes that
/// took effect and failure reasons. Per-client skip reasons only exist in
/// debug logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// When the pass started
    pub started_at: DateTime<Utc>,
    /// When the pass finished
    pub finished_at: DateTime<Utc>,
    /// Records created
    pub added: usize,
    /// Records replaced with a new address
    pub updated: usize,
    /// Stale records removed
    pub deleted: usize,
    /// Records already correct
    pub unchanged: usize,
    /// Operations that failed
    pub failed: usize,
    /// Failure details, one per failed domain
    pub failures: Vec<SyncFailure>,
    /// Mutations that took effect, in execution order
    pub changes: Vec<AppliedChange>,
    /// Set when the pass was aborted before any mutation
    pub pass_error: Option<String>,
}

impl SyncOutcome {
    /// Start an empty outcome
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            added: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            failed: 0,
            failures: Vec::new(),
            changes: Vec::new(),
            pass_error: None,
        }
    }

    /// Outcome of a pass that stopped before mutating anything
    pub fn aborted(started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        let mut outcome = Self::started(started_at);
        outcome.pass_error = Some(error.into());
        outcome.finish()
    }

    /// Record a failed operation
    pub fn record_failure(&mut self, domain: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(SyncFailure {
            domain: domain.into(),
            reason: reason.into(),
        });
    }

    /// Record a successful add
    pub fn record_added(&mut self, domain: impl Into<String>, ip: IpAddr) {
        self.added += 1;
        self.changes.push(AppliedChange {
            action: ChangeAction::Added,
            domain: domain.into(),
            old_ip: None,
            new_ip: Some(ip),
        });
    }

    /// Record a successful replacement
    pub fn record_updated(&mut self, domain: impl Into<String>, old_ip: IpAddr, new_ip: IpAddr) {
        self.updated += 1;
        self.changes.push(AppliedChange {
            action: ChangeAction::Updated,
            domain: domain.into(),
            old_ip: Some(old_ip),
            new_ip: Some(new_ip),
        });
    }

    /// Record a removed record
    ///
    /// Only stale deletions count towards `deleted`; the removed half of a
    /// failed replacement is listed in `changes` without being counted.
    pub fn record_deleted(&mut self, domain: impl Into<String>, ip: IpAddr, stale: bool) {
        if stale {
            self.deleted += 1;
        }
        self.changes.push(AppliedChange {
            action: ChangeAction::Deleted,
            domain: domain.into(),
            old_ip: Some(ip),
            new_ip: None,
        });
    }

    /// Records the store holds after applying `changes` to `before`
    pub fn apply_to(&self, before: &RecordSet) -> RecordSet {
        let mut records = before.clone();
        for change in &self.changes {
            match change.new_ip {
                Some(ip) => records.insert(change.domain.clone(), ip),
                None => records.remove(&change.domain),
            };
        }
        records
    }

    /// Stamp the finish time
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Number of mutations that succeeded
    pub fn mutations(&self) -> usize {
        self.added + self.updated + self.deleted
    }

    /// Whether the pass ran to completion
    pub fn is_completed(&self) -> bool {
        self.pass_error.is_none()
    }

    /// Whether the pass completed without any failure
    pub fn is_clean(&self) -> bool {
        self.is_completed() && self.failed == 0
    }
}
