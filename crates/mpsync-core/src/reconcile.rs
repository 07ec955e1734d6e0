//! Reconciler
//!
//! Diffs desired against current DNS state and drives the record store until
//! they agree.
//!
//! ## Flow
//!
//! ```text
//! desired ─┐
//!          ├── plan() ──► Plan ──► Reconciler::execute() ──► SyncOutcome
//! current ─┘                          │
//!                                     ▼
//!                              DnsRecordStore
//!                      (deletions first, then changes)
//! ```
//!
//! Planning is pure. Execution attempts every operation on its own: a failing
//! call is recorded in the outcome and the remaining operations still run.

use crate::outcome::SyncOutcome;
use crate::snapshot::is_managed;
use crate::traits::{DnsRecordStore, RecordSet};
use chrono::Utc;
use serde::Serialize;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// A change to bring a desired record into place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Change {
    /// The domain has no record yet
    Add {
        /// Fully-qualified domain name
        domain: String,
        /// Target address
        ip: IpAddr,
    },
    /// The domain points elsewhere
    Replace {
        /// Fully-qualified domain name
        domain: String,
        /// Address currently stored
        old_ip: IpAddr,
        /// Target address
        new_ip: IpAddr,
    },
}

impl Change {
    /// Domain the change targets
    pub fn domain(&self) -> &str {
        match self {
            Change::Add { domain, .. } | Change::Replace { domain, .. } => domain,
        }
    }
}

/// Operations needed to converge one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Managed records with no desired counterpart, sorted by domain
    pub deletions: Vec<(String, IpAddr)>,
    /// Additions and replacements, sorted by domain
    pub changes: Vec<Change>,
    /// Domains already correct
    pub unchanged: Vec<String>,
}

impl Plan {
    /// Whether executing the plan would call the store at all
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty() && self.changes.is_empty()
    }

    /// Drop the stale-deletion phase
    pub fn without_deletions(mut self) -> Self {
        self.deletions.clear();
        self
    }

    /// Records the store holds once the plan ran with the given outcome
    ///
    /// Built from the mutations that took effect, so a replacement whose
    /// delete went through but whose add failed leaves the domain absent.
    pub fn project(&self, current: &RecordSet, outcome: &SyncOutcome) -> RecordSet {
        outcome.apply_to(current)
    }
}

/// Compute the operations that turn `current` into `desired`
///
/// Only domains under `suffix` are considered on either side, so a record
/// outside the managed namespace is never planned even if a caller passes it.
pub fn plan(desired: &RecordSet, current: &RecordSet, suffix: &str) -> Plan {
    let mut plan = Plan::default();

    for (domain, ip) in current {
        if is_managed(domain, suffix) && !desired.contains_key(domain) {
            plan.deletions.push((domain.clone(), *ip));
        }
    }

    for (domain, ip) in desired {
        if !is_managed(domain, suffix) {
            debug!(domain = %domain, suffix, "Ignoring desired record outside managed suffix");
            continue;
        }
        match current.get(domain) {
            None => plan.changes.push(Change::Add {
                domain: domain.clone(),
                ip: *ip,
            }),
            Some(existing) if existing != ip => plan.changes.push(Change::Replace {
                domain: domain.clone(),
                old_ip: *existing,
                new_ip: *ip,
            }),
            Some(_) => plan.unchanged.push(domain.clone()),
        }
    }

    plan
}

/// Applies a [`Plan`] to a record store
pub struct Reconciler<'a> {
    store: &'a dyn DnsRecordStore,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler bound to a store
    pub fn new(store: &'a dyn DnsRecordStore) -> Self {
        Self { store }
    }

    /// Execute a plan
    ///
    /// Stale deletions are fully attempted before any addition or
    /// replacement. A replacement whose delete fails does not attempt the add.
    pub async fn execute(&self, plan: &Plan) -> SyncOutcome {
        let mut outcome = SyncOutcome::started(Utc::now());
        outcome.unchanged = plan.unchanged.len();

        for (domain, ip) in &plan.deletions {
            match self.store.delete_record(domain, *ip).await {
                Ok(()) => {
                    info!(domain = %domain, ip = %ip, "Deleted stale record");
                    outcome.record_deleted(domain, *ip, true);
                }
                Err(e) => {
                    warn!(domain = %domain, ip = %ip, error = %e, "Failed to delete stale record");
                    outcome.record_failure(domain, e.to_string());
                }
            }
        }

        for change in &plan.changes {
            match change {
                Change::Add { domain, ip } => match self.store.add_record(domain, *ip).await {
                    Ok(()) => {
                        info!(domain = %domain, ip = %ip, "Added record");
                        outcome.record_added(domain, *ip);
                    }
                    Err(e) => {
                        warn!(domain = %domain, ip = %ip, error = %e, "Failed to add record");
                        outcome.record_failure(domain, e.to_string());
                    }
                },
                Change::Replace {
                    domain,
                    old_ip,
                    new_ip,
                } => {
                    if let Err(e) = self.store.delete_record(domain, *old_ip).await {
                        warn!(
                            domain = %domain,
                            old_ip = %old_ip,
                            error = %e,
                            "Failed to remove outdated record, leaving it in place"
                        );
                        outcome.record_failure(domain, format!("delete of {} failed: {}", old_ip, e));
                        continue;
                    }
                    match self.store.add_record(domain, *new_ip).await {
                        Ok(()) => {
                            info!(domain = %domain, old_ip = %old_ip, new_ip = %new_ip, "Updated record");
                            outcome.record_updated(domain, *old_ip, *new_ip);
                        }
                        Err(e) => {
                            warn!(
                                domain = %domain,
                                old_ip = %old_ip,
                                new_ip = %new_ip,
                                error = %e,
                                "Failed to add updated record, domain is left without a record"
                            );
                            outcome.record_deleted(domain, *old_ip, false);
                            outcome.record_failure(domain, format!("add of {} failed: {}", new_ip, e));
                        }
                    }
                }
            }
        }

        outcome.finish()
    }
}

/// Plan and execute in one step
pub async fn reconcile(
    store: &dyn DnsRecordStore,
    desired: &RecordSet,
    current: &RecordSet,
    suffix: &str,
) -> SyncOutcome {
    let plan = plan(desired, current, suffix);
    Reconciler::new(store).execute(&plan).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::outcome::{AppliedChange, ChangeAction};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn set(entries: &[(&str, &str)]) -> RecordSet {
        entries
            .iter()
            .map(|(d, a)| (d.to_string(), ip(a)))
            .collect()
    }

    /// In-memory store that logs calls and can fail chosen operations
    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<RecordSet>,
        calls: Mutex<Vec<String>>,
        failing_deletes: Vec<String>,
        failing_adds: Vec<String>,
    }

    #[async_trait]
    impl DnsRecordStore for RecordingStore {
        async fn list_records(&self) -> Result<RecordSet> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn add_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
            self.calls.lock().unwrap().push(format!("add {} {}", domain, ip));
            if self.failing_adds.iter().any(|d| d == domain) {
                return Err(Error::mutation(domain, "rejected"));
            }
            self.records.lock().unwrap().insert(domain.to_string(), ip);
            Ok(())
        }

        async fn delete_record(&self, domain: &str, ip: IpAddr) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {} {}", domain, ip));
            if self.failing_deletes.iter().any(|d| d == domain) {
                return Err(Error::mutation(domain, "rejected"));
            }
            self.records.lock().unwrap().remove(domain);
            Ok(())
        }

        fn store_name(&self) -> &'static str {
            "recording"
        }
    }

    #[test]
    fn plan_classifies_every_domain() {
        let desired = set(&[("nas.lan", "10.0.0.1"), ("printer.lan", "10.0.0.9"), ("tv.lan", "10.0.0.5")]);
        let current = set(&[("nas.lan", "10.0.0.1"), ("printer.lan", "10.0.0.2"), ("old.lan", "10.0.0.7")]);

        let plan = plan(&desired, &current, ".lan");

        assert_eq!(plan.deletions, vec![("old.lan".to_string(), ip("10.0.0.7"))]);
        assert_eq!(
            plan.changes,
            vec![
                Change::Replace {
                    domain: "printer.lan".to_string(),
                    old_ip: ip("10.0.0.2"),
                    new_ip: ip("10.0.0.9"),
                },
                Change::Add {
                    domain: "tv.lan".to_string(),
                    ip: ip("10.0.0.5"),
                },
            ]
        );
        assert_eq!(plan.unchanged, vec!["nas.lan".to_string()]);
    }

    #[test]
    fn plan_ignores_foreign_domains_on_both_sides() {
        let desired = set(&[("nas.home", "10.0.0.1")]);
        let current = set(&[("router.home", "10.0.0.254")]);

        let plan = plan(&desired, &current, ".lan");
        assert!(plan.is_noop());
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn empty_desired_plans_full_deletion() {
        let current = set(&[("a.lan", "10.0.0.1"), ("b.lan", "10.0.0.2")]);
        let plan = plan(&RecordSet::new(), &current, ".lan");
        assert_eq!(plan.deletions.len(), 2);
        assert!(plan.clone().without_deletions().is_noop());
    }

    #[tokio::test]
    async fn stale_record_is_deleted() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("old-device.lan", "10.0.0.9")])),
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();

        let outcome = reconcile(&store, &RecordSet::new(), &current, ".lan").await;

        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.mutations(), 1);
        assert_eq!(*store.calls.lock().unwrap(), vec!["delete old-device.lan 10.0.0.9"]);
    }

    #[tokio::test]
    async fn changed_address_is_replaced_delete_first() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("printer.lan", "10.0.0.2")])),
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();
        let desired = set(&[("printer.lan", "10.0.0.3")]);

        let outcome = reconcile(&store, &desired, &current, ".lan").await;

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.added, 0);
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec!["delete printer.lan 10.0.0.2", "add printer.lan 10.0.0.3"]
        );
        assert_eq!(store.list_records().await.unwrap(), desired);
    }

    #[tokio::test]
    async fn failed_delete_skips_the_add() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("printer.lan", "10.0.0.2")])),
            failing_deletes: vec!["printer.lan".to_string()],
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();

        let outcome = reconcile(&store, &set(&[("printer.lan", "10.0.0.3")]), &current, ".lan").await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(store.calls.lock().unwrap().len(), 1);
        assert_eq!(
            store.list_records().await.unwrap()["printer.lan"],
            ip("10.0.0.2")
        );
    }

    #[tokio::test]
    async fn deletions_run_before_changes() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("zz-old.lan", "10.0.0.50")])),
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();

        reconcile(&store, &set(&[("aa-new.lan", "10.0.0.1")]), &current, ".lan").await;

        let calls = store.calls.lock().unwrap();
        assert!(calls[0].starts_with("delete zz-old.lan"));
        assert!(calls[1].starts_with("add aa-new.lan"));
    }

    #[tokio::test]
    async fn projection_keeps_failed_domains_unchanged() {
        let store = RecordingStore {
            failing_adds: vec!["tv.lan".to_string()],
            ..Default::default()
        };
        let current = set(&[("old.lan", "10.0.0.7"), ("printer.lan", "10.0.0.2")]);
        *store.records.lock().unwrap() = current.clone();
        let desired = set(&[("printer.lan", "10.0.0.3"), ("tv.lan", "10.0.0.5")]);

        let plan = plan(&desired, &current, ".lan");
        let outcome = Reconciler::new(&store).execute(&plan).await;

        let projected = plan.project(&current, &outcome);
        assert_eq!(projected, store.list_records().await.unwrap());
        assert_eq!(projected, set(&[("printer.lan", "10.0.0.3")]));
    }

    #[tokio::test]
    async fn half_applied_replacement_leaves_domain_absent() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("printer.lan", "10.0.0.2")])),
            failing_adds: vec!["printer.lan".to_string()],
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();
        let plan = plan(&set(&[("printer.lan", "10.0.0.3")]), &current, ".lan");

        let outcome = Reconciler::new(&store).execute(&plan).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.deleted, 0);
        assert_eq!(
            outcome.changes,
            vec![AppliedChange {
                action: ChangeAction::Deleted,
                domain: "printer.lan".to_string(),
                old_ip: Some(ip("10.0.0.2")),
                new_ip: None,
            }]
        );
        let projected = plan.project(&current, &outcome);
        assert!(projected.is_empty());
        assert_eq!(projected, store.list_records().await.unwrap());
    }

    #[tokio::test]
    async fn applied_changes_describe_the_pass() {
        let store = RecordingStore {
            records: Mutex::new(set(&[("old.lan", "10.0.0.7"), ("printer.lan", "10.0.0.2")])),
            ..Default::default()
        };
        let current = store.list_records().await.unwrap();
        let desired = set(&[("printer.lan", "10.0.0.3"), ("tv.lan", "10.0.0.5")]);

        let outcome = reconcile(&store, &desired, &current, ".lan").await;

        let summary: Vec<_> = outcome
            .changes
            .iter()
            .map(|c| (c.action, c.domain.as_str(), c.old_ip, c.new_ip))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ChangeAction::Deleted, "old.lan", Some(ip("10.0.0.7")), None),
                (ChangeAction::Updated, "printer.lan", Some(ip("10.0.0.2")), Some(ip("10.0.0.3"))),
                (ChangeAction::Added, "tv.lan", None, Some(ip("10.0.0.5"))),
            ]
        );
    }

    #[tokio::test]
    async fn add_failure_does_not_stop_other_records() {
        let store = RecordingStore {
            failing_adds: vec!["b.lan".to_string()],
            ..Default::default()
        };
        let desired = set(&[("a.lan", "10.0.0.1"), ("b.lan", "10.0.0.2"), ("c.lan", "10.0.0.3")]);

        let outcome = reconcile(&store, &desired, &RecordSet::new(), ".lan").await;

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures[0].domain, "b.lan");
        assert!(outcome.is_completed());
    }
}
