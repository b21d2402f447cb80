//! Sync orchestration.
//!
//! Sequences one full cycle: pull a remote snapshot, reconcile, upload new
//! items, maintain the priority-group ladder, apply allocation moves, and
//! commit local state only after the remote confirmed each step. One item or
//! group at a time; individual failures are reported, never fatal to the
//! cycle.

use serde_json::Value;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::instrument;

use crate::catalog::{CatalogClient, FINGERPRINT_METADATA_KEY, Scope};
use crate::config::StampsyncConfig;
use crate::models::{Group, Item, MembershipChange, priority_group_name};
use crate::services::{AllocationEngine, ReconciliationEngine};
use crate::storage::{LocalStore, META_BUCKET_COUNT};
use crate::{Error, Result};

/// What a cycle is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Push-only: upload new items, touch nothing that already exists.
    Upload,
    /// Full bidirectional repair.
    Sync,
}

impl SyncMode {
    const fn label(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Sync => "sync",
        }
    }
}

/// A failure affecting a single item or group, recorded without aborting the
/// cycle.
#[derive(Debug)]
pub struct SyncFailure {
    /// Identifier of the affected entity.
    pub entity: String,
    /// What went wrong.
    pub error: String,
}

/// Outcome of one cycle. Always produced; nothing is silently dropped.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Items created remotely.
    pub uploaded: usize,
    /// Items bound to a pre-existing remote twin instead of re-uploaded.
    pub bound: usize,
    /// Items whose lost remote placement was restored.
    pub relinked: usize,
    /// Items whose remote placement was adopted locally.
    pub adopted: usize,
    /// Items moved between groups by allocation.
    pub moved: usize,
    /// Items newly marked retired.
    pub retired: usize,
    /// Items unassigned because their group vanished remotely.
    pub unassigned: usize,
    /// Priority groups created remotely.
    pub groups_created: usize,
    /// Remote groups adopted into the local store.
    pub groups_adopted: usize,
    /// Local groups marked abandoned.
    pub groups_abandoned: usize,
    /// Surplus groups unlinked from the workflow.
    pub groups_unlinked: usize,
    /// Weights pushed to the workflow.
    pub weights_pushed: usize,
    /// Items left alone deliberately.
    pub skipped: usize,
    /// Per-entity failures, deferred to the next cycle.
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Records a per-entity failure.
    pub fn record_failure(&mut self, entity: &str, error: &Error) {
        self.failures.push(SyncFailure {
            entity: entity.to_string(),
            error: error.to_string(),
        });
    }

    /// True when no per-entity failure occurred.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "uploaded {}, bound {}, moved {}, relinked {}, adopted {}, retired {}, \
             unassigned {}, groups +{}/~{}/-{}, unlinked {}, weights {}, skipped {}",
            self.uploaded,
            self.bound,
            self.moved,
            self.relinked,
            self.adopted,
            self.retired,
            self.unassigned,
            self.groups_created,
            self.groups_adopted,
            self.groups_abandoned,
            self.groups_unlinked,
            self.weights_pushed,
            self.skipped,
        );
        if self.failures.is_empty() {
            out.push_str(", no failures");
        } else {
            let _ = write!(out, ", {} failures:", self.failures.len());
            for failure in &self.failures {
                let _ = write!(out, "\n  {}: {}", failure.entity, failure.error);
            }
        }
        out
    }
}

/// Sequences sync cycles over a store and a catalog.
pub struct SyncOrchestrator<'a> {
    store: &'a LocalStore,
    catalog: &'a dyn CatalogClient,
    config: &'a StampsyncConfig,
}

impl<'a> SyncOrchestrator<'a> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        store: &'a LocalStore,
        catalog: &'a dyn CatalogClient,
        config: &'a StampsyncConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Runs one cycle.
    ///
    /// `scope` narrows the remote item snapshot used for reconciliation;
    /// duplicate checks before upload always run at project scope.
    ///
    /// # Errors
    ///
    /// Returns an error only for cycle-level failures (an unreachable
    /// snapshot listing, a broken store). Per-item failures land in the
    /// report.
    #[instrument(skip(self), fields(mode = mode.label()))]
    pub fn run(&self, mode: SyncMode, scope: Scope) -> Result<SyncReport> {
        let start = Instant::now();
        let result = (|| {
            let mut report = SyncReport::default();
            match mode {
                SyncMode::Upload => {
                    self.upload_new(&mut report)?;
                },
                SyncMode::Sync => {
                    let reconciler =
                        ReconciliationEngine::new(self.store, self.catalog, self.config);
                    reconciler.reconcile_groups(&mut report)?;
                    reconciler.reconcile_items(scope, &mut report)?;
                    self.upload_new(&mut report)?;
                    let ladder = self.ensure_ladder(&mut report)?;
                    self.apply_allocation(&ladder, &mut report)?;
                    self.store
                        .meta_set(META_BUCKET_COUNT, &self.config.num_priority_groups.to_string())?;
                },
            }
            tracing::info!(summary = %report.summary(), "cycle complete");
            Ok(report)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!(
            "stampsync_cycles_total",
            "mode" => mode.label(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("stampsync_cycle_duration_ms", "mode" => mode.label())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    /// Validates and pushes selection weights for the whole ladder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] when the configured weights do
    /// not validate; nothing is pushed partially.
    #[instrument(skip(self))]
    pub fn push_weights(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let ladder = self.ensure_ladder(&mut report)?;
        let engine = AllocationEngine::new(self.config.workflow_id, self.config.num_priority_groups);
        let changes = engine.assign_weights(&ladder, &self.config.selection_weights)?;

        let pairs: Vec<_> = changes
            .iter()
            .map(|c| (c.remote_group_id, c.weight))
            .collect();
        self.with_retry("set_group_weights", || {
            self.catalog
                .set_group_weights(self.config.workflow_id, &pairs)
        })?;
        for change in &changes {
            self.store.set_group_weight(&change.group_id, change.weight)?;
        }
        report.weights_pushed = changes.len();
        tracing::info!(count = changes.len(), "selection weights pushed");
        Ok(report)
    }

    /// Uploads never-uploaded items, binding to remote twins instead of
    /// creating duplicates.
    fn upload_new(&self, report: &mut SyncReport) -> Result<()> {
        for item in self.store.unuploaded_items()? {
            if let Err(err) = self.upload_item(&item, report) {
                tracing::warn!(item = %item.id, error = %err, "upload failed");
                report.record_failure(item.id.as_str(), &err);
            }
        }
        Ok(())
    }

    fn upload_item(&self, item: &Item, report: &mut SyncReport) -> Result<()> {
        // Project-wide duplicate check: an unassigned remote twin can exist
        // that no narrowed listing would show.
        let existing = self.with_retry("find_item", || self.catalog.find_item(&item.fingerprint))?;
        if let Some(remote) = existing {
            self.store.set_remote_id(&item.id, remote.id)?;
            report.bound += 1;
            tracing::info!(item = %item.id, remote_id = remote.id, "bound instead of re-uploading");
            return Ok(());
        }

        let mut metadata = item.metadata.clone();
        metadata.insert(
            FINGERPRINT_METADATA_KEY.to_string(),
            Value::String(item.fingerprint.clone()),
        );
        let created =
            self.with_retry("create_item", || self.catalog.create_item(&metadata, &item.location))?;
        self.store.set_remote_id(&item.id, created.id)?;
        report.uploaded += 1;
        tracing::info!(item = %item.id, remote_id = created.id, "uploaded");

        if let Some(default_group) = self.config.default_group_id {
            self.with_retry("add_items_to_group", || {
                self.catalog.add_items_to_group(default_group, &[created.id])
            })?;
        }
        Ok(())
    }

    /// Brings the priority-group ladder up to the configured size and
    /// unlinks surplus groups when the size shrank.
    fn ensure_ladder(&self, report: &mut SyncReport) -> Result<Vec<Group>> {
        let workflow = self.config.workflow_id;
        let engine = AllocationEngine::new(workflow, self.config.num_priority_groups);
        let ladder = self.store.priority_groups(workflow)?;
        let plan = engine.plan_ladder(&ladder);

        for rank in plan.missing_ranks {
            let name = priority_group_name(workflow, rank);
            let remote = self.with_retry("find_group", || {
                self.catalog
                    .find_group(&name, Scope::Project(self.config.project_id))
            })?;
            let remote = match remote {
                Some(found) => {
                    report.groups_adopted += 1;
                    found
                },
                None => {
                    let created =
                        self.with_retry("create_group", || self.catalog.create_group(&name))?;
                    report.groups_created += 1;
                    created
                },
            };
            self.with_retry("link_group_to_workflow", || {
                self.catalog.link_group_to_workflow(workflow, remote.id)
            })?;
            // A previously unlinked surplus group may still hold this remote
            // id locally; relink it instead of inserting a duplicate.
            if let Some(existing) = self.store.group_by_remote_id(remote.id)? {
                self.store.set_group_workflow(&existing.id, Some(workflow))?;
                tracing::info!(group = %existing.display_name, remote_id = remote.id, "ladder group relinked");
            } else {
                let mut group = Group::priority(workflow, rank);
                group.remote_id = Some(remote.id);
                self.store.insert_group(&group)?;
                tracing::info!(group = %group.display_name, remote_id = remote.id, "ladder group ready");
            }
        }

        let surplus_remote: Vec<_> = plan.surplus.iter().filter_map(|g| g.remote_id).collect();
        if !surplus_remote.is_empty() {
            self.with_retry("unlink_groups_from_workflow", || {
                self.catalog
                    .unlink_groups_from_workflow(workflow, &surplus_remote)
            })?;
        }
        for group in &plan.surplus {
            self.store.set_group_workflow(&group.id, None)?;
            report.groups_unlinked += 1;
            tracing::info!(group = %group.display_name, "surplus group unlinked");
        }

        self.store.priority_groups(workflow)
    }

    fn apply_allocation(&self, ladder: &[Group], report: &mut SyncReport) -> Result<()> {
        let engine =
            AllocationEngine::new(self.config.workflow_id, self.config.num_priority_groups);
        let previous = self.store.meta_get(META_BUCKET_COUNT)?;
        let current = self.config.num_priority_groups.to_string();
        let force = previous.is_some() && previous.as_deref() != Some(current.as_str());
        if force {
            tracing::info!(
                previous = previous.as_deref().unwrap_or(""),
                current = %current,
                "bucket count changed, full reallocation"
            );
        }

        let items = self.store.allocatable_items()?;
        let plan = engine.plan_memberships(&items, ladder, force)?;
        report.skipped += plan.unscored;
        for change in &plan.changes {
            if let Err(err) = self.apply_move(change, report) {
                tracing::warn!(item = %change.item_id, error = %err, "move failed");
                report.record_failure(change.item_id.as_str(), &err);
            }
        }
        Ok(())
    }

    /// Applies one membership move with the invariant-preserving ordering:
    /// remote remove, durable local unassign, remote add, local assign. A
    /// crash between steps leaves the item unassigned, never doubly
    /// assigned.
    fn apply_move(&self, change: &MembershipChange, report: &mut SyncReport) -> Result<()> {
        let item = self.store.item(&change.item_id)?.ok_or_else(|| {
            Error::InvariantViolation(format!("planned move for unknown item {}", change.item_id))
        })?;
        let Some(remote_item_id) = item.remote_id else {
            // Not uploaded yet; placement happens on a later cycle.
            report.skipped += 1;
            return Ok(());
        };

        if let Some(from) = &change.from {
            if let Some(old) = self.store.group(from)? {
                if let Some(old_remote) = old.remote_id {
                    self.with_retry("remove_items_from_group", || {
                        self.catalog
                            .remove_items_from_group(old_remote, &[remote_item_id])
                    })?;
                }
            }
            self.store
                .set_membership_cas(&change.item_id, Some(from), None)?;
            self.store.set_allocated_bucket(&change.item_id, None)?;
        }

        let target = self.store.group(&change.to)?.ok_or_else(|| {
            Error::InvariantViolation(format!("planned move into unknown group {}", change.to))
        })?;
        let target_remote = target.remote_id.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "group '{}' has no remote counterpart",
                target.display_name
            ))
        })?;
        self.with_retry("add_items_to_group", || {
            self.catalog
                .add_items_to_group(target_remote, &[remote_item_id])
        })?;
        self.store
            .set_membership_cas(&change.item_id, None, Some(&change.to))?;
        self.store
            .set_allocated_bucket(&change.item_id, Some(change.bucket))?;
        report.moved += 1;
        Ok(())
    }

    /// Retries a remote call on transient failures with linear backoff.
    /// Exhausted retries surface the last error to the caller, which defers
    /// the affected entity to the next cycle.
    fn with_retry<T>(&self, operation: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.config.retry_attempts.max(1) => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff,
                        error = %err,
                        "transient remote failure, retrying"
                    );
                    std::thread::sleep(Duration::from_millis(backoff));
                },
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    fn config() -> StampsyncConfig {
        StampsyncConfig {
            project_id: 9000,
            workflow_id: 4051,
            retry_backoff_ms: 0,
            ..StampsyncConfig::default()
        }
    }

    fn setup() -> (LocalStore, MemoryCatalog, StampsyncConfig) {
        (
            LocalStore::open_in_memory().unwrap(),
            MemoryCatalog::new(),
            config(),
        )
    }

    #[test]
    fn test_upload_mode_creates_and_binds() {
        let (store, catalog, config) = setup();
        let twin = catalog.seed_item(Some("fp-dup"), &[]);
        let fresh = Item::new("fp-new", "https://stamps.example/1.png");
        let duplicate = Item::new("fp-dup", "https://stamps.example/2.png");
        store.insert_item(&fresh).unwrap();
        store.insert_item(&duplicate).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Upload, Scope::Project(9000))
            .unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.bound, 1);
        assert!(report.is_clean());
        assert_eq!(store.item(&duplicate.id).unwrap().unwrap().remote_id, Some(twin));
        assert!(store.item(&fresh.id).unwrap().unwrap().remote_id.is_some());
        // the duplicate never became a second remote item
        assert_eq!(catalog.items().len(), 2);
    }

    #[test]
    fn test_sync_builds_ladder_and_allocates() {
        let (store, catalog, config) = setup();
        let low = Item::new("fp-low", "a").with_confidence(0.1);
        let high = Item::new("fp-high", "b").with_confidence(0.95);
        store.insert_item(&low).unwrap();
        store.insert_item(&high).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Sync, Scope::Project(9000))
            .unwrap();

        assert_eq!(report.groups_created, 3);
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.moved, 2);
        assert!(report.is_clean());

        let ladder = store.priority_groups(4051).unwrap();
        assert_eq!(ladder.len(), 3);
        let low_row = store.item(&low.id).unwrap().unwrap();
        assert_eq!(low_row.group_id, Some(ladder[0].id.clone()));
        assert_eq!(low_row.allocated_bucket, Some(0));
        let high_row = store.item(&high.id).unwrap().unwrap();
        assert_eq!(high_row.group_id, Some(ladder[2].id.clone()));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (store, catalog, config) = setup();
        let item = Item::new("fp-1", "a").with_confidence(0.5);
        store.insert_item(&item).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        orchestrator.run(SyncMode::Sync, Scope::Project(9000)).unwrap();
        let mutations = catalog.mutation_count();

        let report = orchestrator
            .run(SyncMode::Sync, Scope::Project(9000))
            .unwrap();
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.moved, 0);
        assert!(report.is_clean());
        assert_eq!(catalog.mutation_count(), mutations);
    }

    #[test]
    fn test_transient_failure_retried() {
        let (store, catalog, config) = setup();
        catalog.inject_transient("create_item", 2);
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Upload, Scope::Project(9000))
            .unwrap();
        assert_eq!(report.uploaded, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_exhausted_retries_deferred_not_fatal() {
        let (store, catalog, config) = setup();
        // three injected failures exhaust the retry budget for the first
        // item only
        catalog.inject_transient("create_item", 3);
        let failing = Item::new("fp-1", "a");
        let healthy = Item::new("fp-2", "b");
        store.insert_item(&failing).unwrap();
        store.insert_item(&healthy).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Upload, Scope::Project(9000))
            .unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, failing.id.as_str());
    }

    #[test]
    fn test_push_weights_records_locally() {
        let (store, catalog, config) = setup();
        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator.push_weights().unwrap();
        assert_eq!(report.weights_pushed, 3);

        let ladder = store.priority_groups(4051).unwrap();
        assert_eq!(ladder[0].weight, Some(0.75));
        assert_eq!(ladder[1].weight, Some(0.125));
    }

    #[test]
    fn test_shrinking_ladder_unlinks_surplus() {
        let (store, catalog, mut config) = setup();
        let item = Item::new("fp-1", "a").with_confidence(0.9);
        store.insert_item(&item).unwrap();

        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        orchestrator.run(SyncMode::Sync, Scope::Project(9000)).unwrap();
        assert_eq!(store.priority_groups(4051).unwrap().len(), 3);

        config.num_priority_groups = 2;
        config.selection_weights = vec![0.8, 0.2];
        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Sync, Scope::Project(9000))
            .unwrap();

        assert_eq!(report.groups_unlinked, 1);
        let ladder = store.priority_groups(4051).unwrap();
        assert_eq!(ladder.len(), 2);
        // 0.9 now lands in bucket 1 of 2
        let row = store.item(&item.id).unwrap().unwrap();
        assert_eq!(row.allocated_bucket, Some(1));
        assert_eq!(row.group_id, Some(ladder[1].id.clone()));
    }

    #[test]
    fn test_regrown_ladder_relinks_unlinked_group() {
        let (store, catalog, mut config) = setup();
        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        orchestrator.run(SyncMode::Sync, Scope::Project(9000)).unwrap();
        let original = store.priority_groups(4051).unwrap();

        config.num_priority_groups = 2;
        config.selection_weights = vec![0.8, 0.2];
        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        orchestrator.run(SyncMode::Sync, Scope::Project(9000)).unwrap();

        config.num_priority_groups = 3;
        config.selection_weights = vec![0.75, 0.125, 0.125];
        let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
        let report = orchestrator
            .run(SyncMode::Sync, Scope::Project(9000))
            .unwrap();

        assert!(report.is_clean(), "{}", report.summary());
        // the rank-3 group came back as the same local and remote row
        let regrown = store.priority_groups(4051).unwrap();
        assert_eq!(regrown.len(), 3);
        assert_eq!(regrown[2].id, original[2].id);
        assert_eq!(regrown[2].remote_id, original[2].remote_id);
    }

    #[test]
    fn test_report_summary_mentions_failures() {
        let mut report = SyncReport::default();
        assert!(report.summary().contains("no failures"));
        report.record_failure(
            "item-1",
            &Error::InvariantViolation("doubly grouped".to_string()),
        );
        let summary = report.summary();
        assert!(summary.contains("1 failures"));
        assert!(summary.contains("item-1"));
    }
}
