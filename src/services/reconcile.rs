//! Bidirectional reconciliation.
//!
//! Repairs drift between the local store and the remote catalog. The remote
//! catalog can be mutated out-of-band at any time, so reconciliation treats
//! the remote placement of an item as authoritative and the local record as
//! the thing to repair, except where the remote has plainly lost state (an
//! item standing in no group while the local record knows its group).
//!
//! Per-item failures never abort the batch; they are logged and accumulated
//! in the [`SyncReport`].

use std::collections::HashMap;
use tracing::instrument;

use crate::catalog::{CatalogClient, RemoteGroup, RemoteItem, Scope};
use crate::config::StampsyncConfig;
use crate::models::{
    Group, Item, RemoteItemId, RemoteProjectId, RemoteWorkflowId, parse_priority_name,
};
use crate::services::SyncReport;
use crate::storage::LocalStore;
use crate::{Error, Result};

/// Repairs drift between the local store and the remote catalog.
pub struct ReconciliationEngine<'a> {
    store: &'a LocalStore,
    catalog: &'a dyn CatalogClient,
    project_id: RemoteProjectId,
    workflow_id: RemoteWorkflowId,
}

impl<'a> ReconciliationEngine<'a> {
    /// Creates a reconciliation engine over the given store and catalog.
    #[must_use]
    pub fn new(
        store: &'a LocalStore,
        catalog: &'a dyn CatalogClient,
        config: &StampsyncConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            project_id: config.project_id,
            workflow_id: config.workflow_id,
        }
    }

    /// Reconciles group state against the remote catalog.
    ///
    /// Local groups whose remote counterpart has vanished are marked
    /// abandoned (never deleted) and their members unassigned so the next
    /// allocation pass can re-place them. Remote groups that follow the
    /// priority naming convention for our workflow but have no local
    /// counterpart are adopted.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote group listing itself fails.
    /// Per-group failures land in the report.
    #[instrument(skip(self, report))]
    pub fn reconcile_groups(&self, report: &mut SyncReport) -> Result<()> {
        let remote_groups = self.catalog.list_groups(Scope::Project(self.project_id))?;
        let by_remote_id: HashMap<i64, _> =
            remote_groups.iter().map(|g| (g.id, g)).collect();

        for group in self.store.all_groups()? {
            if group.abandoned {
                continue;
            }
            let Some(remote_id) = group.remote_id else {
                continue;
            };
            if by_remote_id.contains_key(&remote_id) {
                continue;
            }
            if let Err(err) = self.abandon_group(&group, report) {
                tracing::warn!(group = %group.display_name, error = %err, "group reconcile failed");
                report.record_failure(&group.display_name, &err);
            }
        }

        for remote in &remote_groups {
            let Some((workflow, rank)) = parse_priority_name(&remote.name) else {
                continue;
            };
            if workflow != self.workflow_id {
                continue;
            }
            if let Err(err) = self.adopt_group(remote, workflow, rank, report) {
                tracing::warn!(group = %remote.name, error = %err, "group adoption failed");
                report.record_failure(&remote.name, &err);
            }
        }

        Ok(())
    }

    fn adopt_group(
        &self,
        remote: &RemoteGroup,
        workflow: RemoteWorkflowId,
        rank: u32,
        report: &mut SyncReport,
    ) -> Result<()> {
        if self.store.group_by_remote_id(remote.id)?.is_some() {
            return Ok(());
        }
        let ladder = self.store.priority_groups(workflow)?;
        if ladder.iter().any(|g| g.priority == Some(rank)) {
            return Err(Error::InvariantViolation(format!(
                "remote group {} duplicates rank {rank} for workflow {workflow}",
                remote.id
            )));
        }
        let mut adopted = Group::priority(workflow, rank);
        adopted.remote_id = Some(remote.id);
        self.store.insert_group(&adopted)?;
        report.groups_adopted += 1;
        tracing::info!(group = %remote.name, remote_id = remote.id, "adopted remote group");
        Ok(())
    }

    fn abandon_group(&self, group: &Group, report: &mut SyncReport) -> Result<()> {
        for member in self.store.items_in_group(&group.id)? {
            self.store
                .set_membership_cas(&member.id, Some(&group.id), None)?;
            self.store.set_allocated_bucket(&member.id, None)?;
            report.unassigned += 1;
        }
        self.store.mark_group_abandoned(&group.id)?;
        report.groups_abandoned += 1;
        tracing::warn!(group = %group.display_name, "remote group vanished, marked abandoned");
        Ok(())
    }

    /// Reconciles local items against a remote snapshot at the given scope.
    ///
    /// Items whose remote counterpart falls outside the snapshot are left
    /// untouched, so a narrowed scope only narrows the work, never corrupts
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote item listing itself fails. Per-item
    /// failures land in the report.
    #[instrument(skip(self, report))]
    pub fn reconcile_items(&self, scope: Scope, report: &mut SyncReport) -> Result<()> {
        let remote_items = self.catalog.list_items(scope)?;
        let by_remote_id: HashMap<RemoteItemId, &RemoteItem> =
            remote_items.iter().map(|r| (r.id, r)).collect();
        let by_fingerprint: HashMap<&str, &RemoteItem> = remote_items
            .iter()
            .filter_map(|r| r.fingerprint.as_deref().map(|fp| (fp, r)))
            .collect();

        for item in self.store.all_items()? {
            if item.retired {
                continue;
            }
            if let Err(err) = self.reconcile_item(&item, &by_remote_id, &by_fingerprint, report) {
                tracing::warn!(item = %item.id, error = %err, "item reconcile failed");
                report.record_failure(item.id.as_str(), &err);
            }
        }
        Ok(())
    }

    fn reconcile_item(
        &self,
        item: &Item,
        by_remote_id: &HashMap<RemoteItemId, &RemoteItem>,
        by_fingerprint: &HashMap<&str, &RemoteItem>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let remote = match item.remote_id {
            Some(remote_id) => {
                let Some(remote) = by_remote_id.get(&remote_id) else {
                    // Uploaded but absent from the snapshot. Leave alone; the
                    // catalog cannot reliably delete, so this is either lag or
                    // a listing gap.
                    tracing::debug!(item = %item.id, remote_id, "remote item not in snapshot");
                    report.skipped += 1;
                    return Ok(());
                };
                remote
            },
            None => {
                let Some(remote) = by_fingerprint.get(item.fingerprint.as_str()) else {
                    // Never uploaded and no remote twin; the push phase will
                    // create it.
                    return Ok(());
                };
                self.store.set_remote_id(&item.id, remote.id)?;
                report.bound += 1;
                tracing::info!(item = %item.id, remote_id = remote.id, "bound to existing remote item");
                remote
            },
        };

        if remote.retired {
            self.store.mark_retired(&item.id)?;
            report.retired += 1;
            return Ok(());
        }

        if remote.group_ids.len() > 1 {
            return Err(Error::InvariantViolation(format!(
                "item {} is in {} remote groups at once",
                item.id,
                remote.group_ids.len()
            )));
        }

        let local_group = match &item.group_id {
            Some(group_id) => self.store.group(group_id)?,
            None => None,
        };
        let remote_membership = remote.group_ids.first().copied();

        match (&local_group, remote_membership) {
            // Locally grouped, remotely standalone: the remote lost the
            // placement, relink it.
            (Some(group), None) => {
                if group.abandoned {
                    self.store
                        .set_membership_cas(&item.id, Some(&group.id), None)?;
                    self.store.set_allocated_bucket(&item.id, None)?;
                    report.unassigned += 1;
                } else if let Some(remote_group_id) = group.remote_id {
                    self.catalog
                        .add_items_to_group(remote_group_id, &[remote.id])?;
                    report.relinked += 1;
                    tracing::info!(item = %item.id, group = %group.display_name, "relinked remotely");
                }
            },
            // Remote placement disagrees with ours: the remote wins.
            (current, Some(remote_group_id)) => {
                let matches_local = local_group
                    .as_ref()
                    .is_some_and(|g| g.remote_id == Some(remote_group_id));
                if matches_local {
                    return Ok(());
                }
                let Some(adopted) = self.store.group_by_remote_id(remote_group_id)? else {
                    tracing::debug!(
                        item = %item.id,
                        remote_group_id,
                        "remote placement in untracked group, skipped"
                    );
                    report.skipped += 1;
                    return Ok(());
                };
                let expected = current.as_ref().map(|g| &g.id);
                self.store
                    .set_membership_cas(&item.id, expected, Some(&adopted.id))?;
                let bucket = adopted.priority.and_then(|rank| rank.checked_sub(1));
                self.store.set_allocated_bucket(&item.id, bucket)?;
                report.adopted += 1;
                tracing::info!(item = %item.id, group = %adopted.display_name, "adopted remote placement");
            },
            (None, None) => {},
        }
        Ok(())
    }
}
