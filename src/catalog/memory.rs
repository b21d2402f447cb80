//! In-memory catalog implementation.
//!
//! Models the remote platform faithfully enough to exercise the engine
//! offline: it allows an item to be linked into several groups at once
//! (the real platform does not enforce single membership either), tracks
//! retirement per item, and can inject transient failures for retry testing.
//! Used by the integration tests; also handy for verifying a configuration
//! against a throwaway catalog.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    RemoteClassification, RemoteGroupId, RemoteItemId, RemoteWorkflowId,
};
use crate::{Error, Result};

use super::{CatalogClient, FINGERPRINT_METADATA_KEY, RemoteGroup, RemoteItem, Scope};

#[derive(Default)]
struct State {
    items: Vec<RemoteItem>,
    groups: Vec<RemoteGroup>,
    classifications: Vec<RemoteClassification>,
    next_item_id: RemoteItemId,
    next_group_id: RemoteGroupId,
    /// Count of calls that mutate remote state. Lets tests assert that a
    /// reconciliation path issued no remote writes.
    mutations: usize,
    /// Injected transient failures: operation name to remaining failure count.
    transient_failures: HashMap<String, u32>,
}

/// An in-memory [`CatalogClient`].
pub struct MemoryCatalog {
    state: Mutex<State>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_item_id: 1000,
                next_group_id: 100,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(remaining) = state.transient_failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::TransientRemote {
                    operation: operation.to_string(),
                    cause: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Seeds a remote group, returning its id.
    pub fn seed_group(&self, name: &str, workflow_ids: &[RemoteWorkflowId]) -> RemoteGroupId {
        let mut state = self.lock();
        let id = state.next_group_id;
        state.next_group_id += 1;
        state.groups.push(RemoteGroup {
            id,
            name: name.to_string(),
            workflow_ids: workflow_ids.to_vec(),
        });
        id
    }

    /// Seeds a remote item, optionally linked into groups.
    pub fn seed_item(
        &self,
        fingerprint: Option<&str>,
        group_ids: &[RemoteGroupId],
    ) -> RemoteItemId {
        let mut state = self.lock();
        let id = state.next_item_id;
        state.next_item_id += 1;
        let mut metadata = Map::new();
        if let Some(fp) = fingerprint {
            metadata.insert(
                FINGERPRINT_METADATA_KEY.to_string(),
                Value::String(fp.to_string()),
            );
        }
        state.items.push(RemoteItem {
            id,
            fingerprint: fingerprint.map(ToString::to_string),
            group_ids: group_ids.to_vec(),
            retired: false,
            metadata,
        });
        id
    }

    /// Seeds a reducer output row.
    pub fn seed_classification(
        &self,
        id: i64,
        remote_item_id: RemoteItemId,
        reducer_key: &str,
        answer_index: i64,
    ) {
        self.lock().classifications.push(RemoteClassification {
            id,
            remote_item_id,
            reducer_key: reducer_key.to_string(),
            answer_index,
        });
    }

    /// Marks a remote item retired.
    pub fn set_retired(&self, item: RemoteItemId, retired: bool) {
        let mut state = self.lock();
        if let Some(remote) = state.items.iter_mut().find(|i| i.id == item) {
            remote.retired = retired;
        }
    }

    /// Deletes a remote group, as an operator would through the web UI.
    pub fn delete_group(&self, group: RemoteGroupId) {
        let mut state = self.lock();
        state.groups.retain(|g| g.id != group);
        for item in &mut state.items {
            item.group_ids.retain(|id| *id != group);
        }
    }

    /// Moves an item between groups out-of-band, bypassing the engine.
    pub fn force_move(&self, item: RemoteItemId, to: RemoteGroupId) {
        let mut state = self.lock();
        if let Some(remote) = state.items.iter_mut().find(|i| i.id == item) {
            remote.group_ids = vec![to];
        }
    }

    /// Links an item into an additional group, creating the double-membership
    /// hazard the platform itself permits.
    pub fn force_extra_membership(&self, item: RemoteItemId, also: RemoteGroupId) {
        let mut state = self.lock();
        if let Some(remote) = state.items.iter_mut().find(|i| i.id == item) {
            remote.group_ids.push(also);
        }
    }

    /// Makes the next `count` calls to `operation` fail transiently.
    pub fn inject_transient(&self, operation: &str, count: u32) {
        self.lock()
            .transient_failures
            .insert(operation.to_string(), count);
    }

    /// Number of remote-mutating calls issued so far.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    /// Snapshot of current remote items, for assertions.
    #[must_use]
    pub fn items(&self) -> Vec<RemoteItem> {
        self.lock().items.clone()
    }

    /// Snapshot of current remote groups, for assertions.
    #[must_use]
    pub fn groups(&self) -> Vec<RemoteGroup> {
        self.lock().groups.clone()
    }

    fn scope_groups(state: &State, scope: Scope) -> Vec<RemoteGroupId> {
        match scope {
            Scope::Project(_) => state.groups.iter().map(|g| g.id).collect(),
            Scope::Group(id) => vec![id],
            Scope::Workflow(wf) => state
                .groups
                .iter()
                .filter(|g| g.workflow_ids.contains(&wf))
                .map(|g| g.id)
                .collect(),
        }
    }
}

impl CatalogClient for MemoryCatalog {
    fn find_item(&self, fingerprint: &str) -> Result<Option<RemoteItem>> {
        self.check_failure("find_item")?;
        let state = self.lock();
        Ok(state
            .items
            .iter()
            .find(|i| i.fingerprint.as_deref() == Some(fingerprint))
            .cloned())
    }

    fn create_item(&self, metadata: &Map<String, Value>, _location: &str) -> Result<RemoteItem> {
        self.check_failure("create_item")?;
        let mut state = self.lock();
        let id = state.next_item_id;
        state.next_item_id += 1;
        state.mutations += 1;
        let fingerprint = metadata
            .get(FINGERPRINT_METADATA_KEY)
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let item = RemoteItem {
            id,
            fingerprint,
            group_ids: Vec::new(),
            retired: false,
            metadata: metadata.clone(),
        };
        state.items.push(item.clone());
        Ok(item)
    }

    fn list_items(&self, scope: Scope) -> Result<Vec<RemoteItem>> {
        self.check_failure("list_items")?;
        let state = self.lock();
        match scope {
            Scope::Project(_) => Ok(state.items.clone()),
            _ => {
                let group_ids = Self::scope_groups(&state, scope);
                Ok(state
                    .items
                    .iter()
                    .filter(|i| i.group_ids.iter().any(|g| group_ids.contains(g)))
                    .cloned()
                    .collect())
            },
        }
    }

    fn create_group(&self, name: &str) -> Result<RemoteGroup> {
        self.check_failure("create_group")?;
        let mut state = self.lock();
        if state.groups.iter().any(|g| g.name == name) {
            return Err(Error::RejectedOperation {
                operation: "create_group".to_string(),
                cause: format!("group '{name}' already exists"),
            });
        }
        let id = state.next_group_id;
        state.next_group_id += 1;
        state.mutations += 1;
        let group = RemoteGroup {
            id,
            name: name.to_string(),
            workflow_ids: Vec::new(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    fn find_group(&self, name: &str, scope: Scope) -> Result<Option<RemoteGroup>> {
        self.check_failure("find_group")?;
        let state = self.lock();
        let in_scope = Self::scope_groups(&state, scope);
        Ok(state
            .groups
            .iter()
            .find(|g| g.name == name && in_scope.contains(&g.id))
            .cloned())
    }

    fn list_groups(&self, scope: Scope) -> Result<Vec<RemoteGroup>> {
        self.check_failure("list_groups")?;
        let state = self.lock();
        let in_scope = Self::scope_groups(&state, scope);
        Ok(state
            .groups
            .iter()
            .filter(|g| in_scope.contains(&g.id))
            .cloned()
            .collect())
    }

    fn add_items_to_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()> {
        self.check_failure("add_items_to_group")?;
        let mut state = self.lock();
        if !state.groups.iter().any(|g| g.id == group) {
            return Err(Error::RejectedOperation {
                operation: "add_items_to_group".to_string(),
                cause: format!("no group {group}"),
            });
        }
        state.mutations += 1;
        for item in &mut state.items {
            if items.contains(&item.id) && !item.group_ids.contains(&group) {
                item.group_ids.push(group);
            }
        }
        Ok(())
    }

    fn remove_items_from_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()> {
        self.check_failure("remove_items_from_group")?;
        let mut state = self.lock();
        state.mutations += 1;
        for item in &mut state.items {
            if items.contains(&item.id) {
                item.group_ids.retain(|g| *g != group);
            }
        }
        Ok(())
    }

    fn link_group_to_workflow(
        &self,
        workflow: RemoteWorkflowId,
        group: RemoteGroupId,
    ) -> Result<()> {
        self.check_failure("link_group_to_workflow")?;
        let mut state = self.lock();
        state.mutations += 1;
        if let Some(remote) = state.groups.iter_mut().find(|g| g.id == group) {
            // already-linked is not an error, matching platform behavior
            if !remote.workflow_ids.contains(&workflow) {
                remote.workflow_ids.push(workflow);
            }
            Ok(())
        } else {
            Err(Error::RejectedOperation {
                operation: "link_group_to_workflow".to_string(),
                cause: format!("no group {group}"),
            })
        }
    }

    fn unlink_groups_from_workflow(
        &self,
        workflow: RemoteWorkflowId,
        groups: &[RemoteGroupId],
    ) -> Result<()> {
        self.check_failure("unlink_groups_from_workflow")?;
        let mut state = self.lock();
        state.mutations += 1;
        for group in &mut state.groups {
            if groups.contains(&group.id) {
                group.workflow_ids.retain(|wf| *wf != workflow);
            }
        }
        Ok(())
    }

    fn set_group_weights(
        &self,
        _workflow: RemoteWorkflowId,
        _weights: &[(RemoteGroupId, f64)],
    ) -> Result<()> {
        self.check_failure("set_group_weights")?;
        self.lock().mutations += 1;
        Ok(())
    }

    fn list_classifications(
        &self,
        _workflow: RemoteWorkflowId,
        reducer_key: &str,
    ) -> Result<Vec<RemoteClassification>> {
        self.check_failure("list_classifications")?;
        let state = self.lock();
        Ok(state
            .classifications
            .iter()
            .filter(|c| c.reducer_key == reducer_key)
            .cloned()
            .collect())
    }

    fn item_retired(&self, _workflow: RemoteWorkflowId, item: RemoteItemId) -> Result<bool> {
        self.check_failure("item_retired")?;
        let state = self.lock();
        Ok(state
            .items
            .iter()
            .find(|i| i.id == item)
            .is_some_and(|i| i.retired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_find_by_fingerprint() {
        let catalog = MemoryCatalog::new();
        let id = catalog.seed_item(Some("fp-1"), &[]);
        let found = catalog.find_item("fp-1").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(catalog.find_item("fp-2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_group_name_rejected() {
        let catalog = MemoryCatalog::new();
        catalog.create_group("A").unwrap();
        let err = catalog.create_group("A").unwrap_err();
        assert!(matches!(err, Error::RejectedOperation { .. }));
    }

    #[test]
    fn test_add_remove_membership() {
        let catalog = MemoryCatalog::new();
        let g1 = catalog.seed_group("G1", &[1]);
        let g2 = catalog.seed_group("G2", &[1]);
        let item = catalog.seed_item(Some("fp"), &[g1]);

        catalog.remove_items_from_group(g1, &[item]).unwrap();
        catalog.add_items_to_group(g2, &[item]).unwrap();

        let items = catalog.items();
        assert_eq!(items[0].group_ids, vec![g2]);
    }

    #[test]
    fn test_double_membership_is_permitted_remotely() {
        // The platform does not protect the invariant; the engine must.
        let catalog = MemoryCatalog::new();
        let g1 = catalog.seed_group("G1", &[1]);
        let g2 = catalog.seed_group("G2", &[1]);
        let item = catalog.seed_item(Some("fp"), &[g1]);
        catalog.force_extra_membership(item, g2);
        assert_eq!(catalog.items()[0].group_ids.len(), 2);
    }

    #[test]
    fn test_injected_transient_failures_are_finite() {
        let catalog = MemoryCatalog::new();
        catalog.inject_transient("list_items", 2);
        assert!(catalog.list_items(Scope::Project(1)).is_err());
        assert!(catalog.list_items(Scope::Project(1)).is_err());
        assert!(catalog.list_items(Scope::Project(1)).is_ok());
    }

    #[test]
    fn test_workflow_scope_listing() {
        let catalog = MemoryCatalog::new();
        let g1 = catalog.seed_group("in", &[7]);
        let _g2 = catalog.seed_group("out", &[8]);
        catalog.seed_item(Some("a"), &[g1]);

        let groups = catalog.list_groups(Scope::Workflow(7)).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "in");

        let items = catalog.list_items(Scope::Workflow(7)).unwrap();
        assert_eq!(items.len(), 1);
    }
}
