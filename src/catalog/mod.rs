//! Remote catalog abstraction.
//!
//! The remote platform is an independent system of record that can be mutated
//! out-of-band, offers no transactional guarantees, and does not enforce the
//! single-membership invariant. Everything the engine needs from it goes
//! through the [`CatalogClient`] capability trait so that transports can vary
//! while the contract stays fixed.

mod http;
mod memory;

pub use http::HttpCatalog;
pub use memory::MemoryCatalog;

use serde_json::Map;
use serde_json::Value;

use crate::Result;
use crate::models::{
    RemoteClassification, RemoteGroupId, RemoteItemId, RemoteProjectId, RemoteWorkflowId,
};

/// The scope of a remote listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everything in a project.
    Project(RemoteProjectId),
    /// A single group.
    Group(RemoteGroupId),
    /// Everything linked to a workflow.
    Workflow(RemoteWorkflowId),
}

/// An item as observed in the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Remote identifier.
    pub id: RemoteItemId,
    /// Content fingerprint, if the item's metadata carries one. Items created
    /// by other clients may not.
    pub fingerprint: Option<String>,
    /// Groups the item is currently linked to. The platform permits more than
    /// one; the engine treats that as an invariant violation.
    pub group_ids: Vec<RemoteGroupId>,
    /// Whether the platform reports the item retired.
    pub retired: bool,
    /// Remote metadata.
    pub metadata: Map<String, Value>,
}

/// A group as observed in the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGroup {
    /// Remote identifier.
    pub id: RemoteGroupId,
    /// Display name.
    pub name: String,
    /// Workflows the group is linked to.
    pub workflow_ids: Vec<RemoteWorkflowId>,
}

/// Operations the engine needs from the remote platform.
///
/// Every call may fail with
/// [`Error::TransientRemote`](crate::Error::TransientRemote) (retryable) or
/// [`Error::RejectedOperation`](crate::Error::RejectedOperation) (logged and
/// skipped, never retried).
pub trait CatalogClient {
    /// Looks up an item by content fingerprint, scoped to the whole project.
    ///
    /// The project scope matters: an item can exist remotely, unassigned to
    /// any group, created by another process the local index knows nothing
    /// about.
    ///
    /// # Errors
    ///
    /// Fails when the remote lookup fails.
    fn find_item(&self, fingerprint: &str) -> Result<Option<RemoteItem>>;

    /// Creates a new remote item with the given metadata and media location.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn create_item(&self, metadata: &Map<String, Value>, location: &str) -> Result<RemoteItem>;

    /// Lists items at the requested scope.
    ///
    /// # Errors
    ///
    /// Fails when the remote listing fails.
    fn list_items(&self, scope: Scope) -> Result<Vec<RemoteItem>>;

    /// Creates a new, empty remote group.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses (e.g. duplicate name) or cannot be
    /// reached.
    fn create_group(&self, name: &str) -> Result<RemoteGroup>;

    /// Finds a group by display name within a scope.
    ///
    /// # Errors
    ///
    /// Fails when the remote lookup fails.
    fn find_group(&self, name: &str, scope: Scope) -> Result<Option<RemoteGroup>>;

    /// Lists groups at the requested scope.
    ///
    /// # Errors
    ///
    /// Fails when the remote listing fails.
    fn list_groups(&self, scope: Scope) -> Result<Vec<RemoteGroup>>;

    /// Links items into a group.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn add_items_to_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()>;

    /// Unlinks items from a group.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn remove_items_from_group(&self, group: RemoteGroupId, items: &[RemoteItemId]) -> Result<()>;

    /// Links a group to a workflow. Linking an already-linked group is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn link_group_to_workflow(
        &self,
        workflow: RemoteWorkflowId,
        group: RemoteGroupId,
    ) -> Result<()>;

    /// Unlinks groups from a workflow.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn unlink_groups_from_workflow(
        &self,
        workflow: RemoteWorkflowId,
        groups: &[RemoteGroupId],
    ) -> Result<()>;

    /// Sets the selection weights for groups under a workflow.
    ///
    /// # Errors
    ///
    /// Fails when the platform refuses or cannot be reached.
    fn set_group_weights(
        &self,
        workflow: RemoteWorkflowId,
        weights: &[(RemoteGroupId, f64)],
    ) -> Result<()>;

    /// Lists reducer output for a workflow.
    ///
    /// # Errors
    ///
    /// Fails when the remote listing fails.
    fn list_classifications(
        &self,
        workflow: RemoteWorkflowId,
        reducer_key: &str,
    ) -> Result<Vec<RemoteClassification>>;

    /// Reports whether the platform has retired an item under a workflow.
    ///
    /// # Errors
    ///
    /// Fails when the remote lookup fails.
    fn item_retired(&self, workflow: RemoteWorkflowId, item: RemoteItemId) -> Result<bool>;
}

/// Metadata key carrying the content fingerprint on remote items.
pub const FINGERPRINT_METADATA_KEY: &str = "fingerprint";
