//! Data models for stampsync.
//!
//! This module contains the core entities the engine keeps consistent across
//! the local store and the remote catalog.

mod classification;
mod group;
mod item;

pub use classification::{Classification, RemoteClassification};
pub use group::{Group, GroupId, parse_priority_name, priority_group_name};
pub use item::{Item, ItemId};

/// Zooniverse-style remote identifier for an item ("subject").
pub type RemoteItemId = i64;
/// Remote identifier for a group ("subject set").
pub type RemoteGroupId = i64;
/// Remote identifier for a workflow.
pub type RemoteWorkflowId = i64;
/// Remote identifier for a project.
pub type RemoteProjectId = i64;

/// Intent to move an item between groups, emitted by the allocation engine.
///
/// The allocation engine never talks to the catalog itself; intents are
/// applied by the orchestrator, which sequences the remote remove before the
/// remote add so a crash mid-move leaves the item unassigned rather than
/// doubly assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// The item to move.
    pub item_id: ItemId,
    /// The group the item currently belongs to, if any.
    pub from: Option<GroupId>,
    /// The group the item should belong to.
    pub to: GroupId,
    /// The confidence bucket that produced this placement.
    pub bucket: u32,
}

/// Intent to set a group's selection weight under a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightChange {
    /// The group whose weight changes.
    pub group_id: GroupId,
    /// The remote group identifier, required to push the weight.
    pub remote_group_id: RemoteGroupId,
    /// The workflow the weight applies to.
    pub workflow_id: RemoteWorkflowId,
    /// The selection weight.
    pub weight: f64,
}
