//! Classification types.

use super::{ItemId, RemoteItemId};

/// An immutable classification fact ingested from the platform's reducer
/// output.
///
/// Uniqueness is on `remote_classification_id`, which makes ingestion
/// idempotent under re-delivery. Classifications are never mutated or
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The platform's identifier for this reduction. Idempotency key.
    pub remote_classification_id: i64,
    /// The local item this classification is for.
    pub item_id: ItemId,
    /// The reducer that produced the consensus value.
    pub reducer_key: String,
    /// C-style index into the workflow task's answer list.
    pub answer_index: i64,
}

/// A classification as observed in the platform's reducer output, before it
/// has been matched to a local item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClassification {
    /// The platform's identifier for this reduction.
    pub id: i64,
    /// The remote item the reduction is for.
    pub remote_item_id: RemoteItemId,
    /// The reducer that produced it.
    pub reducer_key: String,
    /// Consensus answer index.
    pub answer_index: i64,
}
