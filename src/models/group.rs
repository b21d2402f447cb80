//! Group types and the priority-group naming convention.
//!
//! A group is a named container of items assigned to a workflow (a "subject
//! set"). Priority groups additionally carry a rank: the set of priority
//! groups under one workflow partitions the confidence interval `[0, 1]` into
//! contiguous bins of equal width, and a group's display name encodes its
//! workflow and rank so it can be located remotely without a secondary
//! lookup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{RemoteGroupId, RemoteWorkflowId};

/// Name pattern for priority groups: `WF<workflow> Stamp Priority #<rank>`.
static PRIORITY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^WF(\d+) Stamp Priority #(\d+)$").expect("valid regex"));

/// Unique local identifier for a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a new random group ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a group ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A named, ordered container of items assigned to a workflow.
#[derive(Debug, Clone)]
pub struct Group {
    /// Stable local identifier.
    pub id: GroupId,
    /// Remote catalog identifier; `None` until created remotely.
    pub remote_id: Option<RemoteGroupId>,
    /// Display name on the platform.
    pub display_name: String,
    /// Priority rank (1-based); unset for ordinary groups.
    pub priority: Option<u32>,
    /// The workflow this group is linked to, if any.
    pub workflow_id: Option<RemoteWorkflowId>,
    /// Selection weight under its workflow, if one has been pushed.
    pub weight: Option<f64>,
    /// Set when the catalog no longer reports this group. Local history is
    /// preserved; abandoned groups are never deleted.
    pub abandoned: bool,
}

impl Group {
    /// Creates a priority group for a workflow rank, named per convention.
    #[must_use]
    pub fn priority(workflow_id: RemoteWorkflowId, rank: u32) -> Self {
        Self {
            id: GroupId::generate(),
            remote_id: None,
            display_name: priority_group_name(workflow_id, rank),
            priority: Some(rank),
            workflow_id: Some(workflow_id),
            weight: None,
            abandoned: false,
        }
    }

    /// Creates an ordinary (non-priority) group.
    #[must_use]
    pub fn ordinary(display_name: impl Into<String>) -> Self {
        Self {
            id: GroupId::generate(),
            remote_id: None,
            display_name: display_name.into(),
            priority: None,
            workflow_id: None,
            weight: None,
            abandoned: false,
        }
    }
}

/// Encodes the priority-group display name for a workflow and rank.
///
/// The name doubles as the remote lookup key, so changing this format orphans
/// every priority group created under the old format.
#[must_use]
pub fn priority_group_name(workflow_id: RemoteWorkflowId, rank: u32) -> String {
    format!("WF{workflow_id} Stamp Priority #{rank}")
}

/// Decodes a priority-group display name into `(workflow_id, rank)`.
///
/// Returns `None` for names that do not follow the convention.
#[must_use]
pub fn parse_priority_name(name: &str) -> Option<(RemoteWorkflowId, u32)> {
    let caps = PRIORITY_NAME_RE.captures(name)?;
    let workflow_id = caps.get(1)?.as_str().parse().ok()?;
    let rank: u32 = caps.get(2)?.as_str().parse().ok()?;
    // ranks are 1-based; a "#0" name was not created by this convention
    (rank >= 1).then_some((workflow_id, rank))
}
