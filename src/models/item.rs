//! Item types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{GroupId, RemoteItemId};
use crate::fingerprint::Fingerprinter;

/// Unique local identifier for an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new random item ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an item ID from an existing string.
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

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unit of content exposed for crowd classification (a "subject").
///
/// Items are created when new content is produced, gain a remote identifier
/// on first successful upload, and are retired once the platform has gathered
/// enough classifications. They are never deleted; the remote platform cannot
/// reliably delete them either.
#[derive(Debug, Clone)]
pub struct Item {
    /// Stable local identifier.
    pub id: ItemId,
    /// Remote catalog identifier; `None` until the first successful upload.
    pub remote_id: Option<RemoteItemId>,
    /// Content fingerprint used to detect logical duplicates.
    pub fingerprint: String,
    /// URL of the stamp media served to the platform.
    pub location: String,
    /// Opaque descriptive metadata forwarded to the remote catalog.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Confidence score in `[0, 1]`, supplied by an external scorer.
    ///
    /// Unset items are excluded from (re)allocation and left where they are.
    pub confidence: Option<f64>,
    /// Set once enough classifications exist; membership is then frozen.
    pub retired: bool,
    /// The group this item belongs to. At most one, system-wide.
    pub group_id: Option<GroupId>,
    /// The confidence bucket the item was last allocated into.
    pub allocated_bucket: Option<u32>,
    /// The confidence score at the time of the last allocation.
    ///
    /// Allocation re-plans an item only when its confidence has moved since
    /// this baseline, so a placement adopted from the remote catalog sticks
    /// until the score actually changes.
    pub allocated_confidence: Option<f64>,
}

impl Item {
    /// Creates a fresh, never-uploaded item.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: ItemId::generate(),
            remote_id: None,
            fingerprint: fingerprint.into(),
            location: location.into(),
            metadata: serde_json::Map::new(),
            confidence: None,
            retired: false,
            group_id: None,
            allocated_bucket: None,
            allocated_confidence: None,
        }
    }

    /// Creates an item from a raw content descriptor, fingerprinting it.
    #[must_use]
    pub fn from_content(descriptor: &str, location: impl Into<String>) -> Self {
        Self::new(Fingerprinter::fingerprint(descriptor), location)
    }

    /// Attaches opaque metadata forwarded to the remote catalog.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the confidence score.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Returns true when the item has never been uploaded.
    #[must_use]
    pub const fn is_unuploaded(&self) -> bool {
        self.remote_id.is_none()
    }
}
