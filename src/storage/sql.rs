//! Schema and SQL statements for the local store.

/// Schema for the local record of items, groups and classifications.
///
/// Uniqueness carries the engine's safety net:
/// - `items.remote_id` unique (nullable): one local row per remote item
/// - `items.fingerprint` unique: the local half of duplicate prevention
/// - `classifications.remote_classification_id` unique: idempotent ingest
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    remote_id INTEGER UNIQUE,
    display_name TEXT NOT NULL,
    priority INTEGER,
    workflow_id INTEGER,
    weight REAL,
    abandoned INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    remote_id INTEGER UNIQUE,
    fingerprint TEXT NOT NULL UNIQUE,
    location TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    confidence REAL,
    retired INTEGER NOT NULL DEFAULT 0,
    group_id TEXT REFERENCES groups(id),
    allocated_bucket INTEGER,
    allocated_confidence REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS classifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_classification_id INTEGER NOT NULL UNIQUE,
    item_id TEXT NOT NULL REFERENCES items(id),
    reducer_key TEXT NOT NULL,
    answer_index INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_group ON items(group_id);
CREATE INDEX IF NOT EXISTS idx_groups_workflow ON groups(workflow_id);
CREATE INDEX IF NOT EXISTS idx_classifications_item ON classifications(item_id);
";

/// Columns selected for item rows, in row-mapping order.
pub const ITEM_COLUMNS: &str = "id, remote_id, fingerprint, location, metadata, confidence, \
                                retired, group_id, allocated_bucket, allocated_confidence";

/// Columns selected for group rows, in row-mapping order.
pub const GROUP_COLUMNS: &str =
    "id, remote_id, display_name, priority, workflow_id, weight, abandoned";
