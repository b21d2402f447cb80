//! The local store.
//!
//! The authoritative local record of items, groups, membership and
//! classifications, backed by `SQLite`. The store is the single source of
//! mutable shared state in the engine; membership writes go through a
//! compare-and-set so an interrupted and restarted cycle cannot lose an
//! update silently.

mod sql;

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    Classification, Group, GroupId, Item, ItemId, RemoteGroupId, RemoteItemId, RemoteWorkflowId,
};
use crate::{Error, Result};

/// Meta key recording the priority-group ladder size used by the last
/// allocation pass. A mismatch with the configured size forces a full
/// reallocation.
pub const META_BUCKET_COUNT: &str = "bucket_count";

/// SQLite-backed local store.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

/// Acquires the connection lock, recovering from poison.
///
/// If a previous critical section panicked, the connection state is still
/// valid; log and continue rather than cascade the failure.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("local store mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent-read, single-writer use.
fn configure_connection(conn: &Connection) {
    // journal_mode returns a row; ignore it rather than execute_batch
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    let metadata_json: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Item {
        id: ItemId::new(row.get::<_, String>(0)?),
        remote_id: row.get(1)?,
        fingerprint: row.get(2)?,
        location: row.get(3)?,
        metadata,
        confidence: row.get(5)?,
        retired: row.get(6)?,
        group_id: row.get::<_, Option<String>>(7)?.map(GroupId::new),
        allocated_bucket: row.get(8)?,
        allocated_confidence: row.get(9)?,
    })
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: GroupId::new(row.get::<_, String>(0)?),
        remote_id: row.get(1)?,
        display_name: row.get(2)?,
        priority: row.get(3)?,
        workflow_id: row.get(4)?,
        weight: row.get(5)?,
        abandoned: row.get(6)?,
    })
}

impl LocalStore {
    /// Opens (and migrates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage("open", &e))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage("open", &e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn);
        conn.execute_batch(sql::SCHEMA)
            .map_err(|e| Error::storage("migrate", &e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // Items -----------------------------------------------------------------

    /// Inserts a new item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on constraint violations (duplicate
    /// fingerprint or remote id) or I/O failure.
    pub fn insert_item(&self, item: &Item) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let metadata = serde_json::Value::Object(item.metadata.clone()).to_string();
        conn.execute(
            "INSERT INTO items (id, remote_id, fingerprint, location, metadata, confidence, \
             retired, group_id, allocated_bucket, allocated_confidence, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                item.id.as_str(),
                item.remote_id,
                item.fingerprint,
                item.location,
                metadata,
                item.confidence,
                item.retired,
                item.group_id.as_ref().map(GroupId::as_str),
                item.allocated_bucket,
                item.allocated_confidence,
                now(),
            ],
        )
        .map_err(|e| Error::storage("insert_item", &e))?;
        Ok(())
    }

    /// Fetches an item by local id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn item(&self, id: &ItemId) -> Result<Option<Item>> {
        self.query_item("SELECT {} FROM items WHERE id = ?1", params![id.as_str()])
    }

    /// Fetches an item by remote id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn item_by_remote_id(&self, remote_id: RemoteItemId) -> Result<Option<Item>> {
        self.query_item(
            "SELECT {} FROM items WHERE remote_id = ?1",
            params![remote_id],
        )
    }

    /// Fetches an item by fingerprint. This is the local half of duplicate
    /// prevention.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn item_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Item>> {
        self.query_item(
            "SELECT {} FROM items WHERE fingerprint = ?1",
            params![fingerprint],
        )
    }

    fn query_item(
        &self,
        sql_template: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Item>> {
        let conn = acquire_lock(&self.conn);
        let sql = sql_template.replace("{}", sql::ITEM_COLUMNS);
        conn.query_row(&sql, params, row_to_item)
            .optional()
            .map_err(|e| Error::storage("query_item", &e))
    }

    /// Returns every item, ordered by creation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn all_items(&self) -> Result<Vec<Item>> {
        self.query_items("SELECT {} FROM items ORDER BY created_at", params![])
    }

    /// Returns items that have never been uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn unuploaded_items(&self) -> Result<Vec<Item>> {
        self.query_items(
            "SELECT {} FROM items WHERE remote_id IS NULL ORDER BY created_at",
            params![],
        )
    }

    /// Returns non-retired items with a confidence score, the population the
    /// allocation engine works over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn allocatable_items(&self) -> Result<Vec<Item>> {
        self.query_items(
            "SELECT {} FROM items WHERE retired = 0 AND confidence IS NOT NULL \
             ORDER BY created_at",
            params![],
        )
    }

    /// Returns the items recorded as members of a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn items_in_group(&self, group: &GroupId) -> Result<Vec<Item>> {
        self.query_items(
            "SELECT {} FROM items WHERE group_id = ?1 ORDER BY created_at",
            params![group.as_str()],
        )
    }

    fn query_items(&self, sql_template: &str, params: impl rusqlite::Params) -> Result<Vec<Item>> {
        let conn = acquire_lock(&self.conn);
        let sql = sql_template.replace("{}", sql::ITEM_COLUMNS);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::storage("query_items", &e))?;
        let rows = stmt
            .query_map(params, row_to_item)
            .map_err(|e| Error::storage("query_items", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::storage("query_items", &e))
    }

    /// Binds an item to its remote identifier after upload or duplicate
    /// discovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on failure (including another local item
    /// already holding that remote id).
    pub fn set_remote_id(&self, id: &ItemId, remote_id: RemoteItemId) -> Result<()> {
        self.exec(
            "set_remote_id",
            "UPDATE items SET remote_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), remote_id, now()],
        )
    }

    /// Updates an item's confidence score.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] for scores outside `[0, 1]`,
    /// [`Error::Storage`] on I/O failure.
    pub fn set_confidence(&self, id: &ItemId, confidence: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvariantViolation(format!(
                "confidence {confidence} outside [0, 1] for item {id}"
            )));
        }
        self.exec(
            "set_confidence",
            "UPDATE items SET confidence = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), confidence, now()],
        )
    }

    /// Marks an item retired. Membership is frozen from here on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn mark_retired(&self, id: &ItemId) -> Result<()> {
        self.exec(
            "mark_retired",
            "UPDATE items SET retired = 1, updated_at = ?2 WHERE id = ?1",
            params![id.as_str(), now()],
        )
    }

    /// Records the bucket an item was allocated into, or clears it to flag
    /// the item for reallocation.
    ///
    /// Setting a bucket also snapshots the item's current confidence as the
    /// allocation baseline; clearing the bucket clears the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn set_allocated_bucket(&self, id: &ItemId, bucket: Option<u32>) -> Result<()> {
        self.exec(
            "set_allocated_bucket",
            "UPDATE items SET allocated_bucket = ?2, \
             allocated_confidence = CASE WHEN ?2 IS NULL THEN NULL ELSE confidence END, \
             updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), bucket, now()],
        )
    }

    /// Compare-and-set membership update.
    ///
    /// Writes the new group only if the recorded group still matches
    /// `expected`; a mismatch means another cycle (or a restarted one)
    /// already moved the item, and the caller's plan is stale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] on a lost update,
    /// [`Error::Storage`] on I/O failure.
    pub fn set_membership_cas(
        &self,
        id: &ItemId,
        expected: Option<&GroupId>,
        new: Option<&GroupId>,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let changed = conn
            .execute(
                "UPDATE items SET group_id = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND group_id IS ?2",
                params![
                    id.as_str(),
                    expected.map(GroupId::as_str),
                    new.map(GroupId::as_str),
                    now(),
                ],
            )
            .map_err(|e| Error::storage("set_membership_cas", &e))?;
        if changed == 1 {
            Ok(())
        } else {
            Err(Error::InvariantViolation(format!(
                "membership of item {id} changed concurrently, expected {expected:?}"
            )))
        }
    }

    // Groups ----------------------------------------------------------------

    /// Inserts a new group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on constraint violations or I/O failure.
    pub fn insert_group(&self, group: &Group) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO groups (id, remote_id, display_name, priority, workflow_id, weight, \
             abandoned, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                group.id.as_str(),
                group.remote_id,
                group.display_name,
                group.priority,
                group.workflow_id,
                group.weight,
                group.abandoned,
                now(),
            ],
        )
        .map_err(|e| Error::storage("insert_group", &e))?;
        Ok(())
    }

    /// Fetches a group by local id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn group(&self, id: &GroupId) -> Result<Option<Group>> {
        self.query_group("SELECT {} FROM groups WHERE id = ?1", params![id.as_str()])
    }

    /// Fetches a group by remote id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn group_by_remote_id(&self, remote_id: RemoteGroupId) -> Result<Option<Group>> {
        self.query_group(
            "SELECT {} FROM groups WHERE remote_id = ?1",
            params![remote_id],
        )
    }

    fn query_group(
        &self,
        sql_template: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Group>> {
        let conn = acquire_lock(&self.conn);
        let sql = sql_template.replace("{}", sql::GROUP_COLUMNS);
        conn.query_row(&sql, params, row_to_group)
            .optional()
            .map_err(|e| Error::storage("query_group", &e))
    }

    /// Returns every group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn all_groups(&self) -> Result<Vec<Group>> {
        self.query_groups("SELECT {} FROM groups ORDER BY created_at", params![])
    }

    /// Returns the live priority ladder for a workflow, sorted by rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn priority_groups(&self, workflow: RemoteWorkflowId) -> Result<Vec<Group>> {
        self.query_groups(
            "SELECT {} FROM groups WHERE workflow_id = ?1 AND priority IS NOT NULL \
             AND abandoned = 0 ORDER BY priority",
            params![workflow],
        )
    }

    fn query_groups(
        &self,
        sql_template: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Group>> {
        let conn = acquire_lock(&self.conn);
        let sql = sql_template.replace("{}", sql::GROUP_COLUMNS);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::storage("query_groups", &e))?;
        let rows = stmt
            .query_map(params, row_to_group)
            .map_err(|e| Error::storage("query_groups", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::storage("query_groups", &e))
    }

    /// Marks a group abandoned. The row is kept; local history is never
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn mark_group_abandoned(&self, id: &GroupId) -> Result<()> {
        self.exec(
            "mark_group_abandoned",
            "UPDATE groups SET abandoned = 1, updated_at = ?2 WHERE id = ?1",
            params![id.as_str(), now()],
        )
    }

    /// Updates a group's workflow link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn set_group_workflow(
        &self,
        id: &GroupId,
        workflow: Option<RemoteWorkflowId>,
    ) -> Result<()> {
        self.exec(
            "set_group_workflow",
            "UPDATE groups SET workflow_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), workflow, now()],
        )
    }

    /// Records the selection weight pushed for a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn set_group_weight(&self, id: &GroupId, weight: f64) -> Result<()> {
        self.exec(
            "set_group_weight",
            "UPDATE groups SET weight = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), weight, now()],
        )
    }

    // Classifications -------------------------------------------------------

    /// Records a classification fact.
    ///
    /// Idempotent under re-delivery: returns `true` if the row was new,
    /// `false` if the remote classification id was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn record_classification(&self, classification: &Classification) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO classifications \
                 (remote_classification_id, item_id, reducer_key, answer_index, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    classification.remote_classification_id,
                    classification.item_id.as_str(),
                    classification.reducer_key,
                    classification.answer_index,
                    now(),
                ],
            )
            .map_err(|e| Error::storage("record_classification", &e))?;
        Ok(changed == 1)
    }

    /// Counts recorded classifications for an item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn classification_count(&self, item: &ItemId) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        // SQLite counts are i64; COUNT(*) is never negative
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM classifications WHERE item_id = ?1",
                params![item.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage("classification_count", &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // Meta ------------------------------------------------------------------

    /// Reads a meta value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::storage("meta_get", &e))
    }

    /// Writes a meta value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.exec(
            "meta_set",
            "INSERT INTO meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
    }

    fn exec(&self, operation: &str, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(sql, params)
            .map_err(|e| Error::storage(operation, &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_fetch_item() {
        let store = store();
        let item = Item::new("fp-1", "https://stamps.example/1.png").with_confidence(0.4);
        store.insert_item(&item).unwrap();

        let fetched = store.item(&item.id).unwrap().unwrap();
        assert_eq!(fetched.fingerprint, "fp-1");
        assert_eq!(fetched.confidence, Some(0.4));
        assert!(fetched.remote_id.is_none());

        let by_fp = store.item_by_fingerprint("fp-1").unwrap().unwrap();
        assert_eq!(by_fp.id, item.id);
    }

    #[test]
    fn test_duplicate_fingerprint_rejected() {
        let store = store();
        store.insert_item(&Item::new("fp-1", "a")).unwrap();
        let err = store.insert_item(&Item::new("fp-1", "b")).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn test_remote_id_binding_and_lookup() {
        let store = store();
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();
        store.set_remote_id(&item.id, 4021).unwrap();
        let fetched = store.item_by_remote_id(4021).unwrap().unwrap();
        assert_eq!(fetched.id, item.id);
    }

    #[test]
    fn test_confidence_range_enforced() {
        let store = store();
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();
        assert!(store.set_confidence(&item.id, 1.0).is_ok());
        assert!(matches!(
            store.set_confidence(&item.id, 1.5),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            store.set_confidence(&item.id, -0.1),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_membership_cas_success_and_conflict() {
        let store = store();
        let group = Group::priority(4, 1);
        store.insert_group(&group).unwrap();
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();

        // unassigned -> group
        store
            .set_membership_cas(&item.id, None, Some(&group.id))
            .unwrap();

        // stale expectation loses
        let err = store
            .set_membership_cas(&item.id, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        // correct expectation wins
        store
            .set_membership_cas(&item.id, Some(&group.id), None)
            .unwrap();
        assert!(store.item(&item.id).unwrap().unwrap().group_id.is_none());
    }

    #[test]
    fn test_classification_idempotent() {
        let store = store();
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();
        let classification = Classification {
            remote_classification_id: 900,
            item_id: item.id.clone(),
            reducer_key: "consensus".to_string(),
            answer_index: 1,
        };
        assert!(store.record_classification(&classification).unwrap());
        assert!(!store.record_classification(&classification).unwrap());
        assert_eq!(store.classification_count(&item.id).unwrap(), 1);
    }

    #[test]
    fn test_priority_groups_sorted_and_filtered() {
        let store = store();
        let mut g2 = Group::priority(4, 2);
        g2.remote_id = Some(102);
        let mut g1 = Group::priority(4, 1);
        g1.remote_id = Some(101);
        let ordinary = Group::ordinary("plain");
        store.insert_group(&g2).unwrap();
        store.insert_group(&g1).unwrap();
        store.insert_group(&ordinary).unwrap();

        let ladder = store.priority_groups(4).unwrap();
        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder[0].priority, Some(1));
        assert_eq!(ladder[1].priority, Some(2));

        store.mark_group_abandoned(&g1.id).unwrap();
        assert_eq!(store.priority_groups(4).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_metadata_surfaces_as_storage_error() {
        let store = store();
        let item = Item::new("fp-1", "a");
        store.insert_item(&item).unwrap();
        {
            let conn = acquire_lock(&store.conn);
            conn.execute(
                "UPDATE items SET metadata = 'not json' WHERE id = ?1",
                params![item.id.as_str()],
            )
            .unwrap();
        }
        assert!(matches!(store.item(&item.id), Err(Error::Storage { .. })));
    }

    #[test]
    fn test_meta_round_trip() {
        let store = store();
        assert!(store.meta_get(META_BUCKET_COUNT).unwrap().is_none());
        store.meta_set(META_BUCKET_COUNT, "3").unwrap();
        store.meta_set(META_BUCKET_COUNT, "4").unwrap();
        assert_eq!(
            store.meta_get(META_BUCKET_COUNT).unwrap().as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_allocatable_items_excludes_retired_and_unscored() {
        let store = store();
        let scored = Item::new("fp-1", "a").with_confidence(0.5);
        let unscored = Item::new("fp-2", "b");
        let retired = Item::new("fp-3", "c").with_confidence(0.9);
        store.insert_item(&scored).unwrap();
        store.insert_item(&unscored).unwrap();
        store.insert_item(&retired).unwrap();
        store.mark_retired(&retired.id).unwrap();

        let allocatable = store.allocatable_items().unwrap();
        assert_eq!(allocatable.len(), 1);
        assert_eq!(allocatable[0].id, scored.id);
    }
}
