//! Classification ingest.
//!
//! Pulls reducer output from the platform and folds it into the local store:
//! each classification is matched to a local item by remote id and recorded
//! idempotently, and retirement status is refreshed for items that received
//! classifications. Classifications are immutable facts; re-delivery is
//! expected and harmless.

use tracing::instrument;

use crate::catalog::CatalogClient;
use crate::config::StampsyncConfig;
use crate::models::{Classification, RemoteClassification};
use crate::services::SyncFailure;
use crate::storage::LocalStore;
use crate::{Error, Result};

/// Outcome of one ingest pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Reducer rows pulled from the platform.
    pub pulled: usize,
    /// Classifications recorded for the first time.
    pub linked: usize,
    /// Re-delivered classifications already on record.
    pub duplicates: usize,
    /// Rows referencing items the local store does not track.
    pub unknown: usize,
    /// Items newly marked retired.
    pub retired: usize,
    /// Per-row failures.
    pub failures: Vec<SyncFailure>,
}

/// Folds platform reducer output into the local store.
pub struct ClassificationIngest<'a> {
    store: &'a LocalStore,
    catalog: &'a dyn CatalogClient,
    config: &'a StampsyncConfig,
}

impl<'a> ClassificationIngest<'a> {
    /// Creates an ingest service.
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

    /// Pulls and records reducer output for every configured reducer key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no reducer mapping is
    /// configured, or the remote listing fails. Per-row failures land in the
    /// report.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<IngestReport> {
        if self.config.reducers.is_empty() {
            return Err(Error::Configuration(
                "no [reducers] configured; cannot ingest classifications".to_string(),
            ));
        }

        let mut report = IngestReport::default();
        for (reducer_key, task_key) in &self.config.reducers {
            let rows = self
                .catalog
                .list_classifications(self.config.workflow_id, reducer_key)?;
            tracing::debug!(
                reducer = %reducer_key,
                task = %task_key,
                rows = rows.len(),
                "pulled reducer output"
            );
            report.pulled += rows.len();
            for row in rows {
                if let Err(err) = self.ingest_row(&row, &mut report) {
                    tracing::warn!(classification = row.id, error = %err, "ingest failed");
                    report.failures.push(SyncFailure {
                        entity: row.id.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            pulled = report.pulled,
            linked = report.linked,
            duplicates = report.duplicates,
            unknown = report.unknown,
            retired = report.retired,
            "classification ingest complete"
        );
        Ok(report)
    }

    fn ingest_row(&self, row: &RemoteClassification, report: &mut IngestReport) -> Result<()> {
        let Some(item) = self.store.item_by_remote_id(row.remote_item_id)? else {
            tracing::debug!(
                remote_item_id = row.remote_item_id,
                "classification for untracked item, skipped"
            );
            report.unknown += 1;
            return Ok(());
        };

        let classification = Classification {
            remote_classification_id: row.id,
            item_id: item.id.clone(),
            reducer_key: row.reducer_key.clone(),
            answer_index: row.answer_index,
        };
        if self.store.record_classification(&classification)? {
            report.linked += 1;
        } else {
            report.duplicates += 1;
        }

        if !item.retired
            && self
                .catalog
                .item_retired(self.config.workflow_id, row.remote_item_id)?
        {
            self.store.mark_retired(&item.id)?;
            report.retired += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::Item;

    fn config() -> StampsyncConfig {
        let mut config = StampsyncConfig {
            project_id: 9000,
            workflow_id: 4051,
            ..StampsyncConfig::default()
        };
        config
            .reducers
            .insert("consensus".to_string(), "T0".to_string());
        config
    }

    fn seeded() -> (LocalStore, MemoryCatalog, StampsyncConfig, Item, i64) {
        let store = LocalStore::open_in_memory().unwrap();
        let catalog = MemoryCatalog::new();
        let remote_id = catalog.seed_item(Some("fp-1"), &[]);
        let mut item = Item::new("fp-1", "a");
        item.remote_id = Some(remote_id);
        store.insert_item(&item).unwrap();
        (store, catalog, config(), item, remote_id)
    }

    #[test]
    fn test_ingest_links_and_counts() {
        let (store, catalog, config, item, remote_id) = seeded();
        catalog.seed_classification(900, remote_id, "consensus", 1);
        catalog.seed_classification(901, remote_id, "consensus", 0);
        catalog.seed_classification(902, 777_777, "consensus", 1);
        catalog.seed_classification(903, remote_id, "other-reducer", 1);

        let ingest = ClassificationIngest::new(&store, &catalog, &config);
        let report = ingest.run().unwrap();

        assert_eq!(report.pulled, 3);
        assert_eq!(report.linked, 2);
        assert_eq!(report.unknown, 1);
        assert!(report.failures.is_empty());
        assert_eq!(store.classification_count(&item.id).unwrap(), 2);
    }

    #[test]
    fn test_ingest_idempotent_under_redelivery() {
        let (store, catalog, config, item, remote_id) = seeded();
        catalog.seed_classification(900, remote_id, "consensus", 1);

        let ingest = ClassificationIngest::new(&store, &catalog, &config);
        let first = ingest.run().unwrap();
        assert_eq!(first.linked, 1);

        let second = ingest.run().unwrap();
        assert_eq!(second.linked, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.classification_count(&item.id).unwrap(), 1);
    }

    #[test]
    fn test_ingest_refreshes_retirement() {
        let (store, catalog, config, item, remote_id) = seeded();
        catalog.seed_classification(900, remote_id, "consensus", 1);
        catalog.set_retired(remote_id, true);

        let ingest = ClassificationIngest::new(&store, &catalog, &config);
        let report = ingest.run().unwrap();

        assert_eq!(report.retired, 1);
        assert!(store.item(&item.id).unwrap().unwrap().retired);
    }

    #[test]
    fn test_empty_reducer_mapping_is_configuration_error() {
        let store = LocalStore::open_in_memory().unwrap();
        let catalog = MemoryCatalog::new();
        let mut config = config();
        config.reducers.clear();

        let ingest = ClassificationIngest::new(&store, &catalog, &config);
        assert!(matches!(ingest.run(), Err(Error::Configuration(_))));
    }
}
