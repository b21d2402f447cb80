//! End-to-end cycles against an in-memory catalog and an on-disk store.

use stampsync::catalog::MemoryCatalog;
use stampsync::config::StampsyncConfig;
use stampsync::models::{Item, priority_group_name};
use stampsync::services::ClassificationIngest;
use stampsync::{LocalStore, Scope, SyncMode, SyncOrchestrator};
use tempfile::TempDir;

const PROJECT: i64 = 9000;
const WORKFLOW: i64 = 4051;

fn config() -> StampsyncConfig {
    let mut config = StampsyncConfig {
        project_id: PROJECT,
        workflow_id: WORKFLOW,
        retry_backoff_ms: 0,
        ..StampsyncConfig::default()
    };
    config
        .reducers
        .insert("consensus".to_string(), "T0".to_string());
    config
}

fn disk_store(dir: &TempDir) -> LocalStore {
    LocalStore::open(&dir.path().join("stampsync.db")).unwrap()
}

fn run_sync(store: &LocalStore, catalog: &MemoryCatalog, config: &StampsyncConfig) {
    let orchestrator = SyncOrchestrator::new(store, catalog, config);
    let report = orchestrator
        .run(SyncMode::Sync, Scope::Project(PROJECT))
        .unwrap();
    assert!(report.is_clean(), "unexpected failures: {}", report.summary());
}

#[test]
fn full_cycle_places_items_by_confidence() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    // N=3: 0.2 -> bucket 0, 0.5 -> bucket 1, 0.99 and 1.0 -> bucket 2
    let cases = [("fp-a", 0.2, 0), ("fp-b", 0.5, 1), ("fp-c", 0.99, 2), ("fp-d", 1.0, 2)];
    for (fp, confidence, _) in cases {
        store
            .insert_item(&Item::new(fp, format!("https://stamps.example/{fp}.png"))
                .with_confidence(confidence))
            .unwrap();
    }

    run_sync(&store, &catalog, &config);

    let ladder = store.priority_groups(WORKFLOW).unwrap();
    assert_eq!(ladder.len(), 3);
    for (fp, _, bucket) in cases {
        let item = store.item_by_fingerprint(fp).unwrap().unwrap();
        assert_eq!(item.allocated_bucket, Some(bucket), "{fp}");
        assert_eq!(item.group_id, Some(ladder[bucket as usize].id.clone()), "{fp}");
        assert!(item.remote_id.is_some());
    }

    // remote placements mirror local ones
    for remote in catalog.items() {
        assert_eq!(remote.group_ids.len(), 1);
    }
}

#[test]
fn repeated_cycles_converge_without_remote_writes() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.4))
        .unwrap();
    store
        .insert_item(&Item::new("fp-2", "b").with_confidence(0.9))
        .unwrap();

    run_sync(&store, &catalog, &config);
    let after_first = catalog.mutation_count();

    run_sync(&store, &catalog, &config);
    run_sync(&store, &catalog, &config);
    assert_eq!(catalog.mutation_count(), after_first);
}

#[test]
fn out_of_band_remote_move_is_adopted_without_remote_calls() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.1))
        .unwrap();
    run_sync(&store, &catalog, &config);

    // an operator drags the item into the top group through the web UI
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    let ladder = store.priority_groups(WORKFLOW).unwrap();
    let top_remote = ladder[2].remote_id.unwrap();
    catalog.force_move(item.remote_id.unwrap(), top_remote);

    let before = catalog.mutation_count();
    run_sync(&store, &catalog, &config);
    // the remote placement won and no repair traffic was issued
    assert_eq!(catalog.mutation_count(), before);
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert_eq!(item.group_id, Some(ladder[2].id.clone()));
    assert_eq!(item.allocated_bucket, Some(2));
}

#[test]
fn dangling_remote_twin_is_bound_and_placed() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    // remote item exists, unassigned, created by some other process
    let dangling = catalog.seed_item(Some("fp-1"), &[]);
    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.5))
        .unwrap();

    run_sync(&store, &catalog, &config);

    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert_eq!(item.remote_id, Some(dangling));
    assert_eq!(item.allocated_bucket, Some(1));
    // never a second remote item for the same fingerprint
    assert_eq!(
        catalog
            .items()
            .iter()
            .filter(|r| r.fingerprint.as_deref() == Some("fp-1"))
            .count(),
        1
    );
}

#[test]
fn bucket_count_change_reallocates_everything_but_retired() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let mut config = config();

    store
        .insert_item(&Item::new("fp-live", "a").with_confidence(0.6))
        .unwrap();
    store
        .insert_item(&Item::new("fp-done", "b").with_confidence(0.6))
        .unwrap();
    run_sync(&store, &catalog, &config);

    // retire one of the two before the boundary change
    let done = store.item_by_fingerprint("fp-done").unwrap().unwrap();
    catalog.set_retired(done.remote_id.unwrap(), true);
    run_sync(&store, &catalog, &config);
    let done = store.item_by_fingerprint("fp-done").unwrap().unwrap();
    assert!(done.retired);
    let frozen_group = done.group_id.clone();

    config.num_priority_groups = 4;
    config.selection_weights = vec![0.7, 0.1, 0.1, 0.1];
    run_sync(&store, &catalog, &config);

    let ladder = store.priority_groups(WORKFLOW).unwrap();
    assert_eq!(ladder.len(), 4);
    // 0.6 under N=4 lands in bucket 2
    let live = store.item_by_fingerprint("fp-live").unwrap().unwrap();
    assert_eq!(live.allocated_bucket, Some(2));
    assert_eq!(live.group_id, Some(ladder[2].id.clone()));
    // the retired item did not move
    let done = store.item_by_fingerprint("fp-done").unwrap().unwrap();
    assert_eq!(done.group_id, frozen_group);
}

#[test]
fn deleted_remote_group_triggers_reallocation() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.5))
        .unwrap();
    run_sync(&store, &catalog, &config);

    let ladder = store.priority_groups(WORKFLOW).unwrap();
    let middle_remote = ladder[1].remote_id.unwrap();
    catalog.delete_group(middle_remote);

    run_sync(&store, &catalog, &config);

    // ladder was rebuilt and the item re-placed
    let rebuilt = store.priority_groups(WORKFLOW).unwrap();
    assert_eq!(rebuilt.len(), 3);
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert_eq!(item.allocated_bucket, Some(1));
    assert_eq!(item.group_id, Some(rebuilt[1].id.clone()));
    assert_ne!(rebuilt[1].id, ladder[1].id);
    let abandoned = store.group(&ladder[1].id).unwrap().unwrap();
    assert!(abandoned.abandoned);
}

#[test]
fn transient_failures_resolve_over_cycles() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.5))
        .unwrap();
    // enough injected failures to exhaust one cycle's retry budget exactly
    catalog.inject_transient("add_items_to_group", 3);

    let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
    let report = orchestrator
        .run(SyncMode::Sync, Scope::Project(PROJECT))
        .unwrap();
    // the move failed but the cycle completed and the item was uploaded
    assert_eq!(report.uploaded, 1);
    assert!(!report.is_clean());
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert!(item.remote_id.is_some());
    assert!(item.group_id.is_none());

    // next cycle, healthy remote: the deferred move lands
    run_sync(&store, &catalog, &config);
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert!(item.group_id.is_some());
    assert_eq!(item.allocated_bucket, Some(1));
}

#[test]
fn adopts_ladder_built_by_another_installation() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    for rank in 1..=3 {
        catalog.seed_group(&priority_group_name(WORKFLOW, rank), &[WORKFLOW]);
    }
    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.5))
        .unwrap();

    let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
    let report = orchestrator
        .run(SyncMode::Sync, Scope::Project(PROJECT))
        .unwrap();

    assert_eq!(report.groups_adopted, 3);
    assert_eq!(report.groups_created, 0);
    assert_eq!(store.priority_groups(WORKFLOW).unwrap().len(), 3);
}

#[test]
fn classification_cycle_records_and_retires() {
    let dir = TempDir::new().unwrap();
    let store = disk_store(&dir);
    let catalog = MemoryCatalog::new();
    let config = config();

    store
        .insert_item(&Item::new("fp-1", "a").with_confidence(0.5))
        .unwrap();
    run_sync(&store, &catalog, &config);
    let item = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    let remote_id = item.remote_id.unwrap();

    catalog.seed_classification(900, remote_id, "consensus", 1);
    catalog.seed_classification(901, remote_id, "consensus", 1);
    catalog.set_retired(remote_id, true);

    let ingest = ClassificationIngest::new(&store, &catalog, &config);
    let report = ingest.run().unwrap();
    assert_eq!(report.linked, 2);
    assert_eq!(report.retired, 1);

    // re-delivery changes nothing
    let again = ingest.run().unwrap();
    assert_eq!(again.linked, 0);
    assert_eq!(again.duplicates, 2);
    assert_eq!(store.classification_count(&item.id).unwrap(), 2);

    // a retired item's membership is frozen across further cycles
    let before = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    run_sync(&store, &catalog, &config);
    let after = store.item_by_fingerprint("fp-1").unwrap().unwrap();
    assert_eq!(before.group_id, after.group_id);
}
