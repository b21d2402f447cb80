//! Business logic services.
//!
//! The engines are layered: [`AllocationEngine`] is pure planning over local
//! state, [`ReconciliationEngine`] repairs drift between the local store and
//! the remote catalog, [`ClassificationIngest`] folds reducer output back into
//! the store, and [`SyncOrchestrator`] sequences all of them into one cycle.

mod allocation;
mod classifications;
mod reconcile;
mod sync;

pub use allocation::{AllocationEngine, AllocationPlan, LadderPlan, bucket_for};
pub use classifications::{ClassificationIngest, IngestReport};
pub use reconcile::ReconciliationEngine;
pub use sync::{SyncFailure, SyncMode, SyncOrchestrator, SyncReport};
