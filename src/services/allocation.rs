//! Confidence-bucket allocation.
//!
//! Partitions the confidence interval `[0, 1]` into N contiguous buckets of
//! equal width and maps each scored item to the priority group for its
//! bucket. The engine is pure planning: it reads local state, emits intents,
//! and never talks to the remote catalog. The orchestrator executes the
//! intents.

use tracing::instrument;

use crate::config::WEIGHT_SUM_TOLERANCE;
use crate::models::{Group, Item, MembershipChange, RemoteWorkflowId, WeightChange};
use crate::{Error, Result};

/// Maps a confidence score to its bucket index under an N-bucket partition.
///
/// `floor(confidence * n)`, clamped to `[0, n - 1]` so that a confidence of
/// exactly `1.0` lands in the top bucket instead of one past it.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bucket_for(confidence: f64, bucket_count: u32) -> u32 {
    let raw = (confidence * f64::from(bucket_count)).floor();
    let clamped = raw.clamp(0.0, f64::from(bucket_count - 1));
    clamped as u32
}

/// Membership intents for one allocation pass.
#[derive(Debug, Default)]
pub struct AllocationPlan {
    /// Moves to apply, one per item whose placement is stale.
    pub changes: Vec<MembershipChange>,
    /// Items left alone because their placement already matches.
    pub unchanged: usize,
    /// Items skipped because they carry no confidence score.
    pub unscored: usize,
}

/// Ladder maintenance intents: which priority ranks have no group yet and
/// which existing groups fall beyond the configured ladder size.
#[derive(Debug, Default)]
pub struct LadderPlan {
    /// Ranks (1-based) with no live local group.
    pub missing_ranks: Vec<u32>,
    /// Groups ranked past the configured size, to be unlinked from the
    /// workflow. Never deleted.
    pub surplus: Vec<Group>,
}

/// Plans confidence-bucket placements and ladder maintenance.
pub struct AllocationEngine {
    workflow_id: RemoteWorkflowId,
    bucket_count: u32,
}

impl AllocationEngine {
    /// Creates an engine for a workflow with the configured bucket count.
    #[must_use]
    pub const fn new(workflow_id: RemoteWorkflowId, bucket_count: u32) -> Self {
        Self {
            workflow_id,
            bucket_count,
        }
    }

    /// Compares the live ladder against the configured size.
    ///
    /// `ladder` is the workflow's live priority groups sorted by rank, as the
    /// store returns them.
    #[must_use]
    pub fn plan_ladder(&self, ladder: &[Group]) -> LadderPlan {
        let mut plan = LadderPlan::default();
        for rank in 1..=self.bucket_count {
            if !ladder.iter().any(|g| g.priority == Some(rank)) {
                plan.missing_ranks.push(rank);
            }
        }
        plan.surplus = ladder
            .iter()
            .filter(|g| g.priority.is_none_or(|rank| rank > self.bucket_count))
            .cloned()
            .collect();
        plan
    }

    /// Plans membership moves for a batch of items.
    ///
    /// Unscored items are left in place; retired items are frozen. With
    /// `force` unset, an item is re-planned only when it is unassigned or
    /// its confidence moved since the recorded allocation baseline, so a
    /// placement adopted from the remote catalog sticks until the score
    /// changes. `force` recomputes everything, used when the bucket count
    /// changed and every boundary moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] when the ladder does not cover
    /// every bucket.
    #[instrument(skip(self, items, ladder), fields(items = items.len()))]
    pub fn plan_memberships(
        &self,
        items: &[Item],
        ladder: &[Group],
        force: bool,
    ) -> Result<AllocationPlan> {
        if ladder.len() != self.bucket_count as usize {
            return Err(Error::InvariantViolation(format!(
                "workflow {} ladder has {} groups, expected {}",
                self.workflow_id,
                ladder.len(),
                self.bucket_count
            )));
        }

        let mut plan = AllocationPlan::default();
        for item in items {
            if item.retired {
                continue;
            }
            let Some(confidence) = item.confidence else {
                plan.unscored += 1;
                continue;
            };
            let stale = force
                || item.group_id.is_none()
                || item.allocated_confidence != Some(confidence);
            if !stale {
                plan.unchanged += 1;
                continue;
            }
            let bucket = bucket_for(confidence, self.bucket_count);
            let target = &ladder[bucket as usize];
            if item.group_id.as_ref() == Some(&target.id) && item.allocated_bucket == Some(bucket)
            {
                plan.unchanged += 1;
                continue;
            }
            plan.changes.push(MembershipChange {
                item_id: item.id.clone(),
                from: item.group_id.clone(),
                to: target.id.clone(),
                bucket,
            });
        }
        tracing::debug!(
            moves = plan.changes.len(),
            unchanged = plan.unchanged,
            unscored = plan.unscored,
            "allocation planned"
        );
        Ok(plan)
    }

    /// Validates and assigns selection weights across the ladder.
    ///
    /// Weights are given in ascending rank order and must cover the ladder
    /// exactly, sum to 1 within tolerance, and be non-negative. Validation
    /// failures reject the whole batch; weights are never partially applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] on any validation failure,
    /// including a ladder group that has not been created remotely yet.
    pub fn assign_weights(&self, ladder: &[Group], weights: &[f64]) -> Result<Vec<WeightChange>> {
        if weights.len() != self.bucket_count as usize || ladder.len() != weights.len() {
            return Err(Error::InvariantViolation(format!(
                "expected {} weights for {} ladder groups, found {}",
                self.bucket_count,
                ladder.len(),
                weights.len()
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvariantViolation(format!(
                "selection weights must sum to 1, found {sum}"
            )));
        }
        if weights.iter().any(|w| *w < 0.0) {
            return Err(Error::InvariantViolation(
                "selection weights must be non-negative".to_string(),
            ));
        }

        let mut changes = Vec::with_capacity(weights.len());
        for (group, weight) in ladder.iter().zip(weights) {
            let remote_group_id = group.remote_id.ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "group '{}' has no remote counterpart to weight",
                    group.display_name
                ))
            })?;
            changes.push(WeightChange {
                group_id: group.id.clone(),
                remote_group_id,
                workflow_id: self.workflow_id,
                weight: *weight,
            });
        }
        Ok(changes)
    }
}
