//! SyncController: one reconciliation pass per autoscaler key.
//!
//! ```text
//! FetchAutoscaler ──not found──▶ Done
//!       │
//! FetchFleet ──not found──▶ MarkUnableToScale ──▶ Done
//!       │
//! Evaluate ──error──▶ MarkUnableToScale ──▶ Failed
//!       │
//! Clamp ──▶ MutateFleet ──▶ ReconcileStatus ──▶ Done
//! ```
//!
//! A pass only touches the copies it fetched, so passes for different keys
//! can run concurrently. Retry scheduling belongs to the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use fleetscale_state::{split_key, Fleet, FleetAutoscaler};

use crate::bounds::clamp;
use crate::error::{ScaleError, ScaleResult};
use crate::fleet::FleetMutator;
use crate::notifier::{NotificationKind, Notifier, ObjectRef};
use crate::object_store::ObjectStore;
use crate::policy::{PolicyEvaluator, ScalingPolicy};
use crate::status::StatusReconciler;
use crate::webhook::WebhookCaller;

/// The bounded decision produced by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDecision {
    pub desired: u32,
    pub limited: bool,
    pub able_to_scale: bool,
}

/// How a successful pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The autoscaler no longer exists (or the key is malformed).
    AutoscalerMissing,
    /// The target fleet does not exist; the status was reset.
    FleetMissing,
    /// The policy ran to completion.
    Reconciled {
        decision: ScaleDecision,
        fleet_updated: bool,
        status_updated: bool,
    },
}

pub struct SyncController {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    evaluator: PolicyEvaluator,
    fleets: FleetMutator,
    statuses: StatusReconciler,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        webhook: Arc<dyn WebhookCaller>,
    ) -> Self {
        Self {
            evaluator: PolicyEvaluator::new(webhook),
            fleets: FleetMutator::new(store.clone(), notifier.clone()),
            statuses: StatusReconciler::new(store.clone(), notifier.clone()),
            store,
            notifier,
        }
    }

    /// Keys of every autoscaler the store knows about.
    pub fn autoscaler_keys(&self) -> ScaleResult<Vec<String>> {
        Ok(self.store.list_autoscaler_keys()?)
    }

    /// Run one reconciliation pass for `key` (`namespace/name`).
    pub async fn sync(&self, key: &str) -> ScaleResult<SyncOutcome> {
        if split_key(key).is_none() {
            debug!(%key, "ignoring malformed autoscaler key");
            return Ok(SyncOutcome::AutoscalerMissing);
        }

        let Some(fas) = self.store.get_autoscaler(key)? else {
            debug!(%key, "autoscaler gone, nothing to do");
            return Ok(SyncOutcome::AutoscalerMissing);
        };

        let fleet_key = fas.fleet_key();
        let Some(fleet) = self.store.get_fleet(&fleet_key)? else {
            self.notifier.emit(
                &ObjectRef::of(&fas),
                NotificationKind::FailedGetFleet,
                format!("could not fetch fleet: {}", fas.spec.fleet_name),
            );
            self.statuses.mark_unable_to_scale(&fas)?;
            return Ok(SyncOutcome::FleetMissing);
        };

        let (raw, decision) = match self.decide(&fas, &fleet).await {
            Ok(decided) => decided,
            Err(err) => return Err(self.fail_evaluation(&fas, err)),
        };

        let fleet_updated = self.fleets.reconcile_replicas(&fas, &fleet, decision.desired)?;
        let status_updated = self.statuses.reconcile_status(
            &fas,
            fleet.status.replicas,
            decision.desired,
            decision.able_to_scale,
            decision.limited,
        )?;

        debug!(
            %key,
            raw,
            desired = decision.desired,
            limited = decision.limited,
            fleet_updated,
            status_updated,
            "autoscaler synced"
        );
        Ok(SyncOutcome::Reconciled {
            decision,
            fleet_updated,
            status_updated,
        })
    }

    /// Evaluate the policy and clamp the result. Returns the raw target
    /// alongside the bounded decision.
    async fn decide(&self, fas: &FleetAutoscaler, fleet: &Fleet) -> ScaleResult<(u32, ScaleDecision)> {
        let policy = ScalingPolicy::try_from(&fas.spec.policy)?;
        let raw = self.evaluator.evaluate(&policy, fleet).await?;
        let (min, max) = policy.bounds();
        let (desired, limited) = clamp(raw, min, max);
        Ok((
            raw,
            ScaleDecision {
                desired,
                limited,
                able_to_scale: true,
            },
        ))
    }

    /// Record an evaluation failure and hand the original error back.
    fn fail_evaluation(&self, fas: &FleetAutoscaler, err: ScaleError) -> ScaleError {
        self.notifier.emit(
            &ObjectRef::of(fas),
            NotificationKind::FailedEvaluation,
            format!("Error calculating desired fleet size: {err}"),
        );
        if let Err(status_err) = self.statuses.mark_unable_to_scale(fas) {
            warn!(
                autoscaler = %fas.metadata.key(),
                error = %status_err,
                "failed to record unable-to-scale status"
            );
        }
        err
    }
}
