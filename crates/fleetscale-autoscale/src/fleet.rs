//! Fleet replica mutation.

use std::sync::Arc;

use tracing::debug;

use fleetscale_state::{Fleet, FleetAutoscaler};

use crate::error::ScaleResult;
use crate::notifier::{NotificationKind, Notifier, ObjectRef};
use crate::object_store::ObjectStore;

/// Writes a new replica count to the target fleet when it changed.
#[derive(Clone)]
pub struct FleetMutator {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
}

impl FleetMutator {
    pub fn new(store: Arc<dyn ObjectStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Set `fleet.spec.replicas` to `desired`.
    ///
    /// Returns whether a write was issued. Store errors (including
    /// conflicts) propagate untouched; nothing is retried here.
    pub fn reconcile_replicas(
        &self,
        fas: &FleetAutoscaler,
        fleet: &Fleet,
        desired: u32,
    ) -> ScaleResult<bool> {
        let current = fleet.spec.replicas;
        if current == desired {
            return Ok(false);
        }

        let mut next = fleet.clone();
        next.spec.replicas = desired;
        self.store.update_fleet(&next)?;

        debug!(
            fleet = %fleet.metadata.key(),
            from = current,
            to = desired,
            "fleet replicas updated"
        );
        self.notifier.emit(
            &ObjectRef::of(fas),
            NotificationKind::ScalingFleet,
            format!(
                "Scaling fleet {} from {current} to {desired}",
                fleet.metadata.name
            ),
        );
        Ok(true)
    }
}
