//! Autoscaler status reconciliation.
//!
//! The next status is always computed in full and compared field by field
//! with the persisted one; a write is issued only when something changed.
//! Reconciling a stable fleet therefore produces no writes at all.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use fleetscale_state::{FleetAutoscaler, FleetAutoscalerStatus};

use crate::error::ScaleResult;
use crate::notifier::{NotificationKind, Notifier, ObjectRef};
use crate::object_store::ObjectStore;

#[derive(Clone)]
pub struct StatusReconciler {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Record the outcome of a pass. Returns whether a write was issued.
    ///
    /// `lastScaleTime` is stamped only when a write happens and
    /// `current != desired`.
    pub fn reconcile_status(
        &self,
        fas: &FleetAutoscaler,
        current_replicas: u32,
        desired_replicas: u32,
        able_to_scale: bool,
        scaling_limited: bool,
    ) -> ScaleResult<bool> {
        let previous = &fas.status;
        let mut next = FleetAutoscalerStatus {
            current_replicas,
            desired_replicas,
            able_to_scale,
            scaling_limited,
            last_scale_time: previous.last_scale_time,
        };
        if next == *previous {
            return Ok(false);
        }
        if current_replicas != desired_replicas {
            next.last_scale_time = Some(epoch_secs());
        }

        self.write(fas, next.clone())?;

        let object = ObjectRef::of(fas);
        if previous.able_to_scale && !next.able_to_scale {
            self.notifier.emit(
                &object,
                NotificationKind::UnableToScale,
                format!("Fleet {} can no longer be scaled", fas.spec.fleet_name),
            );
        } else if next.scaling_limited {
            self.notifier.emit(
                &object,
                NotificationKind::ScalingLimited,
                format!(
                    "Scaling fleet {} was limited to {desired_replicas} replicas",
                    fas.spec.fleet_name
                ),
            );
        }
        Ok(true)
    }

    /// Reset the status to "cannot scale": zero counts, no flags, no
    /// timestamp. Same idempotent-write rule as [`Self::reconcile_status`].
    pub fn mark_unable_to_scale(&self, fas: &FleetAutoscaler) -> ScaleResult<bool> {
        let next = FleetAutoscalerStatus {
            current_replicas: 0,
            desired_replicas: 0,
            able_to_scale: false,
            scaling_limited: false,
            last_scale_time: None,
        };
        if next == fas.status {
            return Ok(false);
        }
        self.write(fas, next)?;
        Ok(true)
    }

    fn write(&self, fas: &FleetAutoscaler, status: FleetAutoscalerStatus) -> ScaleResult<()> {
        let mut next = fas.clone();
        next.status = status;
        self.store.update_autoscaler_status(&next)?;
        debug!(
            autoscaler = %fas.metadata.key(),
            current = next.status.current_replicas,
            desired = next.status.desired_replicas,
            able_to_scale = next.status.able_to_scale,
            scaling_limited = next.status.scaling_limited,
            "autoscaler status updated"
        );
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use fleetscale_state::*;

    fn setup() -> (StateStore, Arc<RecordingNotifier>, StatusReconciler) {
        let store = StateStore::open_in_memory().unwrap();
        let recorder = Arc::new(RecordingNotifier::new());
        let reconciler = StatusReconciler::new(Arc::new(store.clone()), recorder.clone());
        (store, recorder, reconciler)
    }

    fn stored_autoscaler(store: &StateStore, status: FleetAutoscalerStatus) -> FleetAutoscaler {
        let fas = FleetAutoscaler {
            metadata: ObjectMeta::new("default", "fas-1"),
            spec: FleetAutoscalerSpec {
                fleet_name: "fleet-1".to_string(),
                policy: FleetAutoscalerPolicy {
                    policy_type: PolicyType::Buffer,
                    buffer: Some(BufferPolicy {
                        buffer_size: BufferSize::Int(5),
                        min_replicas: 0,
                        max_replicas: 100,
                    }),
                    webhook: None,
                },
            },
            status,
        };
        store.create_autoscaler(&fas).unwrap()
    }

    fn reload(store: &StateStore) -> FleetAutoscaler {
        store.get_autoscaler("default/fas-1").unwrap().unwrap()
    }

    #[test]
    fn must_update() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(&store, FleetAutoscalerStatus::default());

        assert!(reconciler.reconcile_status(&fas, 10, 20, true, false).unwrap());

        let status = reload(&store).status;
        assert!(status.able_to_scale);
        assert!(!status.scaling_limited);
        assert_eq!(status.current_replicas, 10);
        assert_eq!(status.desired_replicas, 20);
        assert!(status.last_scale_time.is_some());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn must_not_update() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(
            &store,
            FleetAutoscalerStatus {
                current_replicas: 10,
                desired_replicas: 20,
                able_to_scale: true,
                scaling_limited: false,
                last_scale_time: None,
            },
        );

        assert!(!reconciler.reconcile_status(&fas, 10, 20, true, false).unwrap());

        let stored = reload(&store);
        assert_eq!(stored.metadata.resource_version, 1);
        assert!(stored.status.last_scale_time.is_none());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn update_with_a_scaling_limit() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(&store, FleetAutoscalerStatus::default());

        reconciler.reconcile_status(&fas, 10, 20, true, true).unwrap();

        assert_eq!(recorder.kinds(), vec![NotificationKind::ScalingLimited]);
    }

    #[test]
    fn flag_change_alone_does_not_stamp_time() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(
            &store,
            FleetAutoscalerStatus {
                current_replicas: 100,
                desired_replicas: 100,
                able_to_scale: true,
                scaling_limited: false,
                last_scale_time: Some(1000),
            },
        );

        assert!(reconciler.reconcile_status(&fas, 100, 100, true, true).unwrap());

        let status = reload(&store).status;
        assert!(status.scaling_limited);
        assert_eq!(status.last_scale_time, Some(1000));
        assert_eq!(recorder.kinds(), vec![NotificationKind::ScalingLimited]);
    }

    #[test]
    fn losing_ability_to_scale_notifies_instead_of_limit() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(
            &store,
            FleetAutoscalerStatus {
                current_replicas: 10,
                desired_replicas: 10,
                able_to_scale: true,
                scaling_limited: false,
                last_scale_time: Some(1000),
            },
        );

        assert!(reconciler.reconcile_status(&fas, 10, 10, false, true).unwrap());

        let status = reload(&store).status;
        assert!(!status.able_to_scale);
        assert_eq!(status.last_scale_time, Some(1000));
        assert_eq!(recorder.kinds(), vec![NotificationKind::UnableToScale]);
    }

    #[test]
    fn unable_to_scale_must_update() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(
            &store,
            FleetAutoscalerStatus {
                current_replicas: 5,
                desired_replicas: 10,
                able_to_scale: true,
                scaling_limited: true,
                last_scale_time: Some(1000),
            },
        );

        assert!(reconciler.mark_unable_to_scale(&fas).unwrap());

        let status = reload(&store).status;
        assert!(!status.able_to_scale);
        assert!(!status.scaling_limited);
        assert_eq!(status.current_replicas, 0);
        assert_eq!(status.desired_replicas, 0);
        assert!(status.last_scale_time.is_none());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn unable_to_scale_must_not_update() {
        let (store, recorder, reconciler) = setup();
        let fas = stored_autoscaler(&store, FleetAutoscalerStatus::default());

        assert!(!reconciler.mark_unable_to_scale(&fas).unwrap());
        assert_eq!(reload(&store).metadata.resource_version, 1);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn stale_autoscaler_conflicts() {
        let (store, _recorder, reconciler) = setup();
        let fas = stored_autoscaler(&store, FleetAutoscalerStatus::default());
        store.put_autoscaler(&fas).unwrap();

        let err = reconciler
            .reconcile_status(&fas, 1, 2, true, false)
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
