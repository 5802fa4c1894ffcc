//! Store seam used by the controller.
//!
//! The controller only needs point reads and compare-and-swap writes; it
//! never assumes read-your-writes, so any implementation may serve stale
//! reads as long as stale writes fail with a conflict.

use fleetscale_state::{Fleet, FleetAutoscaler, StateResult, StateStore};

pub trait ObjectStore: Send + Sync {
    /// Fetch a fleet by `namespace/name`.
    fn get_fleet(&self, key: &str) -> StateResult<Option<Fleet>>;

    /// Write a fleet's spec. Fails with a conflict on a stale copy.
    fn update_fleet(&self, fleet: &Fleet) -> StateResult<Fleet>;

    /// Fetch an autoscaler by `namespace/name`.
    fn get_autoscaler(&self, key: &str) -> StateResult<Option<FleetAutoscaler>>;

    /// Write an autoscaler's status. Fails with a conflict on a stale copy.
    fn update_autoscaler_status(&self, fas: &FleetAutoscaler) -> StateResult<FleetAutoscaler>;

    /// Keys of every autoscaler, for periodic resyncs.
    fn list_autoscaler_keys(&self) -> StateResult<Vec<String>>;
}

impl ObjectStore for StateStore {
    fn get_fleet(&self, key: &str) -> StateResult<Option<Fleet>> {
        StateStore::get_fleet(self, key)
    }

    fn update_fleet(&self, fleet: &Fleet) -> StateResult<Fleet> {
        StateStore::update_fleet(self, fleet)
    }

    fn get_autoscaler(&self, key: &str) -> StateResult<Option<FleetAutoscaler>> {
        StateStore::get_autoscaler(self, key)
    }

    fn update_autoscaler_status(&self, fas: &FleetAutoscaler) -> StateResult<FleetAutoscaler> {
        StateStore::update_autoscaler_status(self, fas)
    }

    fn list_autoscaler_keys(&self) -> StateResult<Vec<String>> {
        StateStore::list_autoscaler_keys(self)
    }
}
