//! StateStore: redb-backed persistence for fleets and fleet autoscalers.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. Writes
//! that act on an existing object are compare-and-swap on
//! `metadata.resourceVersion`, checked and bumped inside a single write
//! transaction. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

type ObjectTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(FLEETS).map_err(map_err!(Table))?;
        txn.open_table(FLEET_AUTOSCALERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Fleets ─────────────────────────────────────────────────────

    /// Create a fleet. Fails if one already exists under the same key.
    pub fn create_fleet(&self, fleet: &Fleet) -> StateResult<Fleet> {
        self.create(FLEETS, fleet)
    }

    /// Insert or replace a fleet regardless of its resource version.
    pub fn put_fleet(&self, fleet: &Fleet) -> StateResult<Fleet> {
        self.put(FLEETS, fleet)
    }

    /// Get a fleet by `namespace/name` key.
    pub fn get_fleet(&self, key: &str) -> StateResult<Option<Fleet>> {
        self.get(FLEETS, key)
    }

    /// List all fleets.
    pub fn list_fleets(&self) -> StateResult<Vec<Fleet>> {
        self.list(FLEETS)
    }

    /// Delete a fleet by key. Returns true if it existed.
    pub fn delete_fleet(&self, key: &str) -> StateResult<bool> {
        self.delete(FLEETS, key)
    }

    /// Replace a fleet's spec, keeping the stored status.
    ///
    /// The caller's `resourceVersion` must match the stored one.
    pub fn update_fleet(&self, fleet: &Fleet) -> StateResult<Fleet> {
        self.compare_and_swap(FLEETS, fleet, |stored: &mut Fleet| {
            stored.spec = fleet.spec.clone();
        })
    }

    /// Replace a fleet's status, keeping the stored spec.
    pub fn update_fleet_status(&self, fleet: &Fleet) -> StateResult<Fleet> {
        self.compare_and_swap(FLEETS, fleet, |stored: &mut Fleet| {
            stored.status = fleet.status.clone();
        })
    }

    // ── Fleet autoscalers ──────────────────────────────────────────

    /// Create a fleet autoscaler. Fails if one already exists.
    pub fn create_autoscaler(&self, fas: &FleetAutoscaler) -> StateResult<FleetAutoscaler> {
        self.create(FLEET_AUTOSCALERS, fas)
    }

    /// Insert or replace an autoscaler regardless of its resource version.
    pub fn put_autoscaler(&self, fas: &FleetAutoscaler) -> StateResult<FleetAutoscaler> {
        self.put(FLEET_AUTOSCALERS, fas)
    }

    /// Get an autoscaler by `namespace/name` key.
    pub fn get_autoscaler(&self, key: &str) -> StateResult<Option<FleetAutoscaler>> {
        self.get(FLEET_AUTOSCALERS, key)
    }

    /// List all autoscalers.
    pub fn list_autoscalers(&self) -> StateResult<Vec<FleetAutoscaler>> {
        self.list(FLEET_AUTOSCALERS)
    }

    /// List the keys of all autoscalers without decoding them.
    pub fn list_autoscaler_keys(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(FLEET_AUTOSCALERS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    /// Delete an autoscaler by key. Returns true if it existed.
    pub fn delete_autoscaler(&self, key: &str) -> StateResult<bool> {
        self.delete(FLEET_AUTOSCALERS, key)
    }

    /// Replace an autoscaler's status, keeping the stored spec.
    ///
    /// The caller's `resourceVersion` must match the stored one.
    pub fn update_autoscaler_status(&self, fas: &FleetAutoscaler) -> StateResult<FleetAutoscaler> {
        self.compare_and_swap(FLEET_AUTOSCALERS, fas, |stored: &mut FleetAutoscaler| {
            stored.status = fas.status.clone();
        })
    }

    // ── Generic object access ──────────────────────────────────────

    fn get<T: StoredObject>(&self, def: ObjectTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let obj: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }

    fn list<T: StoredObject>(&self, def: ObjectTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let obj: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(obj);
        }
        Ok(results)
    }

    fn create<T: StoredObject>(&self, def: ObjectTable, obj: &T) -> StateResult<T> {
        let key = obj.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key));
            }
            let mut stored = obj.clone();
            stored.metadata_mut().resource_version = 1;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND, %key, "object created");
        Ok(stored)
    }

    fn put<T: StoredObject>(&self, def: ObjectTable, obj: &T) -> StateResult<T> {
        let key = obj.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let current_version = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let current: T =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    current.metadata().resource_version
                }
                None => 0,
            };
            let mut stored = obj.clone();
            stored.metadata_mut().resource_version = current_version + 1;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND, %key, "object stored");
        Ok(stored)
    }

    fn delete(&self, def: ObjectTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "object deleted");
        Ok(existed)
    }

    /// Apply `patch` to the stored copy if `obj` carries the stored version.
    fn compare_and_swap<T, F>(&self, def: ObjectTable, obj: &T, patch: F) -> StateResult<T>
    where
        T: StoredObject,
        F: FnOnce(&mut T),
    {
        let key = obj.table_key();
        let expected = obj.metadata().resource_version;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let mut stored: T = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key)),
            };
            let found = stored.metadata().resource_version;
            if found != expected {
                return Err(StateError::Conflict {
                    key,
                    expected,
                    found,
                });
            }
            patch(&mut stored);
            stored.metadata_mut().resource_version = found + 1;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            kind = T::KIND,
            %key,
            version = stored.metadata().resource_version,
            "object updated"
        );
        Ok(stored)
    }
}
