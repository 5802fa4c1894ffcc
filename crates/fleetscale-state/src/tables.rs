//! redb table definitions for the fleetscale object store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized objects).
//! Keys follow the pattern `{namespace}/{name}`.

use redb::TableDefinition;

/// Fleets keyed by `{namespace}/{name}`.
pub const FLEETS: TableDefinition<&str, &[u8]> = TableDefinition::new("fleets");

/// Fleet autoscalers keyed by `{namespace}/{name}`.
pub const FLEET_AUTOSCALERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("fleet_autoscalers");
