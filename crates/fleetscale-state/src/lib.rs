//! fleetscale-state: object store for fleets and fleet autoscalers.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the two object kinds the autoscaler reconciles.
//!
//! # Architecture
//!
//! Objects are JSON-serialized into redb's `&[u8]` value columns and keyed
//! by `{namespace}/{name}`. Every object carries a `resourceVersion` in its
//! metadata; updates are compare-and-swap on that version so concurrent
//! writers observe [`StateError::Conflict`] instead of silently clobbering
//! each other.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
