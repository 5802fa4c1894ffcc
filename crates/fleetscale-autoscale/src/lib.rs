//! fleetscale-autoscale: fleet autoscaling decisions.
//!
//! Reads a `FleetAutoscaler` and its target `Fleet`, evaluates the
//! autoscaler's policy, clamps the result into the policy bounds, and
//! writes the fleet and autoscaler status back only when something
//! actually changed.
//!
//! # Scaling Algorithm
//!
//! ```text
//! raw     = buffer:  allocated + bufferSize (absolute or % of replicas)
//!           webhook: response.replicas if response.scale else spec.replicas
//! desired = max(min, min(raw, max))
//! limited = desired != raw
//!
//! if fleet.spec.replicas != desired:
//!     update fleet, notify AutoScalingFleet
//! if status != {fleet.status.replicas, desired, true, limited}:
//!     update status (stamp lastScaleTime if replicas != desired)
//! ```
//!
//! Operator-visible conditions go through an injected [`Notifier`]; hard
//! errors are returned to the caller, which owns retries.

pub mod bounds;
pub mod controller;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod notifier;
pub mod object_store;
pub mod policy;
pub mod status;
pub mod webhook;

pub use bounds::clamp;
pub use controller::{ScaleDecision, SyncController, SyncOutcome};
pub use driver::{RoundReport, SyncLoop};
pub use error::{ScaleError, ScaleResult};
pub use fleet::FleetMutator;
pub use notifier::{
    EventType, Notification, NotificationKind, Notifier, ObjectRef, RecordingNotifier,
    TracingNotifier,
};
pub use object_store::ObjectStore;
pub use policy::{PolicyEvaluator, ScalingPolicy};
pub use status::StatusReconciler;
pub use webhook::{HttpWebhookCaller, WebhookCaller, WebhookError, WebhookResponse};
