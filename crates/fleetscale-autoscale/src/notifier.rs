//! Operator-facing notifications.
//!
//! Every condition an operator should see (a fleet was scaled, bounds
//! clamped a decision, the target fleet is missing) goes through a
//! [`Notifier`] injected at construction. Emitting is fire-and-forget and
//! must never block a reconciliation pass.

use std::fmt;
use std::sync::Mutex;

use tracing::{info, warn};

use fleetscale_state::StoredObject;

/// Severity of a notification, mirroring Kubernetes event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The fleet's replica count was changed.
    ScalingFleet,
    /// Min/max bounds clamped the policy's decision.
    ScalingLimited,
    /// The target fleet does not exist.
    FailedGetFleet,
    /// The policy could not produce a decision.
    FailedEvaluation,
    /// The autoscaler went from able to unable to scale.
    UnableToScale,
}

impl NotificationKind {
    /// Machine-readable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            NotificationKind::ScalingFleet => "AutoScalingFleet",
            NotificationKind::ScalingLimited => "ScalingLimited",
            NotificationKind::FailedGetFleet => "FailedGetFleet",
            NotificationKind::FailedEvaluation => "FailedEvaluation",
            NotificationKind::UnableToScale => "UnableToScale",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            NotificationKind::ScalingFleet => EventType::Normal,
            NotificationKind::ScalingLimited
            | NotificationKind::FailedGetFleet
            | NotificationKind::FailedEvaluation
            | NotificationKind::UnableToScale => EventType::Warning,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Identifies the object a notification is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn of<T: StoredObject>(obj: &T) -> Self {
        Self {
            kind: T::KIND,
            namespace: obj.metadata().namespace.clone(),
            name: obj.metadata().name.clone(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A single emitted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub object: ObjectRef,
    pub kind: NotificationKind,
    pub message: String,
}

/// Sink for operator-facing notifications.
pub trait Notifier: Send + Sync {
    fn emit(&self, object: &ObjectRef, kind: NotificationKind, message: String);
}

/// Publishes notifications as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, object: &ObjectRef, kind: NotificationKind, message: String) {
        match kind.event_type() {
            EventType::Normal => info!(object = %object, reason = %kind, "{message}"),
            EventType::Warning => warn!(object = %object, reason = %kind, "{message}"),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    /// Emitted kinds, in order.
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.lock().iter().map(|n| n.kind).collect()
    }

    /// Drain and return everything emitted so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        // A poisoned recorder still holds valid notifications.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, object: &ObjectRef, kind: NotificationKind, message: String) {
        self.lock().push(Notification {
            object: object.clone(),
            kind,
            message,
        });
    }
}
