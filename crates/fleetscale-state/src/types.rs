//! Object types for the fleetscale store.
//!
//! These mirror the wire shape of the `Fleet` and `FleetAutoscaler`
//! resources (camelCase JSON) so the same structs decode admission
//! payloads, API bodies, and redb rows.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Namespace used when an object omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Build the `{namespace}/{name}` store key.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Split a `{namespace}/{name}` key. Returns `None` for malformed keys.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}

// ── Metadata ──────────────────────────────────────────────────────

/// Identity and concurrency token shared by every stored object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bumped by the store on every write. Zero means "never stored".
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            resource_version: 0,
        }
    }

    /// Build the composite key for the object's table.
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

/// Anything the store can persist under a `{namespace}/{name}` key.
pub trait StoredObject: Serialize + DeserializeOwned + Clone {
    /// Kind name used in logs and notifications.
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn table_key(&self) -> String {
        self.metadata().key()
    }
}

// ── Fleet ─────────────────────────────────────────────────────────

/// A horizontally scalable group of game servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fleet {
    pub metadata: ObjectMeta,
    pub spec: FleetSpec,
    #[serde(default)]
    pub status: FleetStatus,
}

/// Desired state of a fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FleetSpec {
    /// Desired number of game servers.
    #[serde(default)]
    pub replicas: u32,
}

/// Observed game server counts by phase.
///
/// `ready + allocated + reserved <= replicas` holds for any status the
/// fleet controller publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetStatus {
    pub replicas: u32,
    pub ready_replicas: u32,
    pub allocated_replicas: u32,
    pub reserved_replicas: u32,
}

impl FleetStatus {
    /// Whether the per-phase counts fit inside the total.
    pub fn is_consistent(&self) -> bool {
        let phased = u64::from(self.ready_replicas)
            + u64::from(self.allocated_replicas)
            + u64::from(self.reserved_replicas);
        phased <= u64::from(self.replicas)
    }
}

impl Fleet {
    pub fn new(namespace: &str, name: &str, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: FleetSpec { replicas },
            status: FleetStatus::default(),
        }
    }
}

impl StoredObject for Fleet {
    const KIND: &'static str = "Fleet";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── FleetAutoscaler ───────────────────────────────────────────────

/// Policy-bearing object that drives a fleet's replica count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscaler {
    pub metadata: ObjectMeta,
    pub spec: FleetAutoscalerSpec,
    #[serde(default)]
    pub status: FleetAutoscalerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscalerSpec {
    /// Name of the fleet, in the autoscaler's namespace.
    #[serde(default)]
    pub fleet_name: String,
    pub policy: FleetAutoscalerPolicy,
}

/// Policy as written by users: a type tag plus one populated variant.
///
/// The evaluator never consumes this directly; it is converted into a
/// closed sum type first so "neither" and "both" are unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscalerPolicy {
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<BufferPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookPolicy>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicyType {
    Buffer,
    Webhook,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::Buffer => f.write_str("Buffer"),
            PolicyType::Webhook => f.write_str("Webhook"),
        }
    }
}

/// Keep `buffer_size` ready servers above the allocated count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BufferPolicy {
    #[serde(default)]
    pub buffer_size: BufferSize,
    #[serde(default)]
    pub min_replicas: u32,
    #[serde(default)]
    pub max_replicas: u32,
}

/// Absolute count or percentage (`"20%"`), encoded like an int-or-string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BufferSize {
    Int(i32),
    Percent(String),
}

impl Default for BufferSize {
    fn default() -> Self {
        BufferSize::Int(0)
    }
}

impl BufferSize {
    /// Parse the percentage form. `None` for the int form or a string that
    /// is not `<digits>%`.
    pub fn percent(&self) -> Option<u32> {
        match self {
            BufferSize::Int(_) => None,
            BufferSize::Percent(s) => s.trim().strip_suffix('%')?.parse::<u32>().ok(),
        }
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferSize::Int(n) => write!(f, "{n}"),
            BufferSize::Percent(s) => f.write_str(s),
        }
    }
}

/// Delegate the replica decision to an external HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub min_replicas: u32,
    #[serde(default)]
    pub max_replicas: u32,
}

/// In-cluster service hosting a webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Last decision recorded by the autoscaler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetAutoscalerStatus {
    /// Fleet replica count observed in the last pass.
    pub current_replicas: u32,
    /// Replica count decided in the last pass.
    pub desired_replicas: u32,
    /// False when the target fleet could not be read or scaled.
    pub able_to_scale: bool,
    /// True when min/max bounds clamped the policy's decision.
    pub scaling_limited: bool,
    /// Unix timestamp (seconds) of the last pass that changed replicas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scale_time: Option<u64>,
}

impl FleetAutoscaler {
    /// Key of the target fleet (same namespace as the autoscaler).
    pub fn fleet_key(&self) -> String {
        object_key(&self.metadata.namespace, &self.spec.fleet_name)
    }
}

impl StoredObject for FleetAutoscaler {
    const KIND: &'static str = "FleetAutoscaler";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
