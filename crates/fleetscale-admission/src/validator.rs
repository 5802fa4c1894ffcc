//! Admission checks for `FleetAutoscaler` objects.
//!
//! Validation is pure: the object is decoded, every rule runs, and each
//! violated rule contributes one [`FieldViolation`]. Nothing is written.

use axum::http::Uri;
use serde::Serialize;

use fleetscale_state::{
    BufferPolicy, BufferSize, FleetAutoscaler, FleetAutoscalerPolicy, PolicyType, WebhookPolicy,
};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    /// The object decoded but broke one or more rules.
    Invalid,
    /// The object could not be decoded at all.
    BadRequest,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Invalid => "Invalid",
            DenyReason::BadRequest => "BadRequest",
        }
    }
}

/// One broken rule, addressed by JSON field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub details: Vec<FieldViolation>,
}

impl AdmissionVerdict {
    fn from_violations(details: Vec<FieldViolation>) -> Self {
        if details.is_empty() {
            Self {
                allowed: true,
                reason: None,
                details,
            }
        } else {
            Self {
                allowed: false,
                reason: Some(DenyReason::Invalid),
                details,
            }
        }
    }

    fn malformed(error: impl std::fmt::Display) -> Self {
        Self {
            allowed: false,
            reason: Some(DenyReason::BadRequest),
            details: vec![FieldViolation {
                field: String::new(),
                message: format!("malformed FleetAutoscaler: {error}"),
            }],
        }
    }

    /// One-line summary of the violations.
    pub fn message(&self) -> String {
        self.details
            .iter()
            .map(|d| {
                if d.field.is_empty() {
                    d.message.clone()
                } else {
                    format!("{}: {}", d.field, d.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionValidator;

impl AdmissionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Decode raw JSON and validate it.
    pub fn validate(&self, raw: &[u8]) -> AdmissionVerdict {
        match serde_json::from_slice::<FleetAutoscaler>(raw) {
            Ok(fas) => self.validate_autoscaler(&fas),
            Err(e) => AdmissionVerdict::malformed(e),
        }
    }

    /// Validate an already-parsed JSON document.
    pub fn validate_value(&self, value: serde_json::Value) -> AdmissionVerdict {
        match serde_json::from_value::<FleetAutoscaler>(value) {
            Ok(fas) => self.validate_autoscaler(&fas),
            Err(e) => AdmissionVerdict::malformed(e),
        }
    }

    pub fn validate_autoscaler(&self, fas: &FleetAutoscaler) -> AdmissionVerdict {
        let mut violations = Violations::default();

        check_name("metadata.name", "name", &fas.metadata.name, &mut violations);
        check_name(
            "metadata.namespace",
            "namespace",
            &fas.metadata.namespace,
            &mut violations,
        );
        check_name("spec.fleetName", "fleet name", &fas.spec.fleet_name, &mut violations);
        check_policy(&fas.spec.policy, &mut violations);

        AdmissionVerdict::from_violations(violations.0)
    }
}

#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

/// Names end up in `namespace/name` store keys, so they must be
/// non-empty and free of `/`.
fn check_name(field: &str, what: &str, value: &str, v: &mut Violations) {
    if value.trim().is_empty() {
        v.push(field, format!("{what} must not be empty"));
    } else if value.contains('/') {
        v.push(field, format!("{what} {value:?} must not contain '/'"));
    }
}

fn check_policy(policy: &FleetAutoscalerPolicy, v: &mut Violations) {
    match (&policy.buffer, &policy.webhook) {
        (None, None) => v.push(
            "spec.policy",
            format!(
                "{} policy selected but spec.policy.{} is not set",
                policy.policy_type,
                policy.policy_type.to_string().to_lowercase()
            ),
        ),
        (Some(_), Some(_)) => v.push(
            "spec.policy",
            "only one of spec.policy.buffer and spec.policy.webhook may be set",
        ),
        (Some(buffer), None) => {
            if policy.policy_type != PolicyType::Buffer {
                v.push(
                    "spec.policy.type",
                    format!("type is {} but spec.policy.buffer is set", policy.policy_type),
                );
            }
            check_buffer(buffer, v);
        }
        (None, Some(webhook)) => {
            if policy.policy_type != PolicyType::Webhook {
                v.push(
                    "spec.policy.type",
                    format!("type is {} but spec.policy.webhook is set", policy.policy_type),
                );
            }
            check_webhook(webhook, v);
        }
    }
}

fn check_buffer(buffer: &BufferPolicy, v: &mut Violations) {
    if buffer.max_replicas < buffer.min_replicas {
        v.push(
            "spec.policy.buffer.maxReplicas",
            "maxReplicas must be greater than or equal to minReplicas",
        );
    }

    match &buffer.buffer_size {
        BufferSize::Int(size) => {
            if *size <= 0 {
                v.push(
                    "spec.policy.buffer.bufferSize",
                    "bufferSize must be bigger than 0",
                );
            } else if i64::from(buffer.max_replicas) < i64::from(*size) {
                v.push(
                    "spec.policy.buffer.maxReplicas",
                    "maxReplicas must be greater than or equal to bufferSize",
                );
            }
        }
        BufferSize::Percent(raw) => {
            match buffer.buffer_size.percent() {
                Some(pct) if (1..=99).contains(&pct) => {}
                _ => v.push(
                    "spec.policy.buffer.bufferSize",
                    format!("bufferSize {raw:?} must be a percentage between 1% and 99%"),
                ),
            }
            if buffer.min_replicas == 0 {
                v.push(
                    "spec.policy.buffer.minReplicas",
                    "minReplicas must be more than 0 when bufferSize is a percentage",
                );
            }
        }
    }
}

fn check_webhook(webhook: &WebhookPolicy, v: &mut Violations) {
    match (&webhook.service, &webhook.url) {
        (None, None) => v.push(
            "spec.policy.webhook",
            "one of service or url must be set",
        ),
        (Some(_), Some(_)) => v.push(
            "spec.policy.webhook",
            "service and url cannot be used simultaneously",
        ),
        (Some(service), None) => {
            if service.name.trim().is_empty() {
                v.push("spec.policy.webhook.service.name", "service name must not be empty");
            }
        }
        (None, Some(url)) => {
            if let Err(message) = check_url(url) {
                v.push("spec.policy.webhook.url", message);
            }
        }
    }

    if webhook.max_replicas < webhook.min_replicas {
        v.push(
            "spec.policy.webhook.maxReplicas",
            "maxReplicas must be greater than or equal to minReplicas",
        );
    }
    if webhook.max_replicas == 0 {
        v.push(
            "spec.policy.webhook.maxReplicas",
            "maxReplicas must be bigger than 0",
        );
    }
}

fn check_url(raw: &str) -> Result<(), String> {
    let uri: Uri = raw
        .parse()
        .map_err(|e| format!("url {raw:?} is not valid: {e}"))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some("https") => return Err("https webhooks are not supported, use http".to_string()),
        Some(other) => return Err(format!("unsupported url scheme {other:?}")),
        None => return Err(format!("url {raw:?} must be absolute")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(format!("url {raw:?} has no host"));
    }
    Ok(())
}
