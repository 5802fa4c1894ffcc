//! Policy evaluation: turns fleet state into a raw replica target.
//!
//! The user-facing `FleetAutoscalerPolicy` is converted into the closed
//! [`ScalingPolicy`] sum type first, so the evaluator matches exhaustively
//! and a policy with neither or both variants never reaches arithmetic.
//!
//! # Buffer policy
//!
//! ```text
//! buffer  = bufferSize                                   (int form)
//!         = max(1, ceil(status.replicas * pct / 100))    (percent form, replicas > 0)
//!         = 0                                            (percent form, replicas == 0)
//! desired = status.allocatedReplicas + buffer
//! ```
//!
//! # Webhook policy
//!
//! POST a `FleetAutoscaleReview` carrying the fleet status; the response's
//! `replicas` is the target when `scale` is true, otherwise the fleet's
//! current spec replicas.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use fleetscale_state::{
    BufferPolicy, BufferSize, Fleet, FleetAutoscalerPolicy, PolicyType, WebhookPolicy,
};

use crate::error::{ScaleError, ScaleResult};
use crate::webhook::{
    endpoint_url, FleetAutoscaleRequest, FleetAutoscaleReview, WebhookCaller, WebhookError,
};

/// A policy with exactly one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingPolicy {
    Buffer(BufferPolicy),
    Webhook(WebhookPolicy),
}

impl ScalingPolicy {
    /// `(min_replicas, max_replicas)` for the bounds enforcer.
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            ScalingPolicy::Buffer(b) => (b.min_replicas, b.max_replicas),
            ScalingPolicy::Webhook(w) => (w.min_replicas, w.max_replicas),
        }
    }

    pub fn policy_type(&self) -> PolicyType {
        match self {
            ScalingPolicy::Buffer(_) => PolicyType::Buffer,
            ScalingPolicy::Webhook(_) => PolicyType::Webhook,
        }
    }
}

impl TryFrom<&FleetAutoscalerPolicy> for ScalingPolicy {
    type Error = ScaleError;

    fn try_from(policy: &FleetAutoscalerPolicy) -> Result<Self, Self::Error> {
        match (&policy.buffer, &policy.webhook) {
            (Some(buffer), None) => Ok(ScalingPolicy::Buffer(buffer.clone())),
            (None, Some(webhook)) => Ok(ScalingPolicy::Webhook(webhook.clone())),
            (None, None) => Err(ScaleError::InvalidPolicy(format!(
                "policy type {} has no buffer or webhook section",
                policy.policy_type
            ))),
            (Some(_), Some(_)) => Err(ScaleError::InvalidPolicy(
                "policy has both buffer and webhook sections".to_string(),
            )),
        }
    }
}

/// Resolve a buffer size to an absolute count against `status_replicas`.
pub fn resolve_buffer(size: &BufferSize, status_replicas: u32) -> ScaleResult<u32> {
    match size {
        BufferSize::Int(n) => u32::try_from(*n)
            .map_err(|_| ScaleError::Evaluation(format!("bufferSize {n} is negative"))),
        BufferSize::Percent(raw) => {
            let pct = size
                .percent()
                .filter(|p| (1..=99).contains(p))
                .ok_or_else(|| {
                    ScaleError::Evaluation(format!(
                        "bufferSize {raw:?} is not a percentage between 1% and 99%"
                    ))
                })?;
            if status_replicas == 0 {
                return Ok(0);
            }
            let scaled = (u64::from(status_replicas) * u64::from(pct)).div_ceil(100);
            Ok(u32::try_from(scaled).unwrap_or(u32::MAX).max(1))
        }
    }
}

/// Buffer arithmetic: allocated servers plus the resolved buffer.
pub fn apply_buffer_policy(policy: &BufferPolicy, fleet: &Fleet) -> ScaleResult<u32> {
    let buffer = resolve_buffer(&policy.buffer_size, fleet.status.replicas)?;
    Ok(fleet.status.allocated_replicas.saturating_add(buffer))
}

/// Dispatches a policy to its strategy.
#[derive(Clone)]
pub struct PolicyEvaluator {
    webhook: Arc<dyn WebhookCaller>,
}

impl PolicyEvaluator {
    pub fn new(webhook: Arc<dyn WebhookCaller>) -> Self {
        Self { webhook }
    }

    /// Compute the unbounded replica target for `fleet`.
    pub async fn evaluate(&self, policy: &ScalingPolicy, fleet: &Fleet) -> ScaleResult<u32> {
        let desired = match policy {
            ScalingPolicy::Buffer(buffer) => apply_buffer_policy(buffer, fleet)?,
            ScalingPolicy::Webhook(webhook) => self.apply_webhook_policy(webhook, fleet).await?,
        };
        debug!(
            fleet = %fleet.metadata.key(),
            policy = %policy.policy_type(),
            desired,
            "policy evaluated"
        );
        Ok(desired)
    }

    async fn apply_webhook_policy(&self, policy: &WebhookPolicy, fleet: &Fleet) -> ScaleResult<u32> {
        let url = endpoint_url(policy)?;
        let review = FleetAutoscaleReview {
            request: Some(FleetAutoscaleRequest {
                uid: request_uid(fleet),
                name: fleet.metadata.name.clone(),
                namespace: fleet.metadata.namespace.clone(),
                status: fleet.status.clone(),
            }),
            response: None,
        };
        let body = serde_json::to_vec(&review).map_err(|e| WebhookError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let resp = self.webhook.invoke(&url, body).await?;
        if !(200..300).contains(&resp.status) {
            return Err(WebhookError::Status {
                url,
                status: resp.status,
            }
            .into());
        }

        let review: FleetAutoscaleReview =
            serde_json::from_slice(&resp.body).map_err(|e| WebhookError::InvalidResponse {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let response = review.response.ok_or_else(|| WebhookError::InvalidResponse {
            url: url.clone(),
            reason: "missing response section".to_string(),
        })?;

        if response.scale {
            Ok(response.replicas)
        } else {
            Ok(fleet.spec.replicas)
        }
    }
}

fn request_uid(fleet: &Fleet) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!(
        "{}-{}-{nanos}",
        fleet.metadata.key(),
        fleet.metadata.resource_version
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{BoxFuture, WebhookResponse};
    use fleetscale_state::{FleetStatus, ServiceReference};
    use std::sync::Mutex;

    /// Replies with a fixed response and remembers the last request.
    struct CannedWebhook {
        reply: Result<WebhookResponse, ()>,
        seen: Mutex<Option<(String, Vec<u8>)>>,
    }

    impl CannedWebhook {
        fn ok(status: u16, body: &str) -> Self {
            Self {
                reply: Ok(WebhookResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                }),
                seen: Mutex::new(None),
            }
        }

        fn unreachable() -> Self {
            Self {
                reply: Err(()),
                seen: Mutex::new(None),
            }
        }
    }

    impl WebhookCaller for CannedWebhook {
        fn invoke<'a>(
            &'a self,
            url: &'a str,
            body: Vec<u8>,
        ) -> BoxFuture<'a, Result<WebhookResponse, WebhookError>> {
            *self.seen.lock().unwrap() = Some((url.to_string(), body));
            let reply = self.reply.clone().map_err(|_| WebhookError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
            Box::pin(async move { reply })
        }
    }

    fn test_fleet(spec: u32, replicas: u32, ready: u32, allocated: u32) -> Fleet {
        let mut fleet = Fleet::new("default", "fleet-1", spec);
        fleet.status = FleetStatus {
            replicas,
            ready_replicas: ready,
            allocated_replicas: allocated,
            reserved_replicas: 0,
        };
        fleet
    }

    fn buffer(size: BufferSize) -> BufferPolicy {
        BufferPolicy {
            buffer_size: size,
            min_replicas: 0,
            max_replicas: 100,
        }
    }

    fn webhook_policy() -> WebhookPolicy {
        WebhookPolicy {
            service: Some(ServiceReference {
                name: "fleetautoscaler-service".to_string(),
                namespace: None,
                path: Some("/autoscaler".to_string()),
                port: None,
            }),
            url: None,
            min_replicas: 0,
            max_replicas: 100,
        }
    }

    // ── Conversion ─────────────────────────────────────────────────

    #[test]
    fn conversion_requires_exactly_one_variant() {
        let mut policy = FleetAutoscalerPolicy {
            policy_type: PolicyType::Buffer,
            buffer: Some(buffer(BufferSize::Int(5))),
            webhook: None,
        };
        assert!(matches!(
            ScalingPolicy::try_from(&policy),
            Ok(ScalingPolicy::Buffer(_))
        ));

        policy.webhook = Some(webhook_policy());
        assert!(matches!(
            ScalingPolicy::try_from(&policy),
            Err(ScaleError::InvalidPolicy(_))
        ));

        policy.buffer = None;
        policy.webhook = None;
        assert!(matches!(
            ScalingPolicy::try_from(&policy),
            Err(ScaleError::InvalidPolicy(_))
        ));
    }

    // ── Buffer arithmetic ──────────────────────────────────────────

    #[test]
    fn buffer_adds_to_allocated() {
        let fleet = test_fleet(5, 5, 0, 5);
        assert_eq!(apply_buffer_policy(&buffer(BufferSize::Int(7)), &fleet).unwrap(), 12);
    }

    #[test]
    fn buffer_ignores_ready_count() {
        let fleet = test_fleet(20, 20, 15, 5);
        assert_eq!(apply_buffer_policy(&buffer(BufferSize::Int(8)), &fleet).unwrap(), 13);
    }

    #[test]
    fn percentage_rounds_up_against_status_replicas() {
        assert_eq!(resolve_buffer(&BufferSize::Percent("20%".into()), 10).unwrap(), 2);
        assert_eq!(resolve_buffer(&BufferSize::Percent("20%".into()), 11).unwrap(), 3);
        assert_eq!(resolve_buffer(&BufferSize::Percent("1%".into()), 3).unwrap(), 1);
    }

    #[test]
    fn percentage_on_empty_fleet_is_zero() {
        assert_eq!(resolve_buffer(&BufferSize::Percent("50%".into()), 0).unwrap(), 0);
        let fleet = test_fleet(0, 0, 0, 0);
        let policy = buffer(BufferSize::Percent("50%".into()));
        assert_eq!(apply_buffer_policy(&policy, &fleet).unwrap(), 0);
    }

    #[test]
    fn invalid_percentages_fail_evaluation() {
        for raw in ["0%", "100%", "abc", "20"] {
            let err = resolve_buffer(&BufferSize::Percent(raw.into()), 10).unwrap_err();
            assert!(matches!(err, ScaleError::Evaluation(_)), "{raw}");
        }
    }

    #[test]
    fn negative_int_buffer_fails_evaluation() {
        assert!(matches!(
            resolve_buffer(&BufferSize::Int(-1), 10),
            Err(ScaleError::Evaluation(_))
        ));
    }

    // ── Webhook ────────────────────────────────────────────────────

    #[tokio::test]
    async fn webhook_scale_true_uses_replicas() {
        let canned = Arc::new(CannedWebhook::ok(
            200,
            r#"{"response":{"uid":"u","scale":true,"replicas":17}}"#,
        ));
        let evaluator = PolicyEvaluator::new(canned.clone());
        let fleet = test_fleet(8, 5, 3, 2);

        let desired = evaluator
            .evaluate(&ScalingPolicy::Webhook(webhook_policy()), &fleet)
            .await
            .unwrap();
        assert_eq!(desired, 17);

        let (url, body) = canned.seen.lock().unwrap().clone().unwrap();
        assert_eq!(url, "http://fleetautoscaler-service.default.svc:8000/autoscaler");
        let sent: FleetAutoscaleReview = serde_json::from_slice(&body).unwrap();
        let request = sent.request.unwrap();
        assert_eq!(request.name, "fleet-1");
        assert_eq!(request.status.allocated_replicas, 2);
    }

    #[tokio::test]
    async fn webhook_scale_false_keeps_spec_replicas() {
        let canned = Arc::new(CannedWebhook::ok(
            200,
            r#"{"response":{"uid":"u","scale":false,"replicas":0}}"#,
        ));
        let evaluator = PolicyEvaluator::new(canned);
        let fleet = test_fleet(8, 5, 3, 2);

        let desired = evaluator
            .evaluate(&ScalingPolicy::Webhook(webhook_policy()), &fleet)
            .await
            .unwrap();
        assert_eq!(desired, 8);
    }

    #[tokio::test]
    async fn webhook_failures_surface_as_errors() {
        let fleet = test_fleet(8, 5, 3, 2);
        let policy = ScalingPolicy::Webhook(webhook_policy());

        let cases: Vec<CannedWebhook> = vec![
            CannedWebhook::unreachable(),
            CannedWebhook::ok(500, "boom"),
            CannedWebhook::ok(200, "not json"),
            CannedWebhook::ok(200, r#"{"request":null}"#),
        ];
        for canned in cases {
            let evaluator = PolicyEvaluator::new(Arc::new(canned));
            let err = evaluator.evaluate(&policy, &fleet).await.unwrap_err();
            assert!(matches!(err, ScaleError::Webhook(_)), "{err}");
        }
    }
}
