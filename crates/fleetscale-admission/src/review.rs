//! `AdmissionReview` envelope spoken by the validating webhook endpoint.
//!
//! The caller posts a review with a `request`; the handler answers with the
//! same envelope carrying a `response`. Denials use status `Failure` with
//! one cause per violated rule.

use serde::{Deserialize, Serialize};

use crate::validator::AdmissionVerdict;

pub const API_VERSION: &str = "admission.k8s.io/v1";
pub const KIND: &str = "AdmissionReview";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatus {
    pub status: String,
    pub reason: String,
    pub message: String,
    pub details: StatusDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub causes: Vec<StatusCause>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCause {
    #[serde(rename = "type")]
    pub cause_type: String,
    pub field: String,
    pub message: String,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl AdmissionResponse {
    /// Encode a verdict for the request with `uid`. `name` is the object
    /// name reported in the denial details.
    pub fn from_verdict(uid: &str, name: &str, verdict: &AdmissionVerdict) -> Self {
        let status = verdict.reason.map(|reason| ResponseStatus {
            status: "Failure".to_string(),
            reason: reason.as_str().to_string(),
            message: verdict.message(),
            details: StatusDetails {
                name: name.to_string(),
                kind: "FleetAutoscaler".to_string(),
                causes: verdict
                    .details
                    .iter()
                    .map(|d| StatusCause {
                        cause_type: "FieldValueInvalid".to_string(),
                        field: d.field.clone(),
                        message: d.message.clone(),
                    })
                    .collect(),
            },
        });
        Self {
            uid: uid.to_string(),
            allowed: verdict.allowed,
            status,
        }
    }
}

impl AdmissionReview {
    pub fn respond(response: AdmissionResponse) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            request: None,
            response: Some(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{DenyReason, FieldViolation};

    #[test]
    fn allowed_verdict_has_no_status() {
        let verdict = AdmissionVerdict {
            allowed: true,
            reason: None,
            details: vec![],
        };
        let resp = AdmissionResponse::from_verdict("uid-1", "fas-1", &verdict);

        assert!(resp.allowed);
        assert!(resp.status.is_none());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("status").is_none());
    }

    #[test]
    fn denied_verdict_carries_causes() {
        let verdict = AdmissionVerdict {
            allowed: false,
            reason: Some(DenyReason::Invalid),
            details: vec![FieldViolation {
                field: "spec.policy".to_string(),
                message: "missing".to_string(),
            }],
        };
        let resp = AdmissionResponse::from_verdict("uid-1", "fas-1", &verdict);

        let status = resp.status.unwrap();
        assert_eq!(status.status, "Failure");
        assert_eq!(status.reason, "Invalid");
        assert_eq!(status.details.name, "fas-1");
        assert_eq!(status.details.causes.len(), 1);
        assert_eq!(status.details.causes[0].field, "spec.policy");
    }

    #[test]
    fn request_decodes_with_defaults() {
        let raw = r#"{"request": {"uid": "abc", "object": {"spec": {}}}}"#;
        let review: AdmissionReview = serde_json::from_str(raw).unwrap();

        assert_eq!(review.api_version, API_VERSION);
        assert_eq!(review.kind, KIND);
        assert_eq!(review.request.unwrap().uid, "abc");
    }
}
