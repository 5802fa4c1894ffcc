//! Autoscaler error types.

use thiserror::Error;

use crate::webhook::WebhookError;

/// Errors that can end a reconciliation pass.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("state store error: {0}")]
    State(#[from] fleetscale_state::StateError),

    /// The policy has neither or both variants populated.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),

    #[error("webhook policy failed: {0}")]
    Webhook(#[from] WebhookError),
}

impl ScaleError {
    /// Whether a later pass may succeed without anyone editing the objects.
    ///
    /// Conflicts and webhook failures are transient; a malformed policy
    /// stays malformed until a user fixes it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScaleError::State(e) => !matches!(
                e,
                fleetscale_state::StateError::Serialize(_)
                    | fleetscale_state::StateError::Deserialize(_)
            ),
            ScaleError::InvalidPolicy(_) | ScaleError::Evaluation(_) => false,
            ScaleError::Webhook(_) => true,
        }
    }

    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ScaleError::State(e) if e.is_conflict())
    }
}

pub type ScaleResult<T> = Result<T, ScaleError>;
