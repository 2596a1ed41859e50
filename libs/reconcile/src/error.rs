//! Reconciliation errors.

use thiserror::Error;

use crate::action::Action;
use crate::gateway::GatewayError;

/// Errors surfaced by the reconciliation pipeline.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired count outside `[0, max]`. Raised before any gateway call.
    #[error("invalid quota {desired}: desired VM count must be between 0 and {max}")]
    InvalidQuota { desired: i64, max: u32 },

    /// The instance listing failed, so there is nothing to reconcile against.
    #[error("provisioning gateway unavailable: {0}")]
    GatewayUnavailable(#[source] GatewayError),

    /// A single create/delete/update call failed.
    #[error("{action} failed: {source}")]
    ActionFailed {
        action: Action,
        #[source]
        source: GatewayError,
    },
}

impl ReconcileError {
    /// Returns true if this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuota { .. } | Self::GatewayUnavailable(_)
        )
    }
}
