//! Reconcile error types

use kiln_core::PlanError;
use kiln_core::domain::build::StrategyKind;
use kiln_store::{OwnershipError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a reconcile pass
///
/// Any error makes the queue retry the key with backoff.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("BuildTemplate {namespace}/{name} not found")]
    BuildTemplateNotFound { namespace: String, name: String },

    #[error("ServiceAccount {namespace}/{name} not found")]
    ServiceAccountNotFound { namespace: String, name: String },

    #[error("{kind} {name} not found")]
    StrategyNotFound { kind: StrategyKind, name: String },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("failed to set owner reference: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Short machine-readable reason, mirrored into run conditions
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Store(_) => "StoreError",
            ReconcileError::BuildTemplateNotFound { .. } => "BuildTemplateNotFound",
            ReconcileError::ServiceAccountNotFound { .. } => "ServiceAccountNotFound",
            ReconcileError::StrategyNotFound { .. } => "StrategyNotFound",
            ReconcileError::Plan(e) => e.reason(),
            ReconcileError::Ownership(_) => "SetOwnerReferenceFailed",
            ReconcileError::Timeout(_) => "ReconcileTimeout",
        }
    }

    /// True for errors caused by the user's resources rather than the store
    ///
    /// These are reported on the run so the user can see why it is stuck.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReconcileError::BuildTemplateNotFound { .. }
                | ReconcileError::ServiceAccountNotFound { .. }
                | ReconcileError::StrategyNotFound { .. }
                | ReconcileError::Plan(_)
                | ReconcileError::Ownership(_)
        )
    }
}
