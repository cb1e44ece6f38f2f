//! Error types for plan generation

use thiserror::Error;

/// Errors raised while turning a template and a run into an ExecutionPlan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A resource quantity could not be parsed
    #[error("invalid {section} quantity for resource '{resource}': {reason}")]
    InvalidQuantity {
        /// `limits` or `requests`
        section: &'static str,
        resource: String,
        value: String,
        reason: String,
    },
}

impl PlanError {
    /// Short machine-readable reason, mirrored into run conditions
    pub fn reason(&self) -> &'static str {
        match self {
            PlanError::InvalidQuantity { .. } => "InvalidResourceQuantity",
        }
    }
}
