//! RunRequest domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::build::{BuildTemplateSpec, Image};
use super::meta::ObjectMeta;
use super::resources::ResourceRequirements;

/// A single requested execution of a BuildTemplate
///
/// The spec is user-authored; the status is owned by the run controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub metadata: ObjectMeta,
    pub spec: RunRequestSpec,

    #[serde(default)]
    pub status: RunStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequestSpec {
    /// Name of the BuildTemplate in the same namespace
    pub build_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Replaces the template output as a whole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Image>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RunRetention>,
}

/// Per-run TTL overrides, taking precedence over the template snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRetention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_after_succeeded_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_after_failed_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Name of the ExecutionPlan generated for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_plan_ref: Option<String>,

    /// Copy of the BuildTemplate spec taken when the plan was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_spec: Option<BuildTemplateSpec>,
}

impl RunStatus {
    /// Condition status, treating a missing condition as unknown
    pub fn succeeded(&self) -> ConditionStatus {
        self.condition
            .as_ref()
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    /// True once the run succeeded or failed
    pub fn is_resolved(&self) -> bool {
        self.succeeded() != ConditionStatus::Unknown
    }
}

/// Condition of type `Succeeded` shared by runs and plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub status: ConditionStatus,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Tri-state outcome of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
