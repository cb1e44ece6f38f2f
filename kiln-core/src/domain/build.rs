//! BuildTemplate domain types

use serde::{Deserialize, Serialize};

use super::meta::ObjectMeta;
use super::resources::ResourceRequirements;

/// Reusable description of what to build and how
///
/// Authored by users. Controllers never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTemplate {
    pub metadata: ObjectMeta,
    pub spec: BuildTemplateSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTemplateSpec {
    pub source: Source,
    pub strategy: StrategyRef,

    /// Image containing the build tools, exposed to steps as `$(build.builder.image)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<Image>,

    /// Path to the Dockerfile, relative to the context directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    pub output: Image,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
}

impl BuildTemplateSpec {
    /// Returns true when a succeeded or failed count limit is declared
    pub fn has_count_limits(&self) -> bool {
        self.retention
            .as_ref()
            .is_some_and(|r| r.succeeded_limit.is_some() || r.failed_limit.is_some())
    }
}

/// Source repository of a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,

    /// Branch, tag or commit; defaults to `master` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Sub-directory holding the build context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,

    /// Name of the secret with repository credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

/// Container image reference with optional registry credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl Image {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            credentials: None,
        }
    }
}

/// Reference to the strategy whose steps the build runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRef {
    pub name: String,

    #[serde(default)]
    pub kind: StrategyKind,
}

/// Scope of a referenced strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// A BuildStrategy in the template's namespace
    #[default]
    Namespaced,
    /// A ClusterBuildStrategy
    Cluster,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Namespaced => write!(f, "BuildStrategy"),
            StrategyKind::Cluster => write!(f, "ClusterBuildStrategy"),
        }
    }
}

/// Retention policy bounding the RunRequests kept for a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Number of succeeded runs to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded_limit: Option<u32>,

    /// Number of failed runs to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_after_succeeded_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_after_failed_seconds: Option<u64>,
}
