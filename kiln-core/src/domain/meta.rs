//! Object metadata shared by every resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::object::Kind;

/// Label carrying the name of the owning BuildTemplate
pub const LABEL_BUILD_TEMPLATE: &str = "kiln.dev/build-template";

/// Label carrying the generation of the owning BuildTemplate
pub const LABEL_BUILD_TEMPLATE_GENERATION: &str = "kiln.dev/build-template-generation";

/// Label carrying the name of the owning RunRequest
pub const LABEL_RUN_REQUEST: &str = "kiln.dev/run-request";

/// Label carrying the generation of the owning RunRequest
pub const LABEL_RUN_REQUEST_GENERATION: &str = "kiln.dev/run-request-generation";

/// Equality-based label selector. An empty selector matches everything.
pub type LabelSelector = BTreeMap<String, String>;

/// Metadata every stored object carries
///
/// `uid`, `resource_version`, `generation` and `creation_timestamp` are
/// owned by the store: clients never set them on create and must send the
/// `resource_version` they read back on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    /// Prefix used by the store to generate a unique name when `name` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,

    /// None for cluster-scoped kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Optimistic concurrency token
    #[serde(default)]
    pub resource_version: u64,

    /// Incremented by the store on every spec change
    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Creates metadata for a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Creates metadata for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the namespace, or an empty string for cluster-scoped objects
    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    /// Returns the controller owner reference, if any
    pub fn controller_reference(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Checks whether an owner reference to the given uid exists
    pub fn is_owned_by(&self, uid: Uuid) -> bool {
        self.owner_references.iter().any(|r| r.uid == uid)
    }

    /// Checks whether all selector entries are present in the labels
    pub fn matches(&self, selector: &LabelSelector) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }
}

/// Reference from a dependent object to its owner
///
/// Deleting the owner deletes every dependent that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    pub uid: Uuid,

    /// At most one owner reference per object is the controller
    #[serde(default)]
    pub controller: bool,
}

/// Namespaced name used as the work queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Builds a key from object metadata
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self::new(meta.namespace_or_empty(), meta.name.clone())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matching() {
        let mut meta = ObjectMeta::namespaced("ns", "run-1");
        meta.labels
            .insert(LABEL_BUILD_TEMPLATE.to_string(), "b1".to_string());
        meta.labels
            .insert(LABEL_RUN_REQUEST.to_string(), "run-1".to_string());

        let mut selector = LabelSelector::new();
        assert!(meta.matches(&selector));

        selector.insert(LABEL_BUILD_TEMPLATE.to_string(), "b1".to_string());
        assert!(meta.matches(&selector));

        selector.insert(LABEL_RUN_REQUEST.to_string(), "run-2".to_string());
        assert!(!meta.matches(&selector));
    }

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::from_meta(&ObjectMeta::namespaced("team-a", "r1"));
        assert_eq!(key.to_string(), "team-a/r1");
    }

    #[test]
    fn test_controller_reference() {
        let uid = Uuid::new_v4();
        let mut meta = ObjectMeta::namespaced("ns", "plan");
        meta.owner_references.push(OwnerReference {
            kind: Kind::RunRequest,
            name: "r1".to_string(),
            uid,
            controller: true,
        });

        assert!(meta.is_owned_by(uid));
        assert_eq!(meta.controller_reference().map(|r| r.uid), Some(uid));
        assert!(!meta.is_owned_by(Uuid::new_v4()));
    }
}
