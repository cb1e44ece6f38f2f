//! ServiceAccount domain model
//!
//! Credential carrier used by the execution engine when running a plan.

use serde::{Deserialize, Serialize};

use super::meta::ObjectMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub metadata: ObjectMeta,

    /// Secrets the execution engine mounts for this account
    #[serde(default)]
    pub secrets: Vec<SecretReference>,
}

impl ServiceAccount {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::namespaced(namespace, name),
            secrets: Vec::new(),
        }
    }

    /// Checks whether the account already references a secret
    pub fn has_secret(&self, name: &str) -> bool {
        self.secrets.iter().any(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
}
