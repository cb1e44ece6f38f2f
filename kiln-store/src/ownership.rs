//! Controller owner references
//!
//! An owner reference ties a dependent object to its owner so that
//! deleting the owner deletes the dependent too. At most one owner per
//! object is marked as its controller.

use kiln_core::Kind;
use kiln_core::domain::meta::{ObjectMeta, OwnerReference};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("owner {kind} {name} has no uid yet")]
    MissingUid { kind: Kind, name: String },

    #[error("owner {kind} {name} lives in namespace '{owner_namespace}' but the object lives in '{object_namespace}'")]
    CrossNamespace {
        kind: Kind,
        name: String,
        owner_namespace: String,
        object_namespace: String,
    },

    #[error("object {object} is already controlled by {kind} {name}")]
    AlreadyControlled {
        object: String,
        kind: Kind,
        name: String,
    },
}

/// Capability to mark an object as controlled by an owner
pub trait OwnershipBinder: Send + Sync {
    fn set_controller_reference(
        &self,
        owner_kind: Kind,
        owner: &ObjectMeta,
        object: &mut ObjectMeta,
    ) -> Result<(), OwnershipError>;
}

/// Owner reference rules of the object store
///
/// Namespaced owners may only control objects in their own namespace,
/// cluster-scoped owners may control anything. Setting the same controller
/// twice is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerReferences;

impl OwnershipBinder for ControllerReferences {
    fn set_controller_reference(
        &self,
        owner_kind: Kind,
        owner: &ObjectMeta,
        object: &mut ObjectMeta,
    ) -> Result<(), OwnershipError> {
        let uid = owner.uid.ok_or_else(|| OwnershipError::MissingUid {
            kind: owner_kind,
            name: owner.name.clone(),
        })?;

        if owner_kind.is_namespaced() && owner.namespace_or_empty() != object.namespace_or_empty() {
            return Err(OwnershipError::CrossNamespace {
                kind: owner_kind,
                name: owner.name.clone(),
                owner_namespace: owner.namespace_or_empty().to_string(),
                object_namespace: object.namespace_or_empty().to_string(),
            });
        }

        if let Some(existing) = object.controller_reference().filter(|r| r.uid != uid) {
            return Err(OwnershipError::AlreadyControlled {
                object: object.name.clone(),
                kind: existing.kind,
                name: existing.name.clone(),
            });
        }

        let reference = OwnerReference {
            kind: owner_kind,
            name: owner.name.clone(),
            uid,
            controller: true,
        };

        match object.owner_references.iter_mut().find(|r| r.uid == uid) {
            Some(existing) => *existing = reference,
            None => object.owner_references.push(reference),
        }
        Ok(())
    }
}
