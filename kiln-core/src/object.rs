//! Type-erased resource envelope
//!
//! The store contract moves `Object` values; controllers work with the
//! typed structs and convert through the [`Resource`] trait.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::build::BuildTemplate;
use crate::domain::meta::ObjectMeta;
use crate::domain::plan::ExecutionPlan;
use crate::domain::run::RunRequest;
use crate::domain::service_account::ServiceAccount;
use crate::domain::strategy::{BuildStrategy, ClusterBuildStrategy};

/// Resource kinds known to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    BuildTemplate,
    BuildStrategy,
    ClusterBuildStrategy,
    RunRequest,
    ExecutionPlan,
    ServiceAccount,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::BuildTemplate,
        Kind::BuildStrategy,
        Kind::ClusterBuildStrategy,
        Kind::RunRequest,
        Kind::ExecutionPlan,
        Kind::ServiceAccount,
    ];

    /// Cluster-scoped kinds carry no namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, Kind::ClusterBuildStrategy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::BuildTemplate => "BuildTemplate",
            Kind::BuildStrategy => "BuildStrategy",
            Kind::ClusterBuildStrategy => "ClusterBuildStrategy",
            Kind::RunRequest => "RunRequest",
            Kind::ExecutionPlan => "ExecutionPlan",
            Kind::ServiceAccount => "ServiceAccount",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any stored resource, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Object {
    BuildTemplate(BuildTemplate),
    BuildStrategy(BuildStrategy),
    ClusterBuildStrategy(ClusterBuildStrategy),
    RunRequest(RunRequest),
    ExecutionPlan(ExecutionPlan),
    ServiceAccount(ServiceAccount),
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Object::BuildTemplate(_) => Kind::BuildTemplate,
            Object::BuildStrategy(_) => Kind::BuildStrategy,
            Object::ClusterBuildStrategy(_) => Kind::ClusterBuildStrategy,
            Object::RunRequest(_) => Kind::RunRequest,
            Object::ExecutionPlan(_) => Kind::ExecutionPlan,
            Object::ServiceAccount(_) => Kind::ServiceAccount,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Object::BuildTemplate(o) => &o.metadata,
            Object::BuildStrategy(o) => &o.metadata,
            Object::ClusterBuildStrategy(o) => &o.metadata,
            Object::RunRequest(o) => &o.metadata,
            Object::ExecutionPlan(o) => &o.metadata,
            Object::ServiceAccount(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Object::BuildTemplate(o) => &mut o.metadata,
            Object::BuildStrategy(o) => &mut o.metadata,
            Object::ClusterBuildStrategy(o) => &mut o.metadata,
            Object::RunRequest(o) => &mut o.metadata,
            Object::ExecutionPlan(o) => &mut o.metadata,
            Object::ServiceAccount(o) => &mut o.metadata,
        }
    }

    /// Compares the user-authored part of two objects of the same kind
    ///
    /// Objects of different kinds never compare equal.
    pub fn spec_eq(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::BuildTemplate(a), Object::BuildTemplate(b)) => a.spec == b.spec,
            (Object::BuildStrategy(a), Object::BuildStrategy(b)) => a.spec == b.spec,
            (Object::ClusterBuildStrategy(a), Object::ClusterBuildStrategy(b)) => {
                a.spec == b.spec
            }
            (Object::RunRequest(a), Object::RunRequest(b)) => a.spec == b.spec,
            (Object::ExecutionPlan(a), Object::ExecutionPlan(b)) => a.spec == b.spec,
            (Object::ServiceAccount(a), Object::ServiceAccount(b)) => a.secrets == b.secrets,
            _ => false,
        }
    }

    /// Copies the status subresource from `other` into `self`
    ///
    /// Kinds without a status, and mismatched kinds, are left untouched.
    pub fn copy_status_from(&mut self, other: &Object) {
        match (self, other) {
            (Object::RunRequest(a), Object::RunRequest(b)) => a.status = b.status.clone(),
            (Object::ExecutionPlan(a), Object::ExecutionPlan(b)) => a.status = b.status.clone(),
            _ => {}
        }
    }
}

/// Typed resource convertible to and from [`Object`]
pub trait Resource: Sized + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn into_object(self) -> Object;

    /// Returns the object back when it holds a different kind
    fn try_from_object(object: Object) -> Result<Self, Object>;
}

macro_rules! impl_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Resource for $ty {
                const KIND: Kind = Kind::$ty;

                fn meta(&self) -> &ObjectMeta {
                    &self.metadata
                }

                fn meta_mut(&mut self) -> &mut ObjectMeta {
                    &mut self.metadata
                }

                fn into_object(self) -> Object {
                    Object::$ty(self)
                }

                fn try_from_object(object: Object) -> Result<Self, Object> {
                    match object {
                        Object::$ty(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }

            impl From<$ty> for Object {
                fn from(value: $ty) -> Self {
                    Object::$ty(value)
                }
            }
        )*
    };
}

impl_resource!(
    BuildTemplate,
    BuildStrategy,
    ClusterBuildStrategy,
    RunRequest,
    ExecutionPlan,
    ServiceAccount,
);
