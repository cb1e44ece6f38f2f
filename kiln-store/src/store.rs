//! Object store contract
//!
//! Controllers only talk to the store through [`ObjectStore`]. The typed
//! helpers in [`ObjectStoreExt`] convert between [`Object`] and the concrete
//! resource structs.

use async_trait::async_trait;
use kiln_core::domain::meta::LabelSelector;
use kiln_core::{Kind, Object, Resource};
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};

/// Change notification delivered to watchers of a kind
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(Object),
    Modified { old: Object, new: Object },
    Deleted(Object),
}

impl WatchEvent {
    /// The object as it is after the event
    pub fn object(&self) -> &Object {
        match self {
            WatchEvent::Added(o) | WatchEvent::Deleted(o) => o,
            WatchEvent::Modified { new, .. } => new,
        }
    }
}

/// Keyed, versioned object storage with change notifications
///
/// Cluster-scoped kinds are addressed with an empty namespace.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Object>;

    /// Lists objects of a kind, optionally restricted to one namespace,
    /// whose labels match every selector entry
    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Object>>;

    /// Stores a new object, assigning name (from `generate_name`), uid,
    /// creation timestamp, generation and resource version
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replaces metadata and spec; the stored status is kept
    async fn update(&self, object: Object) -> Result<Object>;

    /// Replaces the status only
    async fn update_status(&self, object: Object) -> Result<Object>;

    /// Deletes an object and every object it transitively owns
    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<()>;

    /// Subscribes to changes of a kind
    fn watch(&self, kind: Kind) -> broadcast::Receiver<WatchEvent>;
}

/// Typed wrappers over [`ObjectStore`]
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    async fn get_resource<R: Resource>(&self, namespace: &str, name: &str) -> Result<R> {
        let object = self.get(R::KIND, namespace, name).await?;
        downcast(object)
    }

    async fn list_resources<R: Resource>(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<R>> {
        self.list(R::KIND, namespace, selector)
            .await?
            .into_iter()
            .map(downcast)
            .collect()
    }

    async fn create_resource<R: Resource>(&self, resource: R) -> Result<R> {
        let object = self.create(resource.into_object()).await?;
        downcast(object)
    }

    async fn update_resource<R: Resource>(&self, resource: R) -> Result<R> {
        let object = self.update(resource.into_object()).await?;
        downcast(object)
    }

    async fn update_resource_status<R: Resource>(&self, resource: R) -> Result<R> {
        let object = self.update_status(resource.into_object()).await?;
        downcast(object)
    }

    async fn delete_resource<R: Resource>(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete(R::KIND, namespace, name).await
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}

/// Converts an object into the requested resource type
pub fn downcast<R: Resource>(object: Object) -> Result<R> {
    R::try_from_object(object).map_err(|other| StoreError::KindMismatch {
        expected: R::KIND,
        actual: other.kind(),
    })
}
