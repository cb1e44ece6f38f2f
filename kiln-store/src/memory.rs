//! In-memory object store
//!
//! Backs the controller's standalone mode and every controller test.
//! Behaves like the real store where the controllers depend on it:
//! optimistic concurrency, generation tracking, a separate status write
//! and cascading deletion through owner references.

use async_trait::async_trait;
use chrono::Utc;
use kiln_core::domain::meta::LabelSelector;
use kiln_core::{Kind, Object};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{ObjectStore, WatchEvent};

/// Default number of buffered events per kind before watchers lag
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// Length of the random suffix appended to `generate_name`
const GENERATED_SUFFIX_LEN: usize = 5;

type StoreKey = (Kind, String, String);

pub struct InMemoryStore {
    objects: RwLock<BTreeMap<StoreKey, Object>>,
    channels: [broadcast::Sender<WatchEvent>; Kind::ALL.len()],
    revision: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    pub fn with_watch_capacity(capacity: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            channels: std::array::from_fn(|_| broadcast::channel(capacity).0),
            revision: AtomicU64::new(0),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn channel(&self, kind: Kind) -> &broadcast::Sender<WatchEvent> {
        &self.channels[kind as usize]
    }

    fn publish(&self, event: WatchEvent) {
        let kind = event.object().kind();
        // Sending fails only when nobody is watching
        let _ = self.channel(kind).send(event);
    }

    fn key_of(object: &Object) -> StoreKey {
        let meta = object.meta();
        (
            object.kind(),
            meta.namespace_or_empty().to_string(),
            meta.name.clone(),
        )
    }

    fn conflict(object: &Object, stored: &Object) -> StoreError {
        let meta = object.meta();
        StoreError::Conflict {
            kind: object.kind(),
            namespace: meta.namespace_or_empty().to_string(),
            name: meta.name.clone(),
            sent: meta.resource_version,
            stored: stored.meta().resource_version,
        }
    }
}

fn generated_name(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_SUFFIX_LEN)
        .collect();
    format!("{}{}", prefix, suffix)
}

fn check_scope(object: &Object) -> Result<()> {
    let kind = object.kind();
    let namespace = object.meta().namespace.as_deref().unwrap_or_default();

    match (kind.is_namespaced(), namespace.is_empty()) {
        (true, true) => Err(StoreError::Invalid(format!(
            "{} requires a namespace",
            kind
        ))),
        (false, false) => Err(StoreError::Invalid(format!(
            "{} is cluster-scoped and cannot have a namespace",
            kind
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Object> {
        let objects = self.objects.read().await;
        objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(kind, namespace, name))
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Object>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|n| n == ns.as_str()))
            .filter(|(_, object)| object.meta().matches(selector))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, mut object: Object) -> Result<Object> {
        check_scope(&object)?;

        let mut objects = self.objects.write().await;

        let generated_from = if object.meta().name.is_empty() {
            let prefix = object.meta().generate_name.clone().ok_or_else(|| {
                StoreError::Invalid("either name or generate_name is required".to_string())
            })?;
            Some(prefix)
        } else {
            None
        };

        let mut key = Self::key_of(&object);
        if let Some(prefix) = generated_from {
            // Draw suffixes until one is free
            loop {
                object.meta_mut().name = generated_name(&prefix);
                key = Self::key_of(&object);
                if !objects.contains_key(&key) {
                    break;
                }
            }
        } else if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                namespace: key.1,
                name: key.2,
            });
        }

        let revision = self.next_revision();
        let meta = object.meta_mut();
        meta.uid = Some(Uuid::new_v4());
        meta.creation_timestamp = Some(Utc::now());
        meta.generation = 1;
        meta.resource_version = revision;

        debug!(kind = %key.0, namespace = %key.1, name = %key.2, "Created object");
        objects.insert(key, object.clone());
        self.publish(WatchEvent::Added(object.clone()));

        Ok(object)
    }

    async fn update(&self, mut object: Object) -> Result<Object> {
        let key = Self::key_of(&object);
        let mut objects = self.objects.write().await;

        let stored = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key.0, &key.1, &key.2))?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(Self::conflict(&object, &stored));
        }

        let spec_changed = !object.spec_eq(&stored);
        object.copy_status_from(&stored);

        let revision = self.next_revision();
        let stored_meta = stored.meta();
        let meta = object.meta_mut();
        meta.uid = stored_meta.uid;
        meta.creation_timestamp = stored_meta.creation_timestamp;
        meta.generate_name = stored_meta.generate_name.clone();
        meta.generation = stored_meta.generation + i64::from(spec_changed);
        meta.resource_version = revision;

        trace!(kind = %key.0, namespace = %key.1, name = %key.2, spec_changed, "Updated object");
        objects.insert(key, object.clone());
        self.publish(WatchEvent::Modified {
            old: stored,
            new: object.clone(),
        });

        Ok(object)
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        let key = Self::key_of(&object);
        let mut objects = self.objects.write().await;

        let stored = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key.0, &key.1, &key.2))?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(Self::conflict(&object, &stored));
        }

        let mut updated = stored.clone();
        updated.copy_status_from(&object);
        updated.meta_mut().resource_version = self.next_revision();

        trace!(kind = %key.0, namespace = %key.1, name = %key.2, "Updated object status");
        objects.insert(key, updated.clone());
        self.publish(WatchEvent::Modified {
            old: stored,
            new: updated.clone(),
        });

        Ok(updated)
    }

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;

        let root = objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::not_found(kind, namespace, name))?;
        debug!(kind = %kind, namespace, name, "Deleted object");

        let mut pending = vec![root];
        while let Some(deleted) = pending.pop() {
            if let Some(uid) = deleted.meta().uid {
                let dependents: Vec<StoreKey> = objects
                    .iter()
                    .filter(|(_, o)| o.meta().is_owned_by(uid))
                    .map(|(k, _)| k.clone())
                    .collect();

                for key in dependents {
                    if let Some(dependent) = objects.remove(&key) {
                        debug!(
                            kind = %key.0,
                            namespace = %key.1,
                            name = %key.2,
                            owner = %deleted.meta().name,
                            "Deleted dependent object"
                        );
                        pending.push(dependent);
                    }
                }
            }
            self.publish(WatchEvent::Deleted(deleted));
        }

        Ok(())
    }

    fn watch(&self, kind: Kind) -> broadcast::Receiver<WatchEvent> {
        self.channel(kind).subscribe()
    }
}
