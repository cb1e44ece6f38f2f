//! Shared fixtures for the reconciler tests

use chrono::{DateTime, Duration, Utc};
use kiln_core::Kind;
use kiln_core::domain::build::{BuildTemplate, BuildTemplateSpec, Image, Source, StrategyRef};
use kiln_core::domain::meta::{LABEL_BUILD_TEMPLATE, LABEL_RUN_REQUEST, ObjectMeta};
use kiln_core::domain::plan::{
    ExecutionPlan, OutputBinding, PlanSpec, PlanStatus, PlanTemplate, SourceBinding,
};
use kiln_core::domain::run::{Condition, ConditionStatus, RunRequest, RunRequestSpec};
use kiln_core::domain::service_account::ServiceAccount;
use kiln_core::domain::strategy::{
    BuildStrategy, ClusterBuildStrategy, StepTemplate, StrategySpec, VolumeMount,
};
use async_trait::async_trait;
use kiln_core::domain::meta::LabelSelector;
use kiln_core::{Object, Resource};
use kiln_store::{
    InMemoryStore, ObjectStore, ObjectStoreExt, OwnershipBinder, OwnershipError, StoreError,
    WatchEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

pub const NAMESPACE: &str = "builds";
pub const CLUSTER_STRATEGY: &str = "buildah";

/// Ownership binder that always refuses
pub struct FailingOwnership;

impl OwnershipBinder for FailingOwnership {
    fn set_controller_reference(
        &self,
        owner_kind: Kind,
        owner: &ObjectMeta,
        _object: &mut ObjectMeta,
    ) -> Result<(), OwnershipError> {
        Err(OwnershipError::MissingUid {
            kind: owner_kind,
            name: owner.name.clone(),
        })
    }
}

/// How [`StatusFault`] breaks the first RunRequest status write
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The store is unreachable
    Unavailable,
    /// Another writer updates the run between its read and the status write
    ConcurrentWrite,
}

/// Store that fails the first RunRequest `update_status` and then behaves
/// like the wrapped in-memory store
pub struct StatusFault {
    pub inner: Arc<InMemoryStore>,
    fault: Fault,
    tripped: AtomicBool,
}

impl StatusFault {
    pub fn new(inner: Arc<InMemoryStore>, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            tripped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStore for StatusFault {
    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> kiln_store::Result<Object> {
        self.inner.get(kind, namespace, name).await
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> kiln_store::Result<Vec<Object>> {
        self.inner.list(kind, namespace, selector).await
    }

    async fn create(&self, object: Object) -> kiln_store::Result<Object> {
        self.inner.create(object).await
    }

    async fn update(&self, object: Object) -> kiln_store::Result<Object> {
        self.inner.update(object).await
    }

    async fn update_status(&self, object: Object) -> kiln_store::Result<Object> {
        if object.kind() != RunRequest::KIND || self.tripped.swap(true, Ordering::SeqCst) {
            return self.inner.update_status(object).await;
        }
        match self.fault {
            Fault::Unavailable => Err(StoreError::Unavailable("connection reset".to_string())),
            Fault::ConcurrentWrite => {
                let meta = object.meta();
                let mut current: RunRequest = self
                    .inner
                    .get_resource(meta.namespace_or_empty(), &meta.name)
                    .await?;
                current
                    .metadata
                    .annotations
                    .insert("example.dev/touched".to_string(), "true".to_string());
                self.inner.update_resource(current).await?;
                self.inner.update_status(object).await
            }
        }
    }

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> kiln_store::Result<()> {
        self.inner.delete(kind, namespace, name).await
    }

    fn watch(&self, kind: Kind) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch(kind)
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: false,
    }
}

pub fn kaniko_strategy() -> BuildStrategy {
    BuildStrategy {
        metadata: ObjectMeta::namespaced(NAMESPACE, "kaniko"),
        spec: StrategySpec {
            steps: vec![
                StepTemplate {
                    name: "build-and-push".to_string(),
                    image: "gcr.io/kaniko-project/executor:v1.9.0".to_string(),
                    command: vec!["/kaniko/executor".to_string()],
                    args: vec![
                        "--dockerfile=$(build.dockerfile)".to_string(),
                        "--context=/workspace/source/$(build.source.contextDir)".to_string(),
                        "--destination=$(build.output.image)".to_string(),
                        "--oci-layout-path=/layout".to_string(),
                    ],
                    volume_mounts: vec![mount("layout", "/layout"), mount("cache", "/cache")],
                    ..Default::default()
                },
                StepTemplate {
                    name: "results".to_string(),
                    image: "$(build.builder.image)".to_string(),
                    args: vec!["digest".to_string(), "/layout".to_string()],
                    volume_mounts: vec![mount("layout", "/layout")],
                    ..Default::default()
                },
            ],
        },
    }
}

pub fn buildah_strategy() -> ClusterBuildStrategy {
    ClusterBuildStrategy {
        metadata: ObjectMeta::cluster(CLUSTER_STRATEGY),
        spec: StrategySpec {
            steps: vec![StepTemplate {
                name: "buildah".to_string(),
                image: "quay.io/buildah/stable".to_string(),
                command: vec!["buildah".to_string()],
                args: vec![
                    "bud".to_string(),
                    "-f".to_string(),
                    "$(build.dockerfile)".to_string(),
                    "-t".to_string(),
                    "$(build.output.image)".to_string(),
                ],
                ..Default::default()
            }],
        },
    }
}

pub async fn seed_strategies(store: &InMemoryStore) {
    store.create_resource(kaniko_strategy()).await.unwrap();
    store.create_resource(buildah_strategy()).await.unwrap();
}

/// Store holding both strategies and the `pipeline` service account
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    seed_strategies(&store).await;
    store
        .create_resource(ServiceAccount::new(NAMESPACE, "pipeline"))
        .await
        .unwrap();
    store
}

pub fn build_template(name: &str, strategy: &str) -> BuildTemplate {
    BuildTemplate {
        metadata: ObjectMeta::namespaced(NAMESPACE, name),
        spec: BuildTemplateSpec {
            source: Source {
                url: format!("https://github.com/example/{}", name),
                revision: None,
                context_dir: None,
                credentials: None,
            },
            strategy: StrategyRef {
                name: strategy.to_string(),
                kind: Default::default(),
            },
            builder: None,
            dockerfile: None,
            output: Image::new(format!("registry.example/{}:latest", name)),
            resources: None,
            timeout_seconds: None,
            retention: None,
        },
    }
}

pub fn run_request(name: &str, build: &str) -> RunRequest {
    RunRequest {
        metadata: ObjectMeta::namespaced(NAMESPACE, name),
        spec: RunRequestSpec {
            build_ref: build.to_string(),
            ..Default::default()
        },
        status: Default::default(),
    }
}

/// A run labeled with its template that finished with the given outcome
pub fn finished_run(
    name: &str,
    build: &str,
    status: ConditionStatus,
    completed: DateTime<Utc>,
) -> RunRequest {
    let mut run = run_request(name, build);
    run.metadata
        .labels
        .insert(LABEL_BUILD_TEMPLATE.to_string(), build.to_string());
    let reason = match status {
        ConditionStatus::True => "Succeeded",
        ConditionStatus::False => "Failed",
        ConditionStatus::Unknown => "Running",
    };
    run.status.condition = Some(Condition::new(status, reason, ""));
    run.status.start_time = Some(completed - Duration::seconds(30));
    if status != ConditionStatus::Unknown {
        run.status.completion_time = Some(completed);
    }
    run
}

pub fn execution_plan(name: &str, run: &str) -> ExecutionPlan {
    let mut metadata = ObjectMeta::namespaced(NAMESPACE, name);
    metadata
        .labels
        .insert(LABEL_RUN_REQUEST.to_string(), run.to_string());
    ExecutionPlan {
        metadata,
        spec: PlanSpec {
            service_account_name: "pipeline".to_string(),
            template: PlanTemplate::default(),
            source: SourceBinding {
                url: "https://github.com/example/app".to_string(),
                revision: "master".to_string(),
            },
            output: OutputBinding {
                image: "registry.example/app:latest".to_string(),
            },
            params: Vec::new(),
            timeout_seconds: None,
        },
        status: PlanStatus::default(),
    }
}
