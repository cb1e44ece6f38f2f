//! Run controller
//!
//! Turns each RunRequest into exactly one ExecutionPlan and mirrors the
//! plan's progress back onto the run's status.
//!
//! A run moves Pending → Running → Succeeded | Failed. Once its status has
//! a completion time the run is terminal and never touched again.

use async_trait::async_trait;
use chrono::Utc;
use kiln_core::credentials::apply_credentials;
use kiln_core::domain::build::{BuildTemplate, StrategyKind};
use kiln_core::domain::meta::{
    LABEL_BUILD_TEMPLATE, LABEL_BUILD_TEMPLATE_GENERATION, LABEL_RUN_REQUEST, LabelSelector,
    ObjectKey,
};
use kiln_core::domain::plan::ExecutionPlan;
use kiln_core::domain::run::{Condition, ConditionStatus, RunRequest};
use kiln_core::domain::service_account::ServiceAccount;
use kiln_core::domain::strategy::{BuildStrategy, ClusterBuildStrategy, StepTemplate};
use kiln_core::generate::assemble_plan;
use kiln_core::status::project_plan_status;
use kiln_core::{Kind, Object};
use kiln_store::{ControllerReferences, ObjectStore, ObjectStoreExt, OwnershipBinder, WatchEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, FALLBACK_SERVICE_ACCOUNT};
use crate::error::ReconcileError;
use crate::scheduler::{Action, Controller, Reconciler, Watch};

/// Reason recorded when the plan of a run disappeared
pub const REASON_PLAN_NOT_FOUND: &str = "ExecutionPlanNotFound";

pub struct RunReconciler {
    store: Arc<dyn ObjectStore>,
    ownership: Arc<dyn OwnershipBinder>,
    default_service_account: String,
}

impl RunReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ownership: Arc<dyn OwnershipBinder>,
        default_service_account: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ownership,
            default_service_account: default_service_account.into(),
        }
    }

    async fn reconcile_run(&self, run: RunRequest) -> Result<Action, ReconcileError> {
        let namespace = run.metadata.namespace_or_empty().to_string();

        let build = self
            .store
            .get_resource::<BuildTemplate>(&namespace, &run.spec.build_ref)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => ReconcileError::BuildTemplateNotFound {
                    namespace: namespace.clone(),
                    name: run.spec.build_ref.clone(),
                },
                e => e.into(),
            })?;

        if let Some(plan) = self.latest_plan(&build, &run).await? {
            return self.sync_status(run, &build, &plan).await;
        }

        if let Some(plan_name) = &run.status.latest_plan_ref {
            warn!(plan = %plan_name, "ExecutionPlan of the run no longer exists");
            let message = format!(
                "ExecutionPlan {} referenced by RunRequest {} was not found",
                plan_name, run.metadata.name
            );
            let mut failed = run.clone();
            failed.status.condition =
                Some(transition(&run, ConditionStatus::False, REASON_PLAN_NOT_FOUND, message));
            failed.status.completion_time = Some(Utc::now());
            self.store.update_resource_status(failed).await?;
            return Ok(Action::Done);
        }

        let run = self.ensure_template_link(run, &build).await?;
        let service_account = self.resolve_service_account(&build, &run).await?;
        let steps = self.resolve_strategy_steps(&build).await?;

        let mut plan = assemble_plan(&build, &run, &service_account.metadata.name, &steps)?;
        self.ownership
            .set_controller_reference(Kind::RunRequest, &run.metadata, &mut plan.metadata)?;
        let plan = self.store.create_resource(plan).await?;
        info!(plan = %plan.metadata.name, "Created ExecutionPlan");

        self.sync_status(run, &build, &plan).await
    }

    /// Newest plan labeled for this run, if any
    async fn latest_plan(
        &self,
        build: &BuildTemplate,
        run: &RunRequest,
    ) -> Result<Option<ExecutionPlan>, ReconcileError> {
        let mut selector = LabelSelector::new();
        selector.insert(LABEL_BUILD_TEMPLATE.to_string(), build.metadata.name.clone());
        selector.insert(LABEL_RUN_REQUEST.to_string(), run.metadata.name.clone());

        let plans: Vec<ExecutionPlan> = self
            .store
            .list_resources(run.metadata.namespace.as_deref(), &selector)
            .await?;

        Ok(plans.into_iter().max_by(|a, b| {
            a.metadata
                .creation_timestamp
                .cmp(&b.metadata.creation_timestamp)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        }))
    }

    /// Writes the plan's projected status, snapshotting the template spec
    /// the first time
    async fn sync_status(
        &self,
        run: RunRequest,
        build: &BuildTemplate,
        plan: &ExecutionPlan,
    ) -> Result<Action, ReconcileError> {
        let mut status = project_plan_status(&run, plan, Utc::now());
        if status.build_spec.is_none() {
            status.build_spec = Some(build.spec.clone());
        }
        if status == run.status {
            debug!(plan = %plan.metadata.name, "Run status up to date");
            return Ok(Action::Done);
        }

        let reason = status
            .condition
            .as_ref()
            .map(|c| c.reason.clone())
            .unwrap_or_default();
        let mut updated = run;
        updated.status = status;
        self.store.update_resource_status(updated).await?;
        info!(plan = %plan.metadata.name, reason = %reason, "Updated run status from plan");
        Ok(Action::Done)
    }

    /// Labels the run with its template and makes the template its controller
    async fn ensure_template_link(
        &self,
        run: RunRequest,
        build: &BuildTemplate,
    ) -> Result<RunRequest, ReconcileError> {
        let mut linked = run.clone();
        linked
            .metadata
            .labels
            .insert(LABEL_BUILD_TEMPLATE.to_string(), build.metadata.name.clone());
        linked.metadata.labels.insert(
            LABEL_BUILD_TEMPLATE_GENERATION.to_string(),
            build.metadata.generation.to_string(),
        );
        self.ownership.set_controller_reference(
            Kind::BuildTemplate,
            &build.metadata,
            &mut linked.metadata,
        )?;

        if linked.metadata == run.metadata {
            return Ok(run);
        }
        debug!(build = %build.metadata.name, "Linking run to its BuildTemplate");
        Ok(self.store.update_resource(linked).await?)
    }

    /// Finds the service account for the plan and links the build's secrets
    ///
    /// A name set on the run must exist. Otherwise the configured default
    /// is used, falling back to the well-known default account.
    async fn resolve_service_account(
        &self,
        build: &BuildTemplate,
        run: &RunRequest,
    ) -> Result<ServiceAccount, ReconcileError> {
        let namespace = run.metadata.namespace_or_empty();

        let candidates: Vec<&str> = match &run.spec.service_account {
            Some(name) => vec![name.as_str()],
            None => vec![
                self.default_service_account.as_str(),
                FALLBACK_SERVICE_ACCOUNT,
            ],
        };

        let mut found = None;
        for name in &candidates {
            match self
                .store
                .get_resource::<ServiceAccount>(namespace, name)
                .await
            {
                Ok(sa) => {
                    found = Some(sa);
                    break;
                }
                Err(e) if e.is_not_found() => {
                    debug!(service_account = %name, "Service account not found");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut service_account = found.ok_or_else(|| ReconcileError::ServiceAccountNotFound {
            namespace: namespace.to_string(),
            name: candidates.last().copied().unwrap_or_default().to_string(),
        })?;

        if apply_credentials(build, run, &mut service_account) {
            service_account = self.store.update_resource(service_account).await?;
            info!(
                service_account = %service_account.metadata.name,
                "Linked build credentials to service account"
            );
        }

        Ok(service_account)
    }

    /// Steps of the strategy the template references
    pub async fn resolve_strategy_steps(
        &self,
        build: &BuildTemplate,
    ) -> Result<Vec<StepTemplate>, ReconcileError> {
        let strategy = &build.spec.strategy;
        let result = match strategy.kind {
            StrategyKind::Namespaced => self
                .store
                .get_resource::<BuildStrategy>(build.metadata.namespace_or_empty(), &strategy.name)
                .await
                .map(|s| s.spec.steps),
            StrategyKind::Cluster => self
                .store
                .get_resource::<ClusterBuildStrategy>("", &strategy.name)
                .await
                .map(|s| s.spec.steps),
        };

        result.map_err(|e| {
            if e.is_not_found() {
                ReconcileError::StrategyNotFound {
                    kind: strategy.kind,
                    name: strategy.name.clone(),
                }
            } else {
                e.into()
            }
        })
    }

    /// Mirrors a configuration error into the run's condition
    async fn record_pending_reason(
        &self,
        key: &ObjectKey,
        error: &ReconcileError,
    ) -> Result<(), ReconcileError> {
        let run = match self
            .store
            .get_resource::<RunRequest>(&key.namespace, &key.name)
            .await
        {
            Ok(run) => run,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let condition = transition(
            &run,
            ConditionStatus::Unknown,
            error.reason(),
            error.to_string(),
        );
        if run.status.condition.as_ref() == Some(&condition) {
            return Ok(());
        }

        let mut updated = run;
        updated.status.condition = Some(condition);
        self.store.update_resource_status(updated).await?;
        Ok(())
    }
}

/// Builds a condition, keeping the previous transition time when neither
/// status nor reason changed
fn transition(
    run: &RunRequest,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) -> Condition {
    let mut condition = Condition::new(status, reason, message);
    condition.last_transition_time = match &run.status.condition {
        Some(previous) if previous.status == status && previous.reason == reason => {
            previous.last_transition_time
        }
        _ => Some(Utc::now()),
    };
    condition
}

#[async_trait]
impl Reconciler for RunReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let run = match self
            .store
            .get_resource::<RunRequest>(&key.namespace, &key.name)
            .await
        {
            Ok(run) => run,
            Err(e) if e.is_not_found() => {
                debug!("RunRequest not found, nothing to do");
                return Ok(Action::Done);
            }
            Err(e) => return Err(e.into()),
        };

        if run.status.completion_time.is_some() {
            debug!("RunRequest already completed");
            return Ok(Action::Done);
        }

        match self.reconcile_run(run).await {
            Err(e) if e.is_configuration() => {
                warn!(reason = e.reason(), "Run cannot proceed: {}", e);
                self.record_pending_reason(key, &e).await?;
                Err(e)
            }
            result => result,
        }
    }
}

// =============================================================================
// Watch predicates
// =============================================================================

/// RunRequest events that need a plan: creation of a run without a plan,
/// and spec changes while no plan exists yet
pub fn run_request_keys(event: &WatchEvent) -> Vec<ObjectKey> {
    match event {
        WatchEvent::Added(Object::RunRequest(run)) if run.status.latest_plan_ref.is_none() => {
            vec![ObjectKey::from_meta(&run.metadata)]
        }
        WatchEvent::Modified {
            old: Object::RunRequest(old),
            new: Object::RunRequest(new),
        } if old.status.latest_plan_ref.is_none()
            && new.status.latest_plan_ref.is_none()
            && old.metadata.generation != new.metadata.generation =>
        {
            vec![ObjectKey::from_meta(&new.metadata)]
        }
        _ => Vec::new(),
    }
}

/// ExecutionPlan events that change what the owning run should show
///
/// Creations (including the replay at startup), condition status or reason
/// changes, a first start time, and deletions map to the run named by the
/// plan's run label.
pub fn execution_plan_keys(event: &WatchEvent) -> Vec<ObjectKey> {
    let relevant = match event {
        WatchEvent::Added(_) | WatchEvent::Deleted(_) => true,
        WatchEvent::Modified {
            old: Object::ExecutionPlan(old),
            new: Object::ExecutionPlan(new),
        } => {
            let condition_changed = match (&old.status.condition, &new.status.condition) {
                (Some(o), Some(n)) => o.status != n.status || o.reason != n.reason,
                (None, Some(_)) => true,
                _ => false,
            };
            let started = old.status.start_time.is_none() && new.status.start_time.is_some();
            condition_changed || started
        }
        _ => false,
    };

    let meta = event.object().meta();
    match meta.labels.get(LABEL_RUN_REQUEST) {
        Some(run) if relevant && !run.is_empty() => {
            vec![ObjectKey::new(meta.namespace_or_empty(), run.clone())]
        }
        _ => Vec::new(),
    }
}

/// Constructs the run controller
pub fn controller(config: &Config, store: Arc<dyn ObjectStore>) -> Controller {
    let reconciler = RunReconciler::new(
        store,
        Arc::new(ControllerReferences),
        config.service_account_name.clone(),
    );
    Controller {
        name: "run",
        reconciler: Arc::new(reconciler),
        watches: vec![
            Watch::new(Kind::RunRequest, run_request_keys),
            Watch::new(Kind::ExecutionPlan, execution_plan_keys),
        ],
        workers: config.run_max_concurrent_reconciles,
    }
}
