//! TTL retention controller
//!
//! Deletes a finished RunRequest once its time to live has passed. The TTL
//! for the run's outcome comes from the run itself, falling back to the
//! BuildTemplate snapshot taken when its plan was generated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_core::Kind;
use kiln_core::Object;
use kiln_core::domain::meta::ObjectKey;
use kiln_core::domain::run::{ConditionStatus, RunRequest};
use kiln_store::{ObjectStore, ObjectStoreExt, WatchEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ReconcileError;
use crate::scheduler::{Action, Controller, Reconciler, Watch};

/// Outcome of comparing a completion time plus TTL against the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDecision {
    Expired,
    RequeueAfter(Duration),
}

/// Decides whether a run completed at `completion` has outlived `ttl`
pub fn ttl_decision(completion: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> TtlDecision {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        // Too far in the future to ever expire
        return TtlDecision::RequeueAfter(Duration::MAX);
    };
    let Some(expiry) = completion.checked_add_signed(ttl) else {
        return TtlDecision::RequeueAfter(Duration::MAX);
    };

    if now >= expiry {
        TtlDecision::Expired
    } else {
        // Positive by the comparison above
        let left = (expiry - now).to_std().unwrap_or_default();
        TtlDecision::RequeueAfter(left)
    }
}

/// TTL applying to a resolved run, in seconds
///
/// A TTL on the run wins over the one in the template snapshot.
pub fn effective_ttl(run: &RunRequest) -> Option<u64> {
    let snapshot = run
        .status
        .build_spec
        .as_ref()
        .and_then(|spec| spec.retention.as_ref());
    let overrides = run.spec.retention.as_ref();

    match run.status.succeeded() {
        ConditionStatus::True => overrides
            .and_then(|r| r.ttl_after_succeeded_seconds)
            .or_else(|| snapshot.and_then(|r| r.ttl_after_succeeded_seconds)),
        ConditionStatus::False => overrides
            .and_then(|r| r.ttl_after_failed_seconds)
            .or_else(|| snapshot.and_then(|r| r.ttl_after_failed_seconds)),
        ConditionStatus::Unknown => None,
    }
}

/// TTL declared on the run itself for its outcome
fn run_level_ttl(run: &RunRequest) -> Option<u64> {
    let overrides = run.spec.retention.as_ref()?;
    match run.status.succeeded() {
        ConditionStatus::True => overrides.ttl_after_succeeded_seconds,
        ConditionStatus::False => overrides.ttl_after_failed_seconds,
        ConditionStatus::Unknown => None,
    }
}

pub struct RunTtlReconciler {
    store: Arc<dyn ObjectStore>,
}

impl RunTtlReconciler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn reconcile_at(
        &self,
        key: &ObjectKey,
        now: DateTime<Utc>,
    ) -> Result<Action, ReconcileError> {
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

        if !run.status.is_resolved() {
            return Ok(Action::Done);
        }
        let Some(ttl) = effective_ttl(&run) else {
            return Ok(Action::Done);
        };
        let Some(completion) = run.status.completion_time else {
            debug!("Run resolved without a completion time, skipping");
            return Ok(Action::Done);
        };

        match ttl_decision(completion, Duration::from_secs(ttl), now) {
            TtlDecision::Expired => {
                info!(ttl_seconds = ttl, outcome = %run.status.succeeded(), "Deleting run, TTL expired");
                match self
                    .store
                    .delete_resource::<RunRequest>(&key.namespace, &key.name)
                    .await
                {
                    Ok(()) => Ok(Action::Done),
                    Err(e) if e.is_not_found() => Ok(Action::Done),
                    Err(e) => Err(e.into()),
                }
            }
            TtlDecision::RequeueAfter(left) => {
                debug!(?left, "TTL not reached yet");
                Ok(Action::RequeueAfter(left))
            }
        }
    }
}

#[async_trait]
impl Reconciler for RunTtlReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        self.reconcile_at(key, Utc::now()).await
    }
}

/// RunRequest events that may start or shorten a TTL countdown
pub fn run_request_keys(event: &WatchEvent) -> Vec<ObjectKey> {
    let relevant = match event {
        WatchEvent::Added(Object::RunRequest(run)) => {
            run.status.is_resolved() && effective_ttl(run).is_some()
        }
        WatchEvent::Modified {
            old: Object::RunRequest(old),
            new: Object::RunRequest(new),
        } => {
            if !new.status.is_resolved() || effective_ttl(new).is_none() {
                false
            } else if !old.status.is_resolved() {
                true
            } else {
                match (run_level_ttl(old), run_level_ttl(new)) {
                    (None, Some(_)) => true,
                    (Some(o), Some(n)) => n < o,
                    _ => false,
                }
            }
        }
        _ => false,
    };

    if relevant {
        vec![ObjectKey::from_meta(event.object().meta())]
    } else {
        Vec::new()
    }
}

/// Constructs the TTL retention controller
pub fn controller(config: &Config, store: Arc<dyn ObjectStore>) -> Controller {
    Controller {
        name: "run-ttl",
        reconciler: Arc::new(RunTtlReconciler::new(store)),
        watches: vec![Watch::new(Kind::RunRequest, run_request_keys)],
        workers: config.run_max_concurrent_reconciles,
    }
}
