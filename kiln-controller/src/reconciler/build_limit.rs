//! Count-limit retention controller
//!
//! Keeps at most `succeeded_limit` succeeded and `failed_limit` failed
//! RunRequests per BuildTemplate, deleting the oldest ones first.

use async_trait::async_trait;
use kiln_core::domain::build::BuildTemplate;
use kiln_core::domain::meta::{LABEL_BUILD_TEMPLATE, LabelSelector, ObjectKey};
use kiln_core::domain::run::{ConditionStatus, RunRequest};
use kiln_core::{Kind, Object};
use kiln_store::{ObjectStore, ObjectStoreExt, WatchEvent};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ReconcileError;
use crate::scheduler::{Action, Controller, Reconciler, Watch};

pub struct BuildLimitReconciler {
    store: Arc<dyn ObjectStore>,
}

impl BuildLimitReconciler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Deletes the oldest runs beyond `limit`
    async fn prune(
        &self,
        mut runs: Vec<RunRequest>,
        limit: u32,
        outcome: &str,
    ) -> Result<(), ReconcileError> {
        let limit = limit as usize;
        if runs.len() <= limit {
            return Ok(());
        }

        sort_oldest_first(&mut runs);
        let excess = runs.len() - limit;
        for run in runs.iter().take(excess) {
            let namespace = run.metadata.namespace_or_empty();
            info!(run = %run.metadata.name, outcome, limit, "Deleting run, retention limit reached");
            match self
                .store
                .delete_resource::<RunRequest>(namespace, &run.metadata.name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(run = %run.metadata.name, "Run already deleted");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Orders runs by completion time, falling back to creation time
pub fn sort_oldest_first(runs: &mut [RunRequest]) {
    runs.sort_by(|a, b| {
        let a_time = a.status.completion_time.or(a.metadata.creation_timestamp);
        let b_time = b.status.completion_time.or(b.metadata.creation_timestamp);
        a_time
            .cmp(&b_time)
            .then_with(|| a.metadata.creation_timestamp.cmp(&b.metadata.creation_timestamp))
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    });
}

#[async_trait]
impl Reconciler for BuildLimitReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let build = match self
            .store
            .get_resource::<BuildTemplate>(&key.namespace, &key.name)
            .await
        {
            Ok(build) => build,
            Err(e) if e.is_not_found() => {
                debug!("BuildTemplate not found, nothing to do");
                return Ok(Action::Done);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(retention) = build.spec.retention.as_ref() else {
            return Ok(Action::Done);
        };
        if retention.succeeded_limit.is_none() && retention.failed_limit.is_none() {
            return Ok(Action::Done);
        }

        let mut selector = LabelSelector::new();
        selector.insert(LABEL_BUILD_TEMPLATE.to_string(), build.metadata.name.clone());
        let runs: Vec<RunRequest> = self
            .store
            .list_resources(Some(&key.namespace), &selector)
            .await?;

        let (succeeded, failed): (Vec<_>, Vec<_>) = runs
            .into_iter()
            .filter(|r| r.status.is_resolved())
            .partition(|r| r.status.succeeded() == ConditionStatus::True);

        if let Some(limit) = retention.succeeded_limit {
            self.prune(succeeded, limit, "succeeded").await?;
        }
        if let Some(limit) = retention.failed_limit {
            self.prune(failed, limit, "failed").await?;
        }

        Ok(Action::Done)
    }
}

// =============================================================================
// Watch predicates
// =============================================================================

fn introduced_or_lowered(old: Option<u32>, new: Option<u32>) -> bool {
    match (old, new) {
        (None, Some(_)) => true,
        (Some(o), Some(n)) => n < o,
        _ => false,
    }
}

/// BuildTemplate events that may leave too many runs behind
pub fn build_template_keys(event: &WatchEvent) -> Vec<ObjectKey> {
    let relevant = match event {
        WatchEvent::Added(Object::BuildTemplate(build)) => build.spec.has_count_limits(),
        WatchEvent::Modified {
            old: Object::BuildTemplate(old),
            new: Object::BuildTemplate(new),
        } => {
            let old = old.spec.retention.clone().unwrap_or_default();
            match &new.spec.retention {
                Some(new) => {
                    introduced_or_lowered(old.succeeded_limit, new.succeeded_limit)
                        || introduced_or_lowered(old.failed_limit, new.failed_limit)
                }
                None => false,
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

/// RunRequest updates that just resolved a run whose template has limits
pub fn run_request_keys(event: &WatchEvent) -> Vec<ObjectKey> {
    match event {
        WatchEvent::Modified {
            old: Object::RunRequest(old),
            new: Object::RunRequest(new),
        } if !old.status.is_resolved()
            && new.status.is_resolved()
            && new
                .status
                .build_spec
                .as_ref()
                .is_some_and(|spec| spec.has_count_limits()) =>
        {
            vec![ObjectKey::new(
                new.metadata.namespace_or_empty(),
                new.spec.build_ref.clone(),
            )]
        }
        _ => Vec::new(),
    }
}

/// Constructs the count-limit retention controller
pub fn controller(config: &Config, store: Arc<dyn ObjectStore>) -> Controller {
    Controller {
        name: "build-limit",
        reconciler: Arc::new(BuildLimitReconciler::new(store)),
        watches: vec![
            Watch::new(Kind::BuildTemplate, build_template_keys),
            Watch::new(Kind::RunRequest, run_request_keys),
        ],
        workers: config.template_max_concurrent_reconciles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::testing;
    use chrono::{Duration, TimeZone, Utc};
    use kiln_core::domain::build::Retention;
    use kiln_core::domain::run::Condition;
    use kiln_store::InMemoryStore;

    fn at(minutes: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn limited(name: &str, succeeded: Option<u32>, failed: Option<u32>) -> BuildTemplate {
        let mut build = testing::build_template(name, "kaniko");
        build.spec.retention = Some(Retention {
            succeeded_limit: succeeded,
            failed_limit: failed,
            ..Default::default()
        });
        build
    }

    async fn remaining(store: &InMemoryStore) -> Vec<String> {
        let mut names: Vec<String> = store
            .list_resources::<RunRequest>(Some(testing::NAMESPACE), &LabelSelector::new())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.metadata.name)
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_prunes_oldest_beyond_limits() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_resource(limited("b1", Some(2), Some(1)))
            .await
            .unwrap();

        let runs = [
            ("ok-1", ConditionStatus::True, 1),
            ("ok-2", ConditionStatus::True, 5),
            ("ok-3", ConditionStatus::True, 3),
            ("ok-4", ConditionStatus::True, 4),
            ("bad-1", ConditionStatus::False, 2),
            ("bad-2", ConditionStatus::False, 6),
            ("running", ConditionStatus::Unknown, 0),
        ];
        for (name, status, minute) in runs {
            store
                .create_resource(testing::finished_run(name, "b1", status, at(minute)))
                .await
                .unwrap();
        }

        let reconciler = BuildLimitReconciler::new(store.clone());
        reconciler
            .reconcile(&ObjectKey::new(testing::NAMESPACE, "b1"))
            .await
            .unwrap();

        assert_eq!(
            remaining(&store).await,
            vec!["bad-2", "ok-2", "ok-4", "running"]
        );

        // A second pass has nothing left to do
        reconciler
            .reconcile(&ObjectKey::new(testing::NAMESPACE, "b1"))
            .await
            .unwrap();
        assert_eq!(remaining(&store).await.len(), 4);
    }

    #[tokio::test]
    async fn test_zero_limit_deletes_all_of_outcome() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_resource(limited("b1", None, Some(0)))
            .await
            .unwrap();
        store
            .create_resource(testing::finished_run("bad", "b1", ConditionStatus::False, at(1)))
            .await
            .unwrap();
        store
            .create_resource(testing::finished_run("ok", "b1", ConditionStatus::True, at(2)))
            .await
            .unwrap();

        BuildLimitReconciler::new(store.clone())
            .reconcile(&ObjectKey::new(testing::NAMESPACE, "b1"))
            .await
            .unwrap();
        assert_eq!(remaining(&store).await, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_only_runs_of_the_template_count() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_resource(limited("b1", Some(1), None))
            .await
            .unwrap();
        for (name, build, minute) in [("a", "b1", 1), ("b", "b1", 2), ("c", "other", 0)] {
            store
                .create_resource(testing::finished_run(name, build, ConditionStatus::True, at(minute)))
                .await
                .unwrap();
        }

        BuildLimitReconciler::new(store.clone())
            .reconcile(&ObjectKey::new(testing::NAMESPACE, "b1"))
            .await
            .unwrap();
        assert_eq!(remaining(&store).await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_without_limits_or_template() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_resource(testing::build_template("b1", "kaniko"))
            .await
            .unwrap();
        store
            .create_resource(testing::finished_run("a", "b1", ConditionStatus::True, at(1)))
            .await
            .unwrap();

        let reconciler = BuildLimitReconciler::new(store.clone());
        for name in ["b1", "ghost"] {
            let action = reconciler
                .reconcile(&ObjectKey::new(testing::NAMESPACE, name))
                .await
                .unwrap();
            assert_eq!(action, Action::Done);
        }
        assert_eq!(remaining(&store).await, vec!["a"]);
    }

    #[test]
    fn test_sort_falls_back_to_creation_time() {
        let mut with_completion = testing::finished_run("late", "b1", ConditionStatus::True, at(10));
        with_completion.metadata.creation_timestamp = Some(at(0));
        let mut without_completion = testing::run_request("early", "b1");
        without_completion.metadata.creation_timestamp = Some(at(5));

        let mut runs = vec![with_completion, without_completion];
        sort_oldest_first(&mut runs);
        assert_eq!(runs[0].metadata.name, "early");
    }

    #[test]
    fn test_build_template_predicate() {
        let plain = testing::build_template("b1", "kaniko");
        assert!(build_template_keys(&WatchEvent::Added(plain.clone().into())).is_empty());

        let limited_two = limited("b1", Some(2), None);
        assert_eq!(
            build_template_keys(&WatchEvent::Added(limited_two.clone().into())).len(),
            1
        );

        // Introduced
        assert_eq!(
            build_template_keys(&WatchEvent::Modified {
                old: plain.clone().into(),
                new: limited_two.clone().into(),
            })
            .len(),
            1
        );

        // Lowered
        let limited_one = limited("b1", Some(1), None);
        assert_eq!(
            build_template_keys(&WatchEvent::Modified {
                old: limited_two.clone().into(),
                new: limited_one.clone().into(),
            })
            .len(),
            1
        );

        // Raised or removed
        assert!(
            build_template_keys(&WatchEvent::Modified {
                old: limited_one.into(),
                new: limited_two.clone().into(),
            })
            .is_empty()
        );
        assert!(
            build_template_keys(&WatchEvent::Modified {
                old: limited_two.into(),
                new: plain.into(),
            })
            .is_empty()
        );
    }

    #[test]
    fn test_run_request_predicate() {
        let mut old = testing::run_request("r1", "b1");
        old.status.build_spec = Some(limited("b1", Some(1), None).spec);

        let mut new = old.clone();
        new.status.condition = Some(Condition::new(ConditionStatus::True, "Succeeded", ""));
        assert_eq!(
            run_request_keys(&WatchEvent::Modified {
                old: old.clone().into(),
                new: new.clone().into(),
            }),
            vec![ObjectKey::new(testing::NAMESPACE, "b1")]
        );

        // Already resolved before
        assert!(
            run_request_keys(&WatchEvent::Modified {
                old: new.clone().into(),
                new: new.clone().into(),
            })
            .is_empty()
        );

        // Snapshot without limits
        let mut unlimited_old = old.clone();
        unlimited_old.status.build_spec = Some(testing::build_template("b1", "kaniko").spec);
        let mut unlimited_new = new;
        unlimited_new.status.build_spec = unlimited_old.status.build_spec.clone();
        assert!(
            run_request_keys(&WatchEvent::Modified {
                old: unlimited_old.into(),
                new: unlimited_new.into(),
            })
            .is_empty()
        );

        assert!(run_request_keys(&WatchEvent::Added(old.into())).is_empty());
    }
}
