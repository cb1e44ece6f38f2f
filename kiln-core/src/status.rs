//! Projection of ExecutionPlan progress onto a RunRequest status

use chrono::{DateTime, Utc};

use crate::domain::meta::LABEL_RUN_REQUEST;
use crate::domain::plan::ExecutionPlan;
use crate::domain::run::{Condition, ConditionStatus, RunRequest, RunStatus};

/// Reason the execution engine reports when a plan exceeded its timeout
pub const ENGINE_REASON_TIMED_OUT: &str = "TimedOut";

/// Reason recorded on the run for a timed out plan
pub const REASON_RUN_TIMEOUT: &str = "RunTimeout";

/// Reason of a run whose plan exists but has not reported progress yet
pub const REASON_PENDING: &str = "Pending";

/// Computes the run status reflecting the plan's current state
///
/// Start and completion times already recorded on the run are kept; missing
/// ones are filled from the plan, the completion time only once the plan
/// resolved. `last_transition_time` is stamped with `now` only when the
/// condition status or reason changes.
pub fn project_plan_status(run: &RunRequest, plan: &ExecutionPlan, now: DateTime<Utc>) -> RunStatus {
    let mut status = run.status.clone();

    let mut condition = match &plan.status.condition {
        Some(plan_condition) if plan_condition.reason == ENGINE_REASON_TIMED_OUT => {
            let run_name = plan
                .metadata
                .labels
                .get(LABEL_RUN_REQUEST)
                .unwrap_or(&run.metadata.name);
            let limit = plan
                .spec
                .timeout_seconds
                .map(|secs| format!("{}s", secs))
                .unwrap_or_else(|| "the configured timeout".to_string());
            Condition::new(
                plan_condition.status,
                REASON_RUN_TIMEOUT,
                format!("RunRequest {} failed to finish within {}", run_name, limit),
            )
        }
        Some(plan_condition) => Condition::new(
            plan_condition.status,
            plan_condition.reason.clone(),
            plan_condition.message.clone(),
        ),
        None => Condition::new(ConditionStatus::Unknown, REASON_PENDING, ""),
    };

    condition.last_transition_time = match &run.status.condition {
        Some(previous)
            if previous.status == condition.status && previous.reason == condition.reason =>
        {
            previous.last_transition_time
        }
        _ => Some(now),
    };

    let resolved = condition.status != ConditionStatus::Unknown;
    status.condition = Some(condition);
    status.latest_plan_ref = Some(plan.metadata.name.clone());

    if status.start_time.is_none() {
        status.start_time = plan.status.start_time;
    }
    if status.completion_time.is_none() && resolved {
        status.completion_time = plan.status.completion_time;
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meta::ObjectMeta;
    use crate::domain::plan::{OutputBinding, PlanSpec, PlanStatus, PlanTemplate, SourceBinding};
    use crate::domain::run::RunRequestSpec;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn run() -> RunRequest {
        RunRequest {
            metadata: ObjectMeta::namespaced("ns", "r1"),
            spec: RunRequestSpec {
                build_ref: "b1".to_string(),
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    fn plan(condition: Option<Condition>, start: Option<i64>, completion: Option<i64>) -> ExecutionPlan {
        let mut metadata = ObjectMeta::namespaced("ns", "r1-abcde");
        metadata
            .labels
            .insert(LABEL_RUN_REQUEST.to_string(), "r1".to_string());
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
                    image: "registry.example/app".to_string(),
                },
                params: vec![],
                timeout_seconds: Some(600),
            },
            status: PlanStatus {
                condition,
                start_time: start.map(at),
                completion_time: completion.map(at),
            },
        }
    }

    #[test]
    fn test_no_plan_condition_is_pending() {
        let status = project_plan_status(&run(), &plan(None, None, None), at(0));
        let condition = status.condition.unwrap();
        assert_eq!(condition.status, ConditionStatus::Unknown);
        assert_eq!(condition.reason, REASON_PENDING);
        assert_eq!(condition.last_transition_time, Some(at(0)));
        assert_eq!(status.latest_plan_ref.as_deref(), Some("r1-abcde"));
    }

    #[test]
    fn test_running_copies_start_time_only() {
        let running = Condition::new(ConditionStatus::Unknown, "Running", "step 1");
        let status = project_plan_status(&run(), &plan(Some(running), Some(5), Some(9)), at(10));
        assert_eq!(status.start_time, Some(at(5)));
        assert_eq!(status.completion_time, None);
    }

    #[test]
    fn test_succeeded_copies_completion() {
        let done = Condition::new(ConditionStatus::True, "Succeeded", "all steps done");
        let status = project_plan_status(&run(), &plan(Some(done), Some(5), Some(50)), at(60));
        let condition = status.condition.as_ref().unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, "Succeeded");
        assert_eq!(status.completion_time, Some(at(50)));
        assert!(status.is_resolved());
    }

    #[test]
    fn test_timed_out_is_rewritten() {
        let timed_out = Condition::new(ConditionStatus::False, ENGINE_REASON_TIMED_OUT, "engine msg");
        let status = project_plan_status(&run(), &plan(Some(timed_out), Some(0), Some(600)), at(601));
        let condition = status.condition.unwrap();
        assert_eq!(condition.reason, REASON_RUN_TIMEOUT);
        assert_eq!(condition.message, "RunRequest r1 failed to finish within 600s");
    }

    #[test]
    fn test_existing_times_are_kept() {
        let mut r = run();
        r.status.start_time = Some(at(1));
        let done = Condition::new(ConditionStatus::False, "Failed", "boom");
        let status = project_plan_status(&r, &plan(Some(done), Some(5), Some(7)), at(8));
        assert_eq!(status.start_time, Some(at(1)));
        assert_eq!(status.completion_time, Some(at(7)));
    }

    #[test]
    fn test_transition_time_only_changes_with_condition() {
        let running = Condition::new(ConditionStatus::Unknown, "Running", "step 1");
        let first = project_plan_status(&run(), &plan(Some(running.clone()), Some(5), None), at(10));

        let mut r = run();
        r.status = first.clone();
        let mut still_running = running;
        still_running.message = "step 2".to_string();
        let second = project_plan_status(&r, &plan(Some(still_running), Some(5), None), at(20));
        assert_eq!(
            second.condition.as_ref().unwrap().last_transition_time,
            Some(at(10))
        );
        assert_eq!(second.condition.as_ref().unwrap().message, "step 2");

        r.status = second;
        let done = Condition::new(ConditionStatus::True, "Succeeded", "");
        let third = project_plan_status(&r, &plan(Some(done), Some(5), Some(30)), at(30) + Duration::seconds(1));
        assert_eq!(
            third.condition.unwrap().last_transition_time,
            Some(at(31))
        );
    }

    #[test]
    fn test_projection_is_stable() {
        let done = Condition::new(ConditionStatus::True, "Succeeded", "");
        let p = plan(Some(done), Some(5), Some(30));
        let mut r = run();
        r.status = project_plan_status(&r, &p, at(40));
        assert_eq!(project_plan_status(&r, &p, at(90)), r.status);
    }
}
