//! ExecutionPlan assembly

use crate::domain::build::BuildTemplate;
use crate::domain::meta::{
    LABEL_BUILD_TEMPLATE, LABEL_BUILD_TEMPLATE_GENERATION, LABEL_RUN_REQUEST,
    LABEL_RUN_REQUEST_GENERATION, ObjectMeta,
};
use crate::domain::plan::{ExecutionPlan, OutputBinding, Param, PlanSpec, PlanStatus, SourceBinding};
use crate::domain::run::RunRequest;
use crate::domain::strategy::StepTemplate;
use crate::error::PlanError;

use super::plan::build_plan_template;
use super::{DEFAULT_REVISION, PARAM_BUILDER_IMAGE, PARAM_DOCKERFILE, PARAM_PATH_CONTEXT};

/// Assembles the ExecutionPlan for a run
///
/// The plan has no name yet: the store derives one from `generate_name`.
/// Owner references are left to the caller.
pub fn assemble_plan(
    build: &BuildTemplate,
    run: &RunRequest,
    service_account: &str,
    steps: &[StepTemplate],
) -> Result<ExecutionPlan, PlanError> {
    let template = build_plan_template(build, run, steps)?;

    let mut metadata = ObjectMeta {
        generate_name: Some(format!("{}-", run.metadata.name)),
        namespace: run.metadata.namespace.clone(),
        ..Default::default()
    };
    metadata
        .labels
        .insert(LABEL_BUILD_TEMPLATE.to_string(), build.metadata.name.clone());
    metadata.labels.insert(
        LABEL_BUILD_TEMPLATE_GENERATION.to_string(),
        build.metadata.generation.to_string(),
    );
    metadata
        .labels
        .insert(LABEL_RUN_REQUEST.to_string(), run.metadata.name.clone());
    metadata.labels.insert(
        LABEL_RUN_REQUEST_GENERATION.to_string(),
        run.metadata.generation.to_string(),
    );

    let source = &build.spec.source;
    let output = run.spec.output.as_ref().unwrap_or(&build.spec.output);

    Ok(ExecutionPlan {
        metadata,
        spec: PlanSpec {
            service_account_name: service_account.to_string(),
            template,
            source: SourceBinding {
                url: source.url.clone(),
                revision: source
                    .revision
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
            },
            output: OutputBinding {
                image: output.image.clone(),
            },
            params: resolved_params(build),
            timeout_seconds: run.spec.timeout_seconds.or(build.spec.timeout_seconds),
        },
        status: PlanStatus::default(),
    })
}

fn resolved_params(build: &BuildTemplate) -> Vec<Param> {
    let spec = &build.spec;
    [
        (PARAM_BUILDER_IMAGE, spec.builder.as_ref().map(|b| &b.image)),
        (PARAM_DOCKERFILE, spec.dockerfile.as_ref()),
        (PARAM_PATH_CONTEXT, spec.source.context_dir.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value.map(|value| Param {
            name: name.to_string(),
            value: value.clone(),
        })
    })
    .collect()
}
