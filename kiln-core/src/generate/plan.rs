//! Plan template construction from strategy steps

use crate::domain::build::BuildTemplate;
use crate::domain::plan::{ParamSpec, PlanStep, PlanTemplate, Volume};
use crate::domain::run::RunRequest;
use crate::domain::strategy::StepTemplate;
use crate::error::PlanError;

use super::resources::merge_resources;
use super::substitution::{substitute, substitute_all};
use super::{PARAM_BUILDER_IMAGE, PARAM_DOCKERFILE, PARAM_PATH_CONTEXT};

/// Builds the step pipeline of an ExecutionPlan
///
/// Every step image, command and argument has its placeholder tokens
/// rewritten. When either the template or the run declares resource
/// requirements, the merged requirements are set on every step. Volumes
/// referenced by step mounts are declared once each, in the order they
/// first appear.
pub fn build_plan_template(
    build: &BuildTemplate,
    run: &RunRequest,
    steps: &[StepTemplate],
) -> Result<PlanTemplate, PlanError> {
    let resources = merge_resources(build.spec.resources.as_ref(), run.spec.resources.as_ref())?;

    let mut volumes: Vec<Volume> = Vec::new();
    let mut plan_steps = Vec::with_capacity(steps.len());

    for step in steps {
        for mount in &step.volume_mounts {
            if !volumes.iter().any(|v| v.name == mount.name) {
                volumes.push(Volume {
                    name: mount.name.clone(),
                });
            }
        }

        plan_steps.push(PlanStep {
            name: step.name.clone(),
            image: substitute(&step.image),
            command: substitute_all(&step.command),
            args: substitute_all(&step.args),
            working_dir: step.working_dir.clone(),
            security_context: step.security_context.clone(),
            volume_mounts: step.volume_mounts.clone(),
            env: step.env.clone(),
            resources: resources.clone(),
        });
    }

    Ok(PlanTemplate {
        params: declared_params(build),
        steps: plan_steps,
        volumes,
    })
}

fn declared_params(build: &BuildTemplate) -> Vec<ParamSpec> {
    let mut params = vec![
        ParamSpec {
            name: PARAM_DOCKERFILE.to_string(),
            description: "Path to the Dockerfile".to_string(),
            default: Some("Dockerfile".to_string()),
        },
        ParamSpec {
            name: PARAM_PATH_CONTEXT.to_string(),
            description: "The root of the code".to_string(),
            default: Some(".".to_string()),
        },
    ];

    if let Some(builder) = &build.spec.builder {
        params.push(ParamSpec {
            name: PARAM_BUILDER_IMAGE.to_string(),
            description: "Image containing the build tools".to_string(),
            default: Some(builder.image.clone()),
        });
    }

    params
}
