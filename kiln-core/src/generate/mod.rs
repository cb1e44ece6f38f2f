//! ExecutionPlan generation
//!
//! Pure functions turning a BuildTemplate, the steps of its strategy and a
//! RunRequest into an ExecutionPlan ready to be created in the store.

pub mod assembler;
pub mod plan;
pub mod resources;
pub mod substitution;

pub use assembler::assemble_plan;
pub use plan::build_plan_template;
pub use resources::merge_resources;
pub use substitution::substitute;

/// Param carrying the builder image
pub const PARAM_BUILDER_IMAGE: &str = "BUILDER_IMAGE";

/// Param carrying the Dockerfile path
pub const PARAM_DOCKERFILE: &str = "DOCKERFILE";

/// Param carrying the build context directory
pub const PARAM_PATH_CONTEXT: &str = "PATH_CONTEXT";

/// Revision used when the source names none
pub const DEFAULT_REVISION: &str = "master";
