//! Reconcilers
//!
//! - `run`: generates one ExecutionPlan per RunRequest and mirrors its status
//! - `build_limit`: keeps the number of finished runs per template bounded
//! - `run_ttl`: deletes finished runs once their time to live has passed

pub mod build_limit;
pub mod run;
pub mod run_ttl;

#[cfg(test)]
pub(crate) mod testing;

use crate::scheduler::ControllerConstructor;

/// Every controller the manager starts
pub const CONTROLLERS: &[ControllerConstructor] =
    &[run::controller, build_limit::controller, run_ttl::controller];
