//! Kiln Core
//!
//! Core types and pure logic for the Kiln build controller.
//!
//! This crate contains:
//! - Domain types: the resources kept in the object store (BuildTemplate,
//!   strategies, RunRequest, ExecutionPlan, ServiceAccount)
//! - Object model: the `Kind`/`Object` envelope and the `Resource` trait
//! - Generation: turning a template, a strategy and a run into an ExecutionPlan
//! - Credentials and status projection helpers used by the controllers

pub mod credentials;
pub mod domain;
pub mod error;
pub mod generate;
pub mod object;
pub mod status;

pub use error::PlanError;
pub use object::{Kind, Object, Resource};
