//! Core domain types
//!
//! This module contains the resources Kiln keeps in the object store.
//! They are shared between the store (for persistence and watches) and the
//! controllers (for reconciliation).

pub mod build;
pub mod meta;
pub mod plan;
pub mod resources;
pub mod run;
pub mod service_account;
pub mod strategy;
