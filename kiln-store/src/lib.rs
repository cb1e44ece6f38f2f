//! Kiln Store
//!
//! The object store contract used by the Kiln controllers.
//!
//! This crate provides:
//! - [`ObjectStore`]: keyed, versioned storage with watches
//! - [`ObjectStoreExt`]: typed helpers over the raw contract
//! - [`OwnershipBinder`]: controller owner references
//! - [`InMemoryStore`]: a complete in-process implementation
//!
//! # Example
//!
//! ```no_run
//! use kiln_core::domain::service_account::ServiceAccount;
//! use kiln_store::{InMemoryStore, ObjectStoreExt};
//!
//! #[tokio::main]
//! async fn main() -> kiln_store::Result<()> {
//!     let store = InMemoryStore::new();
//!     let created = store.create_resource(ServiceAccount::new("default", "pipeline")).await?;
//!     println!("Created {} at version {}", created.metadata.name, created.metadata.resource_version);
//!     Ok(())
//! }
//! ```

pub mod error;
mod memory;
pub mod ownership;
mod store;

pub use error::{Result, StoreError};
pub use memory::{DEFAULT_WATCH_CAPACITY, InMemoryStore};
pub use ownership::{ControllerReferences, OwnershipBinder, OwnershipError};
pub use store::{ObjectStore, ObjectStoreExt, WatchEvent, downcast};
