//! Replica metadata store wrapping Fjall.
//!
//! [`Catalog`] is the authoritative record of every data object and its
//! replicas. It is the only durable state of the replica lifecycle: every
//! status transition is one read-modify-write of a [`DataObject`] record,
//! taken under a commit guard and re-validated before it is persisted.
//!
//! - `objects`: logical path → serialized [`DataObject`]
//! - `ids`: [`DataId`] → logical path
//! - `sequences`: named counters (data id allocation)
//!
//! [`AccessControl`] is the permission collaborator consulted by the engine.
//!
//! [`DataObject`]: eddy_types::DataObject
//! [`DataId`]: eddy_types::DataId

mod access;
mod error;
mod store;

pub use access::{AccessControl, Grant, Permission, StaticAccessControl};
pub use error::CatalogError;
pub use store::{Catalog, ReplicaSelector, ReplicaUpdate, UpdateAuth};
