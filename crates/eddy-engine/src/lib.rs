//! The replica lifecycle engine.
//!
//! A [`Coordinator`] ties the catalog, physical storage, resource topology,
//! access control and checksum engine together. Clients act through a
//! [`Session`], one per connection, which owns its [`OpenHandle`]s:
//!
//! - [`statemach`]: the replica status transition table and admission rules.
//! - [`Coordinator`]: open, write, read and close of replicas.
//! - [`replicate`]: copying a good replica onto another resource.
//! - [`recovery`]: finalizing locks left behind by failed closes, dropped
//!   sessions and dead agents.
//! - [`api`]: serde request/response types and the per-connection [`Agent`].

pub mod api;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod recovery;
pub mod replicate;
pub mod session;
pub mod statemach;

pub use api::{Agent, Request, Response};
pub use coordinator::{CloseRequest, Coordinator, OpenRequest};
pub use error::EngineError;
pub use handle::{HandleId, OpenHandle, OpenMode};
pub use recovery::recover_orphaned_locks;
pub use replicate::{ReplicateOutcome, ReplicateRequest};
pub use session::Session;
pub use statemach::SiblingDisposition;

#[cfg(test)]
mod tests;
