//! Physical replica storage and resource topology.
//!
//! This crate defines the [`PhysicalStorage`] trait the engine uses to move
//! replica bytes, along with two backends:
//!
//! - [`MemoryStorage`] — in-memory storage with fault injection for tests.
//! - [`FileStorage`] — one vault directory per leaf resource on local disk.
//!
//! [`ResourceTopology`] answers which resources exist, how a resource name
//! resolves to a leaf hierarchy, and which leaves are bundle storage.

mod error;
mod file_storage;
mod memory_storage;
mod topology;
mod traits;

pub use error::StorageError;
pub use file_storage::FileStorage;
pub use memory_storage::{DigestGate, MemoryStorage};
pub use topology::{ResourceTopology, StaticTopology};
pub use traits::PhysicalStorage;
