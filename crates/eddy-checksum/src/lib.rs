//! Checksum computation, registration and verification for Eddy.
//!
//! This crate provides:
//!
//! - [`ChecksumRequest`]: client flags, validated into a [`ChecksumPlan`]
//!   before the catalog is touched.
//! - [`ChecksumEngine`]: resolves target replicas and runs either
//!   lookup-or-update (return the registered checksum, computing and
//!   registering it when absent or forced) or verification (compare sizes
//!   and digests, report [`VerificationResult`](eddy_types::VerificationResult)
//!   findings, never write).
//! - [`ChecksumResponse`]: a checksum with informational notes, or the
//!   findings of a failed verification.

pub mod engine;
pub mod error;
pub mod request;
mod verify;

pub use engine::{ChecksumEngine, ChecksumResponse};
pub use error::ChecksumError;
pub use request::{ChecksumMode, ChecksumPlan, ChecksumRequest, Target};
