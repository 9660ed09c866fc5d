//! Read-only verification of replica checksums.
//!
//! Verification never mutates the catalog. Every problem becomes a
//! [`Finding`](eddy_types::Finding); the sweep never stops early.

use eddy_types::{
    ChecksumScheme, ErrorCode, Replica, ReplicaNumber, Severity, VerificationResult,
};
use tracing::{debug, info};

use crate::engine::{ChecksumEngine, ChecksumResponse, note_sibling_differences};
use crate::request::{ChecksumPlan, Target};

impl ChecksumEngine {
    pub(crate) async fn verify_all(
        &self,
        path: &str,
        targets: &[Replica],
        no_compute: bool,
        plan: &ChecksumPlan,
        mut result: VerificationResult,
    ) -> ChecksumResponse {
        let mut registered: Vec<(ReplicaNumber, String)> = Vec::new();
        for replica in targets {
            self.verify_replica(path, replica, no_compute, &mut result)
                .await;
            if replica.has_checksum() {
                registered.push((replica.replica_number, replica.checksum.clone()));
            }
        }
        if plan.target == Target::All {
            note_sibling_differences(&registered, &mut result);
        }

        if result.has_problems() {
            info!(path, findings = result.findings.len(), "verification found problems");
            return ChecksumResponse::Findings(result);
        }
        let checksum = targets
            .first()
            .map(|r| r.checksum.clone())
            .unwrap_or_default();
        ChecksumResponse::Checksum {
            checksum,
            notes: result,
        }
    }

    async fn verify_replica(
        &self,
        path: &str,
        replica: &Replica,
        no_compute: bool,
        result: &mut VerificationResult,
    ) {
        let number = replica.replica_number;
        let physical = match self.physical_size(replica).await {
            Ok(size) => size,
            Err(e) => {
                result.push(
                    Severity::Error,
                    e.code(),
                    Some(number),
                    format!("cannot stat replica {number}: {e}"),
                );
                return;
            }
        };
        if physical != replica.size {
            result.push(
                Severity::Error,
                ErrorCode::UserFileSizeMismatch,
                Some(number),
                format!(
                    "replica {number}: physical size {physical} differs from catalog size {}",
                    replica.size
                ),
            );
        }

        if !replica.has_checksum() {
            result.push(
                Severity::Warning,
                ErrorCode::CatNoChecksumForReplica,
                Some(number),
                format!("replica {number} has no checksum"),
            );
        }
        if no_compute || physical < replica.size {
            return;
        }

        let scheme = ChecksumScheme::of_checksum(&replica.checksum).unwrap_or(self.scheme());
        let digest = match self.digest_with(replica, replica.size, scheme).await {
            Ok(d) => d,
            Err(e) => {
                result.push(
                    Severity::Error,
                    e.code(),
                    Some(number),
                    format!("cannot read replica {number}: {e}"),
                );
                return;
            }
        };
        if replica.has_checksum() && digest != replica.checksum {
            result.push(
                Severity::Error,
                ErrorCode::UserChksumMismatch,
                Some(number),
                format!(
                    "replica {number}: computed {digest} but catalog has {}",
                    replica.checksum
                ),
            );
        } else {
            debug!(path, replica = %number, "replica verified");
        }
    }
}
