//! Error taxonomy for the bootstrap and metadata-reconciliation paths.
//!
//! Cluster-integrity errors are fatal by definition: they mean two node
//! groups hold incompatible views of the cluster identity, and no automatic
//! recovery is safe. They carry numeric `cie#` codes so operators can grep
//! a fleet's logs for a specific failure class.

use reefstore_core::MergeError;

// ---------------------------------------------------------------------------
// ClusterIntegrityError
// ---------------------------------------------------------------------------

/// Fatal inconsistencies between this node's metadata and the cluster's.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterIntegrityError {
    /// Discovery surfaced a cluster map with a different uuid.
    #[error("cie#10: split-brain cluster uuid: local {local} vs {remote} via {peer}")]
    SplitBrainUuid {
        local: String,
        remote: String,
        peer: String,
    },

    /// A peer with the same uuid but an older (or equal) map version claims
    /// a different primary.
    #[error("cie#20: stale peer claims a different primary: local {local} vs {remote}")]
    StalePrimaryClaim { local: String, remote: String },

    /// Two targets reported different non-empty cluster uuids during
    /// slow-path resolution.
    #[error("cie#30: targets disagree on cluster uuid: {uuid_a} from {node_a} vs {uuid_b} from {node_b}")]
    TargetUuidDisagreement {
        uuid_a: String,
        node_a: String,
        uuid_b: String,
        node_b: String,
    },

    /// Bucket-metadata responders split evenly between two uuids; no
    /// majority exists.
    #[error("cie#40: bucket-metadata uuid split: {votes} responders for each of {uuid_a} and {uuid_b}")]
    BmetaUuidSplit {
        uuid_a: String,
        uuid_b: String,
        votes: usize,
    },

    /// Strict merge during discovery found two node ids sharing one
    /// control endpoint.
    #[error("cie#50: merge conflict: {0}")]
    MergeConflict(#[from] MergeError),
}

impl ClusterIntegrityError {
    /// Numeric error code carried in the fatal diagnostic.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::SplitBrainUuid { .. } => 10,
            Self::StalePrimaryClaim { .. } => 20,
            Self::TargetUuidDisagreement { .. } => 30,
            Self::BmetaUuidSplit { .. } => 40,
            Self::MergeConflict(_) => 50,
        }
    }
}

// ---------------------------------------------------------------------------
// OwnerError
// ---------------------------------------------------------------------------

/// Failures of the per-kind metadata owner's persistence hooks.
#[derive(Debug, thiserror::Error)]
pub enum OwnerError {
    /// No snapshot has ever been persisted at the configured path.
    ///
    /// Not an error during bootstrap: it simply means "no loaded map".
    #[error("no persisted snapshot")]
    NotPersisted,

    #[error("persistence i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted snapshot is malformed: {0}")]
    Codec(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// BootstrapError
// ---------------------------------------------------------------------------

/// Terminal bootstrap failures, surfaced to the binary which logs the
/// one-line diagnostic and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// `AIS_IS_PRIMARY=true` combined with an `AIS_PRIMARY_ID` naming a
    /// different node.
    #[error("invalid combination of AIS_IS_PRIMARY=true and AIS_PRIMARY_ID={primary_id}")]
    Misconfig { primary_id: String },

    /// Join retries exhausted against every known primary candidate.
    #[error("failed to join cluster after {attempts} attempts: {last_error}")]
    JoinFailed { attempts: u32, last_error: String },

    #[error(transparent)]
    Integrity(#[from] ClusterIntegrityError),

    /// Could not durably write the cluster map at finalize.
    #[error("failed to persist cluster map: {0}")]
    Persist(#[source] OwnerError),
}
