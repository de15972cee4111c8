//! Control-plane wire messages exchanged between cluster nodes.
//!
//! All control traffic is JSON over HTTP. Paths and query parameters are
//! defined here so client and server sides cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::bmeta::BucketMeta;
use crate::cmap::{ClusterMap, Node};

// ---------------------------------------------------------------------------
// Paths and query options
// ---------------------------------------------------------------------------

/// Daemon introspection endpoint; takes a `what` query parameter.
pub const PATH_DAEMON: &str = "/v1/daemon";
/// Registration endpoint served by the primary gateway.
pub const PATH_JOIN: &str = "/v1/cluster/join";
/// Metadata-distribution endpoint served by every node.
pub const PATH_METASYNC: &str = "/v1/metasync";

/// Name of the daemon query parameter.
pub const QPARAM_WHAT: &str = "what";
/// `what` value requesting a [`VoteReply`].
pub const WHAT_SMAP_VOTE: &str = "smap-vote";

// ---------------------------------------------------------------------------
// Action tags
// ---------------------------------------------------------------------------

/// Advisory publish before the primary has persisted its map: live
/// registrations were merged with the disk copy.
pub const ACT_EARLY_START: &str = "early-start-have-registrations";
/// Finalize publish: the primary is up and its map is durable.
pub const ACT_PRIMARY_STARTED: &str = "primary-started-up";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Response to `GET /v1/daemon?what=smap-vote`.
///
/// Any field may be absent: a node that has not installed a map yet replies
/// with both metadata slots empty, and `vote_in_progress` reports whether a
/// primary reelection is running on the responder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReply {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cmap: Option<ClusterMap>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bmeta: Option<BucketMeta>,
    #[serde(default)]
    pub vote_in_progress: bool,
}

/// A node registering itself with the primary gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub node: Node,
}

/// The primary's answer to a [`JoinRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reject_reason: Option<String>,
    /// The cluster map as of the accepted registration.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cmap: Option<ClusterMap>,
}

/// Unit of metadata distribution: the primary pushes map/bucket-metadata
/// pairs tagged with an opaque action string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cmap: Option<ClusterMap>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bmeta: Option<BucketMeta>,
}
