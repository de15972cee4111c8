//! Versioned cluster map: the authoritative snapshot of cluster membership.
//!
//! Every node caches a `ClusterMap` locally. Instances are versioned and
//! tagged with the cluster uuid; the version is monotonically non-decreasing
//! per uuid, and only the primary gateway distributes new versions. A map
//! handed to an owner is immutable from that point on; mutation goes through
//! clone-and-replace.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::traits::VersionedMeta;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Role of a node within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Control-plane node; at most one gateway is primary at a time.
    Gateway,
    /// Storage node.
    Target,
}

/// Identity and control endpoint of a single cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Globally unique node id.
    pub id: String,
    /// Base URL of the node's control-plane listener.
    pub ctrl_url: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn gateway(id: impl Into<String>, ctrl_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctrl_url: ctrl_url.into(),
            kind: NodeKind::Gateway,
        }
    }

    pub fn target(id: impl Into<String>, ctrl_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctrl_url: ctrl_url.into(),
            kind: NodeKind::Target,
        }
    }

    /// Returns the `(host, port)` pair of the control URL.
    ///
    /// Two nodes that resolve to the same endpoint cannot coexist in one
    /// map; this is what merge duplicate detection compares.
    #[must_use]
    pub fn endpoint(&self) -> (String, u16) {
        let rest = match self.ctrl_url.split_once("://") {
            Some((_, rest)) => rest,
            None => self.ctrl_url.as_str(),
        };
        let authority = rest.split('/').next().unwrap_or(rest);
        match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().unwrap_or(80);
                (host.to_string(), port)
            }
            None => (authority.to_string(), 80),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NodeKind::Gateway => "g",
            NodeKind::Target => "t",
        };
        write!(f, "{}[{}]", self.id, kind)
    }
}

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// Strict-merge failure: two distinct node ids share one control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate endpoint {host}:{port}: {existing} vs {incoming}")]
pub struct MergeError {
    pub host: String,
    pub port: u16,
    pub existing: String,
    pub incoming: String,
}

// ---------------------------------------------------------------------------
// ClusterMap
// ---------------------------------------------------------------------------

/// Versioned, uuid-tagged snapshot of the gateway and target sets.
///
/// The uuid is assigned exactly once, at cluster genesis, by the first
/// primary that persists a map with an empty uuid; `creation_time` is fixed
/// at the same moment and never changes for that uuid afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMap {
    pub uuid: String,
    pub version: i64,
    pub creation_time: i64,
    pub primary_id: String,
    pub gateways: BTreeMap<String, Node>,
    pub targets: BTreeMap<String, Node>,
}

impl ClusterMap {
    /// An empty map: version 0, no uuid, no members.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count_gateways(&self) -> usize {
        self.gateways.len()
    }

    #[must_use]
    pub fn count_targets(&self) -> usize {
        self.targets.len()
    }

    /// Total node count across both sets.
    #[must_use]
    pub fn count_nodes(&self) -> usize {
        self.gateways.len() + self.targets.len()
    }

    #[must_use]
    pub fn get_gateway(&self, id: &str) -> Option<&Node> {
        self.gateways.get(id)
    }

    /// Looks up a node of either kind.
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.gateways.get(id).or_else(|| self.targets.get(id))
    }

    /// The designated primary gateway, if present in the gateway set.
    #[must_use]
    pub fn primary(&self) -> Option<&Node> {
        if self.primary_id.is_empty() {
            return None;
        }
        self.gateways.get(&self.primary_id)
    }

    #[must_use]
    pub fn is_primary(&self, id: &str) -> bool {
        !self.primary_id.is_empty() && self.primary_id == id
    }

    /// Inserts or replaces a node in the set matching its kind.
    pub fn set_node(&mut self, node: Node) {
        match node.kind {
            NodeKind::Gateway => self.gateways.insert(node.id.clone(), node),
            NodeKind::Target => self.targets.insert(node.id.clone(), node),
        };
    }

    /// Returns the node id currently occupying the given endpoint, if any.
    fn find_endpoint(&self, endpoint: &(String, u16)) -> Option<&Node> {
        self.gateways
            .values()
            .chain(self.targets.values())
            .find(|n| &n.endpoint() == endpoint)
    }

    /// Merges this map's nodes into `dst`, evicting any node that occupies
    /// an incoming node's `(host, port)` endpoint under a different id.
    ///
    /// Nodes whose id already exists in `dst` are left alone. Returns the
    /// number of nodes added. Used when live registrations supersede a disk
    /// copy.
    pub fn merge_override(&self, dst: &mut ClusterMap) -> usize {
        self.merge(dst, true).unwrap_or_default()
    }

    /// Merges this map's nodes into `dst`, failing on any `(host, port)`
    /// collision between distinct node ids.
    ///
    /// Returns the number of nodes added.
    pub fn merge_strict(&self, dst: &mut ClusterMap) -> Result<usize, MergeError> {
        self.merge(dst, false)
    }

    fn merge(
        &self,
        dst: &mut ClusterMap,
        override_duplicates: bool,
    ) -> Result<usize, MergeError> {
        let mut added = 0;
        for node in self.gateways.values().chain(self.targets.values()) {
            if dst.get_node(&node.id).is_some() {
                continue;
            }
            let endpoint = node.endpoint();
            if let Some(occupant) = dst.find_endpoint(&endpoint) {
                if !override_duplicates {
                    return Err(MergeError {
                        host: endpoint.0,
                        port: endpoint.1,
                        existing: occupant.id.clone(),
                        incoming: node.id.clone(),
                    });
                }
                let occupant_id = occupant.id.clone();
                dst.gateways.remove(&occupant_id);
                dst.targets.remove(&occupant_id);
            }
            dst.set_node(node.clone());
            added += 1;
        }
        Ok(added)
    }

    /// Compares identity, version, and full membership with another map.
    ///
    /// Returns `(same_uuid, same_version, eq)`. An empty uuid on either side
    /// is compatible with anything: a map that has not reached genesis yet
    /// cannot conflict on identity.
    #[must_use]
    pub fn compare(&self, other: &ClusterMap) -> (bool, bool, bool) {
        let same_uuid =
            self.uuid.is_empty() || other.uuid.is_empty() || self.uuid == other.uuid;
        let same_version = self.version == other.version;
        let eq = same_uuid
            && same_version
            && self.primary_id == other.primary_id
            && self.gateways == other.gateways
            && self.targets == other.targets;
        (same_uuid, same_version, eq)
    }

    /// Cluster genesis: assigns a fresh uuid and creation time.
    ///
    /// Must only be called on a map whose uuid is still empty; the caller
    /// bumps the version.
    pub fn assign_cluster_id(&mut self) {
        debug_assert!(self.uuid.is_empty());
        self.uuid = uuid::Uuid::new_v4().to_string();
        self.creation_time = unix_millis();
    }
}

impl VersionedMeta for ClusterMap {
    fn version(&self) -> i64 {
        self.version
    }

    fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl fmt::Display for ClusterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = if self.uuid.is_empty() { "-" } else { &self.uuid };
        write!(
            f,
            "ClusterMap v{}[uuid={}, primary={}, gws={}, tgts={}]",
            self.version,
            uuid,
            if self.primary_id.is_empty() {
                "-"
            } else {
                &self.primary_id
            },
            self.gateways.len(),
            self.targets.len()
        )
    }
}

/// Milliseconds since the unix epoch.
#[must_use]
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
