//! Slow-path uuid resolution.
//!
//! Invoked only when the reducer latched the slow path: responders disagreed
//! on the originating uuid for a metadata kind, so picking the highest
//! version is no longer safe and identity must be settled first.

use std::collections::HashMap;

use tracing::info;

use reefstore_core::{BucketMeta, ClusterMap, Node, NodeKind};

use super::errors::ClusterIntegrityError;

/// Chooses the authoritative bucket metadata by majority uuid.
///
/// Returns the highest-version instance carrying the majority uuid, or
/// `None` when no responder reported a non-empty uuid. An even split
/// between the top two uuids is a cluster-integrity error.
pub fn resolve_bmeta_uuid(
    per_node: &HashMap<String, (Node, BucketMeta)>,
) -> Result<Option<BucketMeta>, ClusterIntegrityError> {
    let mut votes: HashMap<&str, usize> = HashMap::new();
    for (_, bmeta) in per_node.values() {
        if !bmeta.uuid.is_empty() {
            *votes.entry(bmeta.uuid.as_str()).or_default() += 1;
        }
    }
    if votes.is_empty() {
        return Ok(None);
    }

    let mut tally: Vec<(&str, usize)> = votes.into_iter().collect();
    // highest count first; uuid order only to make the split check stable
    tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    if tally.len() > 1 && tally[0].1 == tally[1].1 {
        return Err(ClusterIntegrityError::BmetaUuidSplit {
            uuid_a: tally[0].0.to_string(),
            uuid_b: tally[1].0.to_string(),
            votes: tally[0].1,
        });
    }

    let chosen = tally[0].0;
    let winner = per_node
        .values()
        .filter(|(_, b)| b.uuid == chosen)
        .max_by_key(|(_, b)| b.version)
        .map(|(_, b)| b.clone());
    Ok(winner)
}

/// Settles the cluster-map uuid from the targets' reports, then picks the
/// highest version with that uuid across all responders.
///
/// Gateway-reported uuids are ignored for identity selection (a gateway's
/// map can be stale or fabricated), but gateway versions count once the
/// uuid is fixed. Two targets reporting different non-empty uuids is a
/// cluster-integrity error.
pub fn resolve_cmap_uuid(
    per_node: &HashMap<String, (Node, ClusterMap)>,
) -> Result<Option<ClusterMap>, ClusterIntegrityError> {
    let mut suuid = "";
    let mut suuid_node = "";
    for (node, cmap) in per_node.values() {
        if node.kind != NodeKind::Target || cmap.uuid.is_empty() {
            continue;
        }
        if suuid.is_empty() {
            suuid = &cmap.uuid;
            suuid_node = &node.id;
            info!(uuid = suuid, target = %node, "cluster uuid settled from target");
        } else if suuid != cmap.uuid {
            return Err(ClusterIntegrityError::TargetUuidDisagreement {
                uuid_a: suuid.to_string(),
                node_a: suuid_node.to_string(),
                uuid_b: cmap.uuid.clone(),
                node_b: node.id.clone(),
            });
        }
    }
    if suuid.is_empty() {
        return Ok(None);
    }

    let winner = per_node
        .values()
        .filter(|(_, c)| c.uuid == suuid)
        .max_by_key(|(_, c)| c.version)
        .map(|(_, c)| c.clone());
    Ok(winner)
}
