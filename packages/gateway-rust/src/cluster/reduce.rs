//! Max-version reduction of broadcast vote replies.
//!
//! Folds a stream of per-node [`BcastResult`]s into a [`ReduceState`]:
//! the highest-version cluster map and bucket metadata seen, classified as
//! fast path (one originating uuid per kind) or slow path (conflicting
//! uuids, to be settled by uuid resolution). Classification is
//! order-independent: the slow-path flag is a monotone latch, so the same
//! responder set yields the same classification in any arrival order.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

use reefstore_core::{BucketMeta, ClusterMap, Node, VersionedMeta, VoteReply};

use super::broadcast::BcastResult;

/// Outcome of reducing one broadcast round.
#[derive(Debug, Default)]
pub struct ReduceState {
    /// Highest-version cluster map on the fast path, if any.
    pub max_cmap: Option<ClusterMap>,
    /// Highest-version bucket metadata on the fast path, if any.
    pub max_bmeta: Option<BucketMeta>,
    /// Origin uuid for the cluster-map kind.
    pub cmap_uuid: String,
    /// Origin uuid for the bucket-metadata kind.
    pub bmeta_uuid: String,
    /// False when any responder failed, decoded badly, or reported a vote
    /// in progress; the caller re-broadcasts while the startup deadline
    /// allows.
    pub done: bool,
    /// True once two responders disagreed on a non-empty uuid for either
    /// kind; latched for the remainder of the round.
    pub slow_path: bool,
    /// Every non-empty cluster map keyed by responder id, for slow-path
    /// resolution.
    pub per_node_cmap: HashMap<String, (Node, ClusterMap)>,
    /// Every non-empty bucket metadata keyed by responder id.
    pub per_node_bmeta: HashMap<String, (Node, BucketMeta)>,
}

/// Folds one metadata instance into the running max for its kind.
///
/// Rules, per kind:
/// 1. first non-zero-version instance initializes the max and the origin
///    uuid;
/// 2. a later instance with a different non-empty uuid latches the slow
///    path (an empty uuid never conflicts);
/// 3. while on the fast path, a higher version replaces the max.
fn fold<T: VersionedMeta>(
    incoming: &T,
    max: &mut Option<T>,
    origin: &mut String,
    slow_path: &mut bool,
) {
    if incoming.is_zero() {
        return;
    }
    match max {
        None => {
            *origin = incoming.uuid().to_string();
            *max = Some(incoming.clone());
        }
        Some(current) => {
            let uuid = incoming.uuid();
            if !origin.is_empty() && !uuid.is_empty() && uuid != origin {
                *slow_path = true;
            } else if !*slow_path && current.version() < incoming.version() {
                if origin.is_empty() {
                    *origin = uuid.to_string();
                }
                *max = Some(incoming.clone());
            }
        }
    }
}

/// Reduces a broadcast's result stream into a [`ReduceState`].
///
/// `retain_per_node` controls whether the per-node maps are populated; the
/// registration-window probe skips them, discovery needs them for the slow
/// path.
pub async fn reduce_max_ver(
    results: &mut mpsc::Receiver<BcastResult>,
    retain_per_node: bool,
) -> ReduceState {
    let mut state = ReduceState {
        done: true,
        ..ReduceState::default()
    };

    while let Some(res) = results.recv().await {
        if res.err.is_some() {
            state.done = false;
            continue;
        }
        let Some(payload) = res.payload else {
            state.done = false;
            continue;
        };
        let reply: VoteReply = match serde_json::from_slice(&payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(node = %res.node, error = %e, "unexpected vote-reply decoding error");
                state.done = false;
                continue;
            }
        };

        if reply.vote_in_progress {
            // A reelection is running somewhere: nothing gathered this
            // round can be trusted.
            warn!(node = %res.node, "responder reports a vote in progress, discarding round");
            state.max_cmap = None;
            state.max_bmeta = None;
            state.done = false;
            break;
        }

        if let Some(bmeta) = &reply.bmeta {
            fold(
                bmeta,
                &mut state.max_bmeta,
                &mut state.bmeta_uuid,
                &mut state.slow_path,
            );
            if retain_per_node && !bmeta.is_zero() {
                state
                    .per_node_bmeta
                    .insert(res.node.id.clone(), (res.node.clone(), bmeta.clone()));
            }
        }
        if let Some(cmap) = &reply.cmap {
            fold(
                cmap,
                &mut state.max_cmap,
                &mut state.cmap_uuid,
                &mut state.slow_path,
            );
            if retain_per_node && !cmap.is_zero() {
                state
                    .per_node_cmap
                    .insert(res.node.id.clone(), (res.node.clone(), cmap.clone()));
            }
        }
    }

    state
}
