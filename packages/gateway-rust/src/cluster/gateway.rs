//! Shared gateway runtime: identity, metadata owners, and the node-side
//! operations the control-plane handlers serve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use reefstore_core::{
    BucketMeta, ClusterMap, JoinResponse, Node, SyncPayload, VoteReply,
};

use crate::config::GatewayConfig;

use super::owner::MetaOwner;

/// A received metadata snapshot that cannot be installed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} uuid mismatch: local {local} vs incoming {incoming}")]
pub struct MetaMismatch {
    pub kind: &'static str,
    pub local: String,
    pub incoming: String,
}

/// Per-process gateway state shared by the bootstrapper and the HTTP
/// handlers.
pub struct Gateway {
    self_node: Node,
    config: Arc<GatewayConfig>,
    cmap: MetaOwner<ClusterMap>,
    bmeta: MetaOwner<BucketMeta>,
    /// Set exactly once, when startup completes; read with acquire
    /// semantics by the readiness probe.
    started: AtomicBool,
    /// Reported in vote replies while a reelection runs on this node.
    vote_in_progress: AtomicBool,
}

impl Gateway {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let self_node = Node::gateway(config.node_id.clone(), config.ctrl_url());
        let cmap = match config.cmap_path() {
            Some(path) => MetaOwner::with_persistence(ClusterMap::new(), path),
            None => MetaOwner::new(ClusterMap::new()),
        };
        Self {
            self_node,
            config: Arc::new(config),
            cmap,
            bmeta: MetaOwner::new(BucketMeta::new()),
            started: AtomicBool::new(false),
            vote_in_progress: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn self_node(&self) -> &Node {
        &self.self_node
    }

    #[must_use]
    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    #[must_use]
    pub fn cmap(&self) -> &MetaOwner<ClusterMap> {
        &self.cmap
    }

    #[must_use]
    pub fn bmeta(&self) -> &MetaOwner<BucketMeta> {
        &self.bmeta
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn vote_in_progress(&self) -> bool {
        self.vote_in_progress.load(Ordering::Acquire)
    }

    pub fn set_vote_in_progress(&self, voting: bool) {
        self.vote_in_progress.store(voting, Ordering::Release);
    }

    /// Snapshot served for `what=smap-vote`.
    ///
    /// Never-populated metadata is omitted rather than sent as version 0.
    #[must_use]
    pub fn vote_reply(&self) -> VoteReply {
        let cmap = self.cmap.get();
        let bmeta = self.bmeta.get();
        VoteReply {
            cmap: (cmap.version > 0).then(|| (*cmap).clone()),
            bmeta: (bmeta.version > 0).then(|| (*bmeta).clone()),
            vote_in_progress: self.vote_in_progress(),
        }
    }

    /// Primary-side registration of a joining node.
    ///
    /// While the map has no uuid yet (genesis accumulation during the
    /// registration window) additions do not bump the version; once the
    /// uuid is set, every membership change does. A node re-registering
    /// with an unchanged record is accepted without any change.
    #[must_use]
    pub fn handle_join(&self, node: Node) -> JoinResponse {
        let _guard = self.cmap.lock();
        let current = self.cmap.get();
        if !current.is_primary(&self.self_node.id) {
            return JoinResponse {
                accepted: false,
                reject_reason: Some(format!(
                    "{} is not the primary gateway",
                    self.self_node.id
                )),
                cmap: None,
            };
        }
        if current.get_node(&node.id) == Some(&node) {
            return JoinResponse {
                accepted: true,
                reject_reason: None,
                cmap: Some((*current).clone()),
            };
        }

        let mut next = (*current).clone();
        let endpoint = node.endpoint();
        let occupant = next
            .gateways
            .values()
            .chain(next.targets.values())
            .find(|n| n.id != node.id && n.endpoint() == endpoint)
            .map(|n| n.id.clone());
        if let Some(occupant_id) = occupant {
            // the endpoint moved to a new identity; the live node wins
            next.gateways.remove(&occupant_id);
            next.targets.remove(&occupant_id);
        }
        info!(node = %node, cmap = %next, "registering node");
        next.set_node(node);
        if !next.uuid.is_empty() {
            next.version += 1;
        }
        self.cmap.put(next.clone());
        JoinResponse {
            accepted: true,
            reject_reason: None,
            cmap: Some(next),
        }
    }

    /// Installs primary-distributed metadata, ignoring stale versions.
    pub fn apply_sync(&self, payload: SyncPayload) -> Result<(), MetaMismatch> {
        if let Some(incoming) = payload.cmap {
            let _guard = self.cmap.lock();
            let current = self.cmap.get();
            if !current.uuid.is_empty()
                && !incoming.uuid.is_empty()
                && current.uuid != incoming.uuid
            {
                return Err(MetaMismatch {
                    kind: "cluster map",
                    local: current.to_string(),
                    incoming: incoming.to_string(),
                });
            }
            if incoming.version > current.version {
                info!(action = %payload.action, cmap = %incoming, "installing synced cluster map");
                self.cmap.put(incoming);
            }
        }
        if let Some(incoming) = payload.bmeta {
            let _guard = self.bmeta.lock();
            let current = self.bmeta.get();
            if !current.uuid.is_empty()
                && !incoming.uuid.is_empty()
                && current.uuid != incoming.uuid
            {
                return Err(MetaMismatch {
                    kind: "bucket metadata",
                    local: current.to_string(),
                    incoming: incoming.to_string(),
                });
            }
            if incoming.version > current.version {
                self.bmeta.put(incoming);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reefstore_core::messages::ACT_PRIMARY_STARTED;

    fn gateway(id: &str) -> Gateway {
        Gateway::new(GatewayConfig {
            node_id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..GatewayConfig::default()
        })
    }

    fn primary_gateway(id: &str) -> Gateway {
        let gw = gateway(id);
        let mut cmap = ClusterMap::new();
        cmap.set_node(gw.self_node().clone());
        cmap.primary_id = id.to_string();
        gw.cmap().put(cmap);
        gw
    }

    #[test]
    fn vote_reply_omits_zero_version_meta() {
        let gw = gateway("g1");
        let reply = gw.vote_reply();
        assert!(reply.cmap.is_none());
        assert!(reply.bmeta.is_none());
        assert!(!reply.vote_in_progress);
    }

    #[test]
    fn vote_reply_carries_installed_meta_and_vote_flag() {
        let gw = primary_gateway("g1");
        let mut cmap = (*gw.cmap().get()).clone();
        cmap.uuid = "U".to_string();
        cmap.version = 3;
        gw.cmap().put(cmap);
        gw.set_vote_in_progress(true);

        let reply = gw.vote_reply();
        assert_eq!(reply.cmap.unwrap().version, 3);
        assert!(reply.vote_in_progress);
    }

    #[test]
    fn join_rejected_when_not_primary() {
        let gw = gateway("g1");
        let resp = gw.handle_join(Node::target("t1", "http://10.0.0.9:8081"));
        assert!(!resp.accepted);
        assert!(resp.reject_reason.unwrap().contains("not the primary"));
    }

    #[test]
    fn join_accumulates_without_version_bump_before_genesis() {
        let gw = primary_gateway("g1");
        let resp = gw.handle_join(Node::target("t1", "http://10.0.0.9:8081"));
        assert!(resp.accepted);
        let cmap = gw.cmap().get();
        assert_eq!(cmap.version, 0);
        assert_eq!(cmap.count_targets(), 1);
    }

    #[test]
    fn join_bumps_version_once_uuid_is_set() {
        let gw = primary_gateway("g1");
        let mut cmap = (*gw.cmap().get()).clone();
        cmap.uuid = "U".to_string();
        cmap.version = 5;
        gw.cmap().put(cmap);

        let resp = gw.handle_join(Node::target("t1", "http://10.0.0.9:8081"));
        assert!(resp.accepted);
        assert_eq!(resp.cmap.unwrap().version, 6);
    }

    #[test]
    fn join_is_idempotent_for_unchanged_record() {
        let gw = primary_gateway("g1");
        let mut cmap = (*gw.cmap().get()).clone();
        cmap.uuid = "U".to_string();
        cmap.version = 5;
        gw.cmap().put(cmap);

        let node = Node::target("t1", "http://10.0.0.9:8081");
        assert!(gw.handle_join(node.clone()).accepted);
        assert_eq!(gw.cmap().get().version, 6);
        assert!(gw.handle_join(node).accepted);
        assert_eq!(gw.cmap().get().version, 6);
    }

    #[test]
    fn join_evicts_stale_identity_on_same_endpoint() {
        let gw = primary_gateway("g1");
        assert!(gw
            .handle_join(Node::target("t-old", "http://10.0.0.9:8081"))
            .accepted);
        assert!(gw
            .handle_join(Node::target("t-new", "http://10.0.0.9:8081"))
            .accepted);
        let cmap = gw.cmap().get();
        assert!(cmap.get_node("t-old").is_none());
        assert!(cmap.get_node("t-new").is_some());
    }

    #[test]
    fn apply_sync_installs_newer_and_ignores_stale() {
        let gw = gateway("g2");
        let mut v3 = ClusterMap::new();
        v3.uuid = "U".to_string();
        v3.version = 3;
        gw.apply_sync(SyncPayload {
            action: ACT_PRIMARY_STARTED.to_string(),
            cmap: Some(v3.clone()),
            bmeta: None,
        })
        .unwrap();
        assert_eq!(gw.cmap().get().version, 3);

        let mut v2 = v3.clone();
        v2.version = 2;
        gw.apply_sync(SyncPayload {
            action: ACT_PRIMARY_STARTED.to_string(),
            cmap: Some(v2),
            bmeta: None,
        })
        .unwrap();
        assert_eq!(gw.cmap().get().version, 3);
    }

    #[test]
    fn apply_sync_rejects_uuid_mismatch() {
        let gw = gateway("g2");
        let mut ua = ClusterMap::new();
        ua.uuid = "UA".to_string();
        ua.version = 3;
        gw.apply_sync(SyncPayload {
            action: ACT_PRIMARY_STARTED.to_string(),
            cmap: Some(ua),
            bmeta: None,
        })
        .unwrap();

        let mut ub = ClusterMap::new();
        ub.uuid = "UB".to_string();
        ub.version = 9;
        let err = gw
            .apply_sync(SyncPayload {
                action: ACT_PRIMARY_STARTED.to_string(),
                cmap: Some(ub),
                bmeta: None,
            })
            .unwrap_err();
        assert_eq!(err.kind, "cluster map");
        assert_eq!(gw.cmap().get().version, 3);
    }

    #[test]
    fn started_flag_is_set_once() {
        let gw = gateway("g1");
        assert!(!gw.started());
        gw.mark_started();
        assert!(gw.started());
    }
}
