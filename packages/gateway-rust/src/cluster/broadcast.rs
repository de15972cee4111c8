//! Control-plane broadcast: fan a query out to a node set, collect
//! per-node results.
//!
//! Per-node failures are data, not errors: the aggregate operation never
//! fails as a whole, and the reducer downstream decides what an unreachable
//! or garbled responder means for the round.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

use reefstore_core::{ClusterMap, Node};

use super::traits::Broadcast;

/// Which subset of the source map's nodes to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcastScope {
    AllNodes,
    TargetsOnly,
    GatewaysOnly,
}

/// One broadcast request: a GET of `path?what=<what>` against every node
/// selected from `cmap` by `scope`, excluding `exclude` (normally self).
#[derive(Clone)]
pub struct BcastArgs {
    pub path: String,
    pub what: String,
    pub scope: BcastScope,
    pub cmap: Arc<ClusterMap>,
    pub exclude: Option<String>,
}

impl BcastArgs {
    /// Nodes selected by the scope, minus the excluded id.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        let gateways = self.cmap.gateways.values();
        let targets = self.cmap.targets.values();
        let selected: Vec<&Node> = match self.scope {
            BcastScope::AllNodes => gateways.chain(targets).collect(),
            BcastScope::GatewaysOnly => gateways.collect(),
            BcastScope::TargetsOnly => targets.collect(),
        };
        selected
            .into_iter()
            .filter(|n| self.exclude.as_deref() != Some(n.id.as_str()))
            .cloned()
            .collect()
    }
}

/// Result of polling a single node.
#[derive(Debug, Clone)]
pub struct BcastResult {
    pub node: Node,
    pub payload: Option<Bytes>,
    pub err: Option<String>,
}

impl BcastResult {
    pub fn ok(node: Node, payload: Bytes) -> Self {
        Self {
            node,
            payload: Some(payload),
            err: None,
        }
    }

    pub fn failed(node: Node, err: impl Into<String>) -> Self {
        Self {
            node,
            payload: None,
            err: Some(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// CtrlPlaneBroadcaster
// ---------------------------------------------------------------------------

/// Production broadcaster: HTTP GETs with bounded concurrency and a
/// per-request timeout.
pub struct CtrlPlaneBroadcaster {
    client: reqwest::Client,
    concurrency: usize,
}

impl CtrlPlaneBroadcaster {
    /// Creates a broadcaster whose every request times out after
    /// `request_timeout`.
    pub fn new(request_timeout: Duration, concurrency: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            concurrency: concurrency.max(1),
        })
    }
}

#[async_trait::async_trait]
impl Broadcast for CtrlPlaneBroadcaster {
    async fn bcast_to(&self, args: BcastArgs) -> mpsc::Receiver<BcastResult> {
        let nodes = args.nodes();
        let (tx, rx) = mpsc::channel(nodes.len().max(1));
        let client = self.client.clone();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let path = args.path.clone();
        let what = args.what.clone();

        tokio::spawn(async move {
            let mut set = JoinSet::new();
            for node in nodes {
                let client = client.clone();
                let semaphore = Arc::clone(&semaphore);
                let url = format!("{}{}", node.ctrl_url, path);
                let what = what.clone();
                let tx = tx.clone();
                set.spawn(async move {
                    // Semaphore is never closed while the set is alive.
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    let result = match client
                        .get(&url)
                        .query(&[(reefstore_core::messages::QPARAM_WHAT, what.as_str())])
                        .send()
                        .await
                    {
                        Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                            Ok(bytes) => BcastResult::ok(node, bytes),
                            Err(e) => BcastResult::failed(node, e.to_string()),
                        },
                        Ok(resp) => {
                            BcastResult::failed(node, format!("http status {}", resp.status()))
                        }
                        Err(e) => BcastResult::failed(node, e.to_string()),
                    };
                    if let Some(err) = &result.err {
                        debug!(node = %result.node, err = %err, "broadcast responder failed");
                    }
                    let _ = tx.send(result).await;
                });
            }
            while set.join_next().await.is_some() {}
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reefstore_core::messages::{PATH_DAEMON, WHAT_SMAP_VOTE};

    fn sample_map() -> Arc<ClusterMap> {
        let mut cmap = ClusterMap::new();
        cmap.set_node(Node::gateway("g1", "http://10.0.0.1:8080"));
        cmap.set_node(Node::gateway("g2", "http://10.0.0.2:8080"));
        cmap.set_node(Node::target("t1", "http://10.0.0.3:8081"));
        Arc::new(cmap)
    }

    fn args(scope: BcastScope, exclude: Option<&str>) -> BcastArgs {
        BcastArgs {
            path: PATH_DAEMON.to_string(),
            what: WHAT_SMAP_VOTE.to_string(),
            scope,
            cmap: sample_map(),
            exclude: exclude.map(str::to_string),
        }
    }

    #[test]
    fn scope_selects_node_subsets() {
        assert_eq!(args(BcastScope::AllNodes, None).nodes().len(), 3);
        assert_eq!(args(BcastScope::GatewaysOnly, None).nodes().len(), 2);
        assert_eq!(args(BcastScope::TargetsOnly, None).nodes().len(), 1);
    }

    #[test]
    fn exclude_removes_self_from_target_set() {
        let nodes = args(BcastScope::AllNodes, Some("g1")).nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.id != "g1"));
    }

    #[tokio::test]
    async fn unreachable_nodes_yield_per_node_errors_not_failure() {
        // Nothing listens on these addresses; every result must carry an
        // err and the aggregate must still complete.
        let broadcaster =
            CtrlPlaneBroadcaster::new(Duration::from_millis(200), 4).unwrap();
        let mut cmap = ClusterMap::new();
        cmap.set_node(Node::gateway("g1", "http://127.0.0.1:1"));
        cmap.set_node(Node::target("t1", "http://127.0.0.1:1"));

        let mut rx = broadcaster
            .bcast_to(BcastArgs {
                path: PATH_DAEMON.to_string(),
                what: WHAT_SMAP_VOTE.to_string(),
                scope: BcastScope::AllNodes,
                cmap: Arc::new(cmap),
                exclude: None,
            })
            .await;

        let mut results = Vec::new();
        while let Some(res) = rx.recv().await {
            results.push(res);
        }
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.err.is_some() && r.payload.is_none()));
    }

    #[tokio::test]
    async fn empty_target_set_closes_channel_immediately() {
        let broadcaster =
            CtrlPlaneBroadcaster::new(Duration::from_millis(200), 4).unwrap();
        let mut rx = broadcaster
            .bcast_to(BcastArgs {
                path: PATH_DAEMON.to_string(),
                what: WHAT_SMAP_VOTE.to_string(),
                scope: BcastScope::AllNodes,
                cmap: Arc::new(ClusterMap::new()),
                exclude: None,
            })
            .await;
        assert!(rx.recv().await.is_none());
    }
}
