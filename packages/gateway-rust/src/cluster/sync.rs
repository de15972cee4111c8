//! HTTP implementations of the `Joiner` and `MetaSyncer` contracts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use reefstore_core::messages::{PATH_JOIN, PATH_METASYNC};
use reefstore_core::{BucketMeta, ClusterMap, JoinRequest, JoinResponse, Node, SyncPayload};

use super::traits::{Joiner, MetaSyncer, SyncHandle};

/// Registers this node by POSTing its record to the primary's control URL.
pub struct HttpJoiner {
    client: reqwest::Client,
}

impl HttpJoiner {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Joiner for HttpJoiner {
    async fn join(&self, primary: &Node, self_node: &Node) -> anyhow::Result<JoinResponse> {
        let url = format!("{}{}", primary.ctrl_url, PATH_JOIN);
        let resp = self
            .client
            .post(&url)
            .json(&JoinRequest {
                node: self_node.clone(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("join returned http status {}", resp.status());
        }
        Ok(resp.json::<JoinResponse>().await?)
    }
}

/// Pushes metadata pairs to every node in the map over the control plane.
///
/// Distribution is asynchronous: `sync` returns immediately with a handle;
/// per-node failures are logged and counted, never raised. Nodes that miss
/// a round catch up from a later one — versions only move forward.
pub struct CtrlPlaneMetaSyncer {
    client: reqwest::Client,
    self_id: String,
}

impl CtrlPlaneMetaSyncer {
    pub fn new(self_id: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            self_id: self_id.into(),
        })
    }
}

impl MetaSyncer for CtrlPlaneMetaSyncer {
    fn sync(&self, cmap: Arc<ClusterMap>, bmeta: Arc<BucketMeta>, action: &str) -> SyncHandle {
        let payload = SyncPayload {
            action: action.to_string(),
            cmap: Some((*cmap).clone()),
            bmeta: (bmeta.version > 0).then(|| (*bmeta).clone()),
        };
        let nodes: Vec<Node> = cmap
            .gateways
            .values()
            .chain(cmap.targets.values())
            .filter(|n| n.id != self.self_id)
            .cloned()
            .collect();
        let client = self.client.clone();
        let action = action.to_string();

        SyncHandle::spawn(async move {
            let mut acked = 0;
            for node in nodes {
                let url = format!("{}{}", node.ctrl_url, PATH_METASYNC);
                match client.post(&url).json(&payload).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(node = %node, action = %action, "metasync delivered");
                        acked += 1;
                    }
                    Ok(resp) => {
                        warn!(node = %node, action = %action, status = %resp.status(), "metasync rejected");
                    }
                    Err(e) => {
                        warn!(node = %node, action = %action, error = %e, "metasync delivery failed");
                    }
                }
            }
            acked
        })
    }
}
