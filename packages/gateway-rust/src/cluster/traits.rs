//! Collaborator contracts the bootstrap core depends on.
//!
//! The state machine talks to the cluster exclusively through these three
//! seams, so tests drive it with in-process stubs and production wires in
//! the HTTP implementations from `sync.rs` and `broadcast.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use reefstore_core::{BucketMeta, ClusterMap, JoinResponse, Node};

use super::broadcast::{BcastArgs, BcastResult};

/// Fan-out of one control-plane query to a node set.
#[async_trait]
pub trait Broadcast: Send + Sync {
    /// Delivers one [`BcastResult`] per polled node; the channel closes
    /// when every node has been accounted for.
    async fn bcast_to(&self, args: BcastArgs) -> mpsc::Receiver<BcastResult>;
}

/// Registration of this node with a primary gateway.
#[async_trait]
pub trait Joiner: Send + Sync {
    /// POSTs `self_node`'s record to the primary's control endpoint.
    async fn join(&self, primary: &Node, self_node: &Node) -> anyhow::Result<JoinResponse>;
}

/// Distribution of a (cluster map, bucket metadata) pair to the cluster.
pub trait MetaSyncer: Send + Sync {
    /// Starts pushing the pair, tagged with `action`, to every node in
    /// `cmap` other than this one. Returns a handle the caller may await.
    fn sync(
        &self,
        cmap: Arc<ClusterMap>,
        bmeta: Arc<BucketMeta>,
        action: &str,
    ) -> SyncHandle;
}

/// Completion handle for an in-flight metadata distribution.
pub struct SyncHandle {
    task: JoinHandle<usize>,
}

impl SyncHandle {
    pub fn new(task: JoinHandle<usize>) -> Self {
        Self { task }
    }

    /// Spawns `fut` and hands back its handle.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = usize> + Send + 'static,
    {
        Self {
            task: tokio::spawn(fut),
        }
    }

    /// Waits for the distribution round to finish; returns the number of
    /// nodes that acknowledged.
    pub async fn wait(self) -> usize {
        self.task.await.unwrap_or(0)
    }
}
