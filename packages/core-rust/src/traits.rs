//! Core trait seams shared by the metadata kinds.

/// Common surface of the versioned, uuid-tagged metadata snapshots
/// (`ClusterMap`, `BucketMeta`).
///
/// Owners and reducers treat the two kinds uniformly through this trait:
/// version-0 instances are "empty", and an empty uuid means the snapshot
/// has not been tied to a cluster identity yet.
pub trait VersionedMeta: Clone + Send + Sync + 'static {
    fn version(&self) -> i64;

    fn uuid(&self) -> &str;

    /// A snapshot that has never been populated.
    fn is_zero(&self) -> bool {
        self.version() == 0
    }
}
